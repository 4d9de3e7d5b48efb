//! Bucket array with singly linked overflow chains.
//!
//! Nodes live in a generational arena; a chain link is an arena key. Each
//! node is owned by exactly one chain and reachable only from its bucket
//! head or its predecessor's `next`. Rehashing relinks the existing nodes
//! into a fresh bucket array and never rebuilds them.
//!
//! This layer has no locking of its own; `Hashtable` serializes access.

use core::borrow::Borrow;

use slotmap::SlotMap;

use crate::error::{Result, TableError};
use crate::growth::{grown_capacity, threshold_for};

slotmap::new_key_type! {
    /// Arena key of a chain node.
    pub(crate) struct NodeKey;
}

/// Clear the sign bit so the bucket index is never negative.
pub(crate) const HASH_MASK: u32 = 0x7FFF_FFFF;

#[derive(Debug, Clone)]
pub(crate) struct Node<K, V> {
    pub hash: u32,
    pub key: K,
    pub value: V,
    pub next: Option<NodeKey>,
}

/// Position of a node inside its chain: the predecessor (if any) and the
/// node itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Slot {
    pub prev: Option<NodeKey>,
    pub node: NodeKey,
}

#[derive(Debug, Clone)]
pub(crate) struct Table<K, V> {
    buckets: Vec<Option<NodeKey>>,
    nodes: SlotMap<NodeKey, Node<K, V>>,
    threshold: usize,
    load_factor: f32,
    mod_count: u64,
}

/// Fold a 64-bit hasher output to the cached 31-bit chain hash.
#[inline]
pub(crate) fn chain_hash(raw: u64) -> u32 {
    ((raw ^ (raw >> 32)) as u32) & HASH_MASK
}

impl<K, V> Table<K, V> {
    pub fn with_capacity(capacity: usize, load_factor: f32) -> Self {
        debug_assert!(capacity >= 1);
        Self {
            buckets: vec![None; capacity],
            nodes: SlotMap::with_key(),
            threshold: threshold_for(capacity, load_factor),
            load_factor,
            mod_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn load_factor(&self) -> f32 {
        self.load_factor
    }

    pub fn mod_count(&self) -> u64 {
        self.mod_count
    }

    pub fn reset_mod_count(&mut self) {
        self.mod_count = 0;
    }

    #[inline]
    fn index_for(&self, hash: u32) -> usize {
        hash as usize % self.buckets.len()
    }

    pub fn head(&self, index: usize) -> Option<NodeKey> {
        self.buckets.get(index).copied().flatten()
    }

    pub fn node(&self, k: NodeKey) -> Option<&Node<K, V>> {
        self.nodes.get(k)
    }

    /// Node behind a key that was located under the current lock.
    pub fn at(&self, k: NodeKey) -> &Node<K, V> {
        &self.nodes[k]
    }

    pub fn value_mut(&mut self, k: NodeKey) -> &mut V {
        &mut self.nodes[k].value
    }

    pub fn find<Q>(&self, hash: u32, key: &Q) -> Option<&Node<K, V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        self.locate_key(hash, key).map(|s| &self.nodes[s.node])
    }

    /// Walk the chain `hash` maps to and return the first node accepted by
    /// `matches`. The cached hash is compared before `matches` runs.
    pub fn locate<F>(&self, hash: u32, mut matches: F) -> Option<Slot>
    where
        F: FnMut(&Node<K, V>) -> bool,
    {
        let mut prev = None;
        let mut cur = self.buckets[self.index_for(hash)];
        while let Some(k) = cur {
            let node = &self.nodes[k];
            if node.hash == hash && matches(node) {
                return Some(Slot { prev, node: k });
            }
            prev = Some(k);
            cur = node.next;
        }
        None
    }

    pub fn locate_key<Q>(&self, hash: u32, key: &Q) -> Option<Slot>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        self.locate(hash, |n| n.key.borrow() == key)
    }

    /// Find a node by identity, recomputing its bucket from the cached hash.
    pub fn locate_node(&self, k: NodeKey) -> Option<Slot> {
        let hash = self.nodes.get(k)?.hash;
        let mut prev = None;
        let mut cur = self.buckets[self.index_for(hash)];
        while let Some(c) = cur {
            if c == k {
                return Some(Slot { prev, node: k });
            }
            prev = Some(c);
            cur = self.nodes[c].next;
        }
        None
    }

    /// Insert a node for a key known to be absent, growing first if the
    /// table is at its threshold. The new node becomes the chain head.
    pub fn add_entry(&mut self, hash: u32, key: K, value: V) -> NodeKey {
        self.mod_count = self.mod_count.wrapping_add(1);
        if self.len() >= self.threshold {
            self.rehash();
        }
        self.link_head(hash, key, value)
    }

    fn link_head(&mut self, hash: u32, key: K, value: V) -> NodeKey {
        let index = self.index_for(hash);
        let next = self.buckets[index];
        let k = self.nodes.insert(Node {
            hash,
            key,
            value,
            next,
        });
        self.buckets[index] = Some(k);
        k
    }

    /// Insert during restore: no growth and no modification bump.
    pub fn reconstitute(&mut self, hash: u32, key: K, value: V) -> Result<()>
    where
        K: Eq,
    {
        if self.locate(hash, |n| n.key == key).is_some() {
            return Err(TableError::DuplicateKeyOnLoad);
        }
        self.link_head(hash, key, value);
        Ok(())
    }

    /// Detach a located node and hand it back to the caller.
    pub fn unlink(&mut self, slot: Slot) -> Node<K, V> {
        let next = self.nodes[slot.node].next;
        match slot.prev {
            Some(p) => self.nodes[p].next = next,
            None => {
                let index = self.index_for(self.nodes[slot.node].hash);
                self.buckets[index] = next;
            }
        }
        self.mod_count = self.mod_count.wrapping_add(1);
        let mut node = self
            .nodes
            .remove(slot.node)
            .unwrap_or_else(|| unreachable!("located node must be live"));
        node.next = None;
        node
    }

    /// Redistribute every node into a bucket array of the next capacity.
    pub fn rehash(&mut self) {
        let old_capacity = self.capacity();
        let Some(new_capacity) = grown_capacity(old_capacity) else {
            tracing::warn!(
                capacity = old_capacity,
                entries = self.len(),
                "Table at maximum capacity, growth skipped."
            );
            return;
        };

        let old = std::mem::replace(&mut self.buckets, vec![None; new_capacity]);
        self.mod_count = self.mod_count.wrapping_add(1);
        self.threshold = threshold_for(new_capacity, self.load_factor);

        for head in old.into_iter().rev() {
            let mut cur = head;
            while let Some(k) = cur {
                let node = &mut self.nodes[k];
                cur = node.next;
                let index = node.hash as usize % new_capacity;
                node.next = self.buckets[index];
                self.buckets[index] = Some(k);
            }
        }

        tracing::debug!(
            old_capacity,
            new_capacity,
            entries = self.len(),
            threshold = self.threshold,
            "Rehashed table."
        );
    }

    /// Empty every bucket. The detached nodes are returned so the caller
    /// can drop them outside any borrow of the table.
    pub fn clear(&mut self) -> SlotMap<NodeKey, Node<K, V>> {
        self.buckets.iter_mut().for_each(|b| *b = None);
        self.mod_count = self.mod_count.wrapping_add(1);
        std::mem::replace(&mut self.nodes, SlotMap::with_key())
    }

    /// Nodes in cursor order: buckets from last to first, each chain from
    /// its head.
    pub fn iter(&self) -> Chains<'_, K, V> {
        Chains {
            table: self,
            index: self.buckets.len(),
            next: None,
            descending: true,
        }
    }

    /// Nodes in persisted order: buckets from first to last.
    pub fn iter_ascending(&self) -> Chains<'_, K, V> {
        Chains {
            table: self,
            index: 0,
            next: None,
            descending: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn chain_len(&self, index: usize) -> usize {
        let mut n = 0;
        let mut cur = self.buckets[index];
        while let Some(k) = cur {
            n += 1;
            cur = self.nodes[k].next;
        }
        n
    }
}

/// Walks every chain of a table.
pub(crate) struct Chains<'t, K, V> {
    table: &'t Table<K, V>,
    index: usize,
    next: Option<NodeKey>,
    descending: bool,
}

impl<'t, K, V> Iterator for Chains<'t, K, V> {
    type Item = (NodeKey, &'t Node<K, V>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(k) = self.next {
                let node = &self.table.nodes[k];
                self.next = node.next;
                return Some((k, node));
            }
            if self.descending {
                if self.index == 0 {
                    return None;
                }
                self.index -= 1;
                self.next = self.table.buckets[self.index];
            } else {
                if self.index >= self.table.buckets.len() {
                    return None;
                }
                self.next = self.table.buckets[self.index];
                self.index += 1;
            }
        }
    }
}
