//! Hashtable: the public, coarse-locked map over the chain layer.
//!
//! Every public operation takes the table-wide lock for its whole
//! duration. Compound operations look up and mutate inside one critical
//! section. Cursors are the exception: they lock once per step (see
//! `cursor`).

use core::borrow::Borrow;
use core::cell::{Ref, RefCell, RefMut};
use core::fmt;
use core::hash::{BuildHasher, Hash, Hasher};
use std::collections::hash_map::{DefaultHasher, RandomState};

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::chain::{chain_hash, Node, NodeKey, Slot, Table};
use crate::config::TableConfig;
use crate::cursor::{kind, Cursor};
use crate::error::Result;
use crate::growth::{DEFAULT_CAPACITY, DEFAULT_LOAD_FACTOR, MAX_CAPACITY};
use crate::reentrancy::ReentrancyFlag;
use crate::views::{EntrySet, KeySet, ValueCollection};

/// State guarded by the table lock.
pub(crate) struct Shared<K, V> {
    table: RefCell<Table<K, V>>,
    hashing: ReentrancyFlag,
    formatting: ReentrancyFlag,
}

impl<K, V> Shared<K, V> {
    fn new(table: Table<K, V>) -> Self {
        Self {
            table: RefCell::new(table),
            hashing: ReentrancyFlag::new(),
            formatting: ReentrancyFlag::new(),
        }
    }

    pub(crate) fn table(&self) -> Ref<'_, Table<K, V>> {
        self.table
            .try_borrow()
            .unwrap_or_else(|_| reentrant_mutation())
    }

    pub(crate) fn table_mut(&self) -> RefMut<'_, Table<K, V>> {
        self.table
            .try_borrow_mut()
            .unwrap_or_else(|_| reentrant_mutation())
    }

    /// Run `f` with the table borrowed for reading. User code invoked from
    /// `f` may read the table but not mutate it.
    pub(crate) fn reading<R>(&self, f: impl FnOnce(&Table<K, V>) -> R) -> R {
        let table = self.table();
        f(&*table)
    }

    /// Unlink a node; the borrow is released before the node is returned.
    pub(crate) fn unlink(&self, slot: Slot) -> Node<K, V> {
        self.table_mut().unlink(slot)
    }
}

#[cold]
#[track_caller]
fn reentrant_mutation() -> ! {
    panic!("Hashtable mutated from a callback while one of its own operations was in progress")
}

/// Hash a key or value with a fixed-key hasher, so structural hashes agree
/// across tables built with different `BuildHasher` seeds.
fn stable_code<T: ?Sized + Hash>(x: &T) -> i32 {
    let mut state = DefaultHasher::new();
    x.hash(&mut state);
    let raw = state.finish();
    (raw ^ (raw >> 32)) as u32 as i32
}

/// A thread-safe hash table of singly linked chains.
///
/// Keys and values are never absent; "absent" results are `None`. All
/// operations take `&self` and serialize on one re-entrant lock, so a
/// `Hashtable` is typically shared through an `Arc`.
pub struct Hashtable<K, V, S = RandomState> {
    hasher: S,
    shared: ReentrantMutex<Shared<K, V>>,
}

impl<K, V> Hashtable<K, V> {
    /// Empty table with capacity 11 and load factor 0.75.
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }

    pub fn with_capacity(initial_capacity: usize) -> Result<Self> {
        Self::with_config(TableConfig::new().with_initial_capacity(initial_capacity))
    }

    pub fn with_capacity_and_load_factor(initial_capacity: usize, load_factor: f32) -> Result<Self> {
        Self::with_config(
            TableConfig::new()
                .with_initial_capacity(initial_capacity)
                .with_load_factor(load_factor),
        )
    }

    pub fn with_config(config: TableConfig) -> Result<Self> {
        Self::with_config_and_hasher(config, RandomState::new())
    }
}

impl<K, V> Default for Hashtable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> Hashtable<K, V, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self::from_parts(
            Table::with_capacity(DEFAULT_CAPACITY, DEFAULT_LOAD_FACTOR),
            hasher,
        )
    }

    pub fn with_config_and_hasher(config: TableConfig, hasher: S) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(
            Table::with_capacity(config.effective_capacity(), config.load_factor),
            hasher,
        ))
    }

    pub(crate) fn from_parts(table: Table<K, V>, hasher: S) -> Self {
        Self {
            hasher,
            shared: ReentrantMutex::new(Shared::new(table)),
        }
    }

    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, Shared<K, V>> {
        self.shared.lock()
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&Table<K, V>) -> R) -> R {
        let shared = self.lock();
        shared.reading(f)
    }

    pub fn len(&self) -> usize {
        self.read(|t| t.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current number of buckets.
    pub fn capacity(&self) -> usize {
        self.read(|t| t.capacity())
    }

    pub fn threshold(&self) -> usize {
        self.read(|t| t.threshold())
    }

    pub fn load_factor(&self) -> f32 {
        self.read(|t| t.load_factor())
    }

    /// Counter bumped by every structural change (insert, remove, clear,
    /// rehash). Overwriting the value of an existing key leaves it alone.
    pub fn modification_count(&self) -> u64 {
        self.read(|t| t.mod_count())
    }

    pub fn clear(&self) {
        let shared = self.lock();
        let drained = shared.table_mut().clear();
        tracing::trace!(removed = drained.len(), "Cleared table.");
    }

    /// Read cursor over keys. It never fails; after a concurrent structural
    /// change its results are best-effort.
    pub fn keys(&self) -> Cursor<'_, K, V, S, kind::Keys> {
        Cursor::new(self)
    }

    /// Read cursor over values, with the same guarantees as `keys`.
    pub fn elements(&self) -> Cursor<'_, K, V, S, kind::Values> {
        Cursor::new(self)
    }

    pub fn key_set(&self) -> KeySet<'_, K, V, S> {
        KeySet::new(self)
    }

    pub fn values(&self) -> ValueCollection<'_, K, V, S> {
        ValueCollection::new(self)
    }

    pub fn entry_set(&self) -> EntrySet<'_, K, V, S> {
        EntrySet::new(self)
    }

    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.read(|t| t.iter().any(|(_, n)| n.value == *value))
    }

    /// Same as `contains_value`.
    pub fn contains(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.contains_value(value)
    }

    /// Visit every pair while holding the lock for the whole traversal.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&K, &V),
    {
        let shared = self.lock();
        shared.reading(|t| {
            for (_, n) in t.iter() {
                visitor(&n.key, &n.value);
            }
        });
    }

    /// Replace every value with `f(key, value)` while holding the lock for
    /// the whole traversal. Not a structural change.
    pub fn replace_all<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V) -> V,
    {
        let shared = self.lock();
        let order: Vec<NodeKey> = shared.reading(|t| t.iter().map(|(k, _)| k).collect());
        for k in order {
            let new = shared.reading(|t| {
                let n = t.at(k);
                f(&n.key, &n.value)
            });
            let _old = std::mem::replace(shared.table_mut().value_mut(k), new);
        }
    }

    /// Remove the first entry, in traversal order, holding `value`.
    pub(crate) fn remove_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        let shared = self.lock();
        let slot = shared.reading(|t| {
            let (k, _) = t.iter().find(|(_, n)| n.value == *value)?;
            t.locate_node(k)
        });
        match slot {
            Some(slot) => {
                let _node = shared.unlink(slot);
                true
            }
            None => false,
        }
    }

    /// Copy of every pair, in traversal order.
    pub(crate) fn snapshot(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        self.read(|t| {
            t.iter()
                .map(|(_, n)| (n.key.clone(), n.value.clone()))
                .collect()
        })
    }
}

impl<K, V, S> Hashtable<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    pub(crate) fn hash_of<Q>(&self, q: &Q) -> u32
    where
        Q: ?Sized + Hash,
    {
        chain_hash(self.hasher.hash_one(q))
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.hash_of(key);
        self.read(|t| t.locate_key(hash, key).is_some())
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: Clone,
    {
        let hash = self.hash_of(key);
        self.read(|t| t.find(hash, key).map(|n| n.value.clone()))
    }

    pub fn get_or_default<Q>(&self, key: &Q, default: V) -> V
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: Clone,
    {
        self.get(key).unwrap_or(default)
    }

    /// Map `key` to `value`, returning the value it replaced.
    ///
    /// Replacing an existing value is not a structural change. A new key is
    /// linked at the head of its chain, after growing the table if it has
    /// reached its threshold.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        let hash = self.hash_of(&key);
        let shared = self.lock();
        Self::put_locked(&shared, hash, key, value)
    }

    fn put_locked(shared: &Shared<K, V>, hash: u32, key: K, value: V) -> Option<V> {
        let slot = shared.table().locate_key(hash, &key);
        match slot {
            Some(slot) => {
                let old = std::mem::replace(shared.table_mut().value_mut(slot.node), value);
                Some(old)
            }
            None => {
                shared.table_mut().add_entry(hash, key, value);
                None
            }
        }
    }

    /// Put every pair as one critical section. Pairs are hashed before the
    /// lock is taken.
    pub fn put_all<I>(&self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let hashed: Vec<(u32, K, V)> = pairs
            .into_iter()
            .map(|(k, v)| (self.hash_of(&k), k, v))
            .collect();
        let shared = self.lock();
        for (hash, key, value) in hashed {
            let _old = Self::put_locked(&shared, hash, key, value);
        }
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.hash_of(key);
        let shared = self.lock();
        let slot = shared.table().locate_key(hash, key);
        let node = slot.map(|s| shared.unlink(s));
        node.map(|n| n.value)
    }

    /// Remove `key` only while it maps to `value`.
    pub fn remove_if_equals<Q>(&self, key: &Q, value: &V) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: PartialEq,
    {
        let hash = self.hash_of(key);
        let shared = self.lock();
        let slot = shared.reading(|t| t.locate(hash, |n| n.key.borrow() == key && n.value == *value));
        match slot {
            Some(slot) => {
                let _node = shared.unlink(slot);
                true
            }
            None => false,
        }
    }

    /// Overwrite the value of a present key; absent keys are left alone.
    pub fn replace<Q>(&self, key: &Q, value: V) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.hash_of(key);
        let shared = self.lock();
        let slot = shared.table().locate_key(hash, key);
        slot.map(|s| std::mem::replace(shared.table_mut().value_mut(s.node), value))
    }

    /// Overwrite the value of `key` only while it equals `expected`.
    pub fn replace_if_equals<Q>(&self, key: &Q, expected: &V, value: V) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: PartialEq,
    {
        let hash = self.hash_of(key);
        let shared = self.lock();
        let slot = shared.reading(|t| {
            t.locate_key(hash, key)
                .filter(|s| t.at(s.node).value == *expected)
        });
        match slot {
            Some(slot) => {
                let _old = std::mem::replace(shared.table_mut().value_mut(slot.node), value);
                true
            }
            None => false,
        }
    }

    /// Apply a computed outcome to a located entry: `None` unlinks it,
    /// `Some` overwrites its value.
    fn settle(shared: &Shared<K, V>, slot: Slot, outcome: Option<V>) -> Option<V>
    where
        V: Clone,
    {
        match outcome {
            Some(value) => {
                let out = value.clone();
                let _old = std::mem::replace(shared.table_mut().value_mut(slot.node), value);
                Some(out)
            }
            None => {
                let _node = shared.unlink(slot);
                None
            }
        }
    }

    fn insert_new(shared: &Shared<K, V>, hash: u32, key: K, value: V) -> V
    where
        V: Clone,
    {
        let out = value.clone();
        shared.table_mut().add_entry(hash, key, value);
        out
    }
}

impl<K, V, S> Hashtable<K, V, S>
where
    K: Eq + Hash,
    V: Clone,
    S: BuildHasher,
{
    /// Insert `value` unless `key` is present; returns the existing value.
    pub fn put_if_absent(&self, key: K, value: V) -> Option<V> {
        let hash = self.hash_of(&key);
        let shared = self.lock();
        let existing = shared.reading(|t| t.find(hash, &key).map(|n| n.value.clone()));
        if existing.is_none() {
            shared.table_mut().add_entry(hash, key, value);
        }
        existing
    }

    /// Returns the present value, or inserts and returns `f(key)`. When `f`
    /// yields `None` nothing is inserted.
    pub fn compute_if_absent<F>(&self, key: K, f: F) -> Option<V>
    where
        F: FnOnce(&K) -> Option<V>,
    {
        let hash = self.hash_of(&key);
        let shared = self.lock();
        let existing = shared.reading(|t| t.find(hash, &key).map(|n| n.value.clone()));
        if existing.is_some() {
            return existing;
        }
        let value = shared.reading(|_| f(&key))?;
        Some(Self::insert_new(&shared, hash, key, value))
    }

    /// Remap a present key. `None` from `f` removes the entry.
    pub fn compute_if_present<Q, F>(&self, key: &Q, f: F) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        F: FnOnce(&K, &V) -> Option<V>,
    {
        let hash = self.hash_of(key);
        let shared = self.lock();
        let (slot, outcome) = shared.reading(|t| {
            let slot = t.locate_key(hash, key)?;
            let n = t.at(slot.node);
            Some((slot, f(&n.key, &n.value)))
        })?;
        Self::settle(&shared, slot, outcome)
    }

    /// Compute a mapping whether or not `key` is present. `None` removes a
    /// present entry and is a no-op for an absent one.
    pub fn compute<F>(&self, key: K, f: F) -> Option<V>
    where
        F: FnOnce(&K, Option<&V>) -> Option<V>,
    {
        let hash = self.hash_of(&key);
        let shared = self.lock();
        let (slot, outcome) = shared.reading(|t| match t.locate_key(hash, &key) {
            Some(slot) => (Some(slot), f(&key, Some(&t.at(slot.node).value))),
            None => (None, f(&key, None)),
        });
        match slot {
            Some(slot) => Self::settle(&shared, slot, outcome),
            None => {
                let value = outcome?;
                Some(Self::insert_new(&shared, hash, key, value))
            }
        }
    }

    /// Insert `value` for an absent key, otherwise store
    /// `f(old, value)`; `None` from `f` removes the entry.
    pub fn merge<F>(&self, key: K, value: V, f: F) -> Option<V>
    where
        F: FnOnce(&V, V) -> Option<V>,
    {
        let hash = self.hash_of(&key);
        let shared = self.lock();
        let slot = shared.table().locate_key(hash, &key);
        match slot {
            Some(slot) => {
                let outcome = shared.reading(|t| f(&t.at(slot.node).value, value));
                Self::settle(&shared, slot, outcome)
            }
            None => Some(Self::insert_new(&shared, hash, key, value)),
        }
    }
}

impl<K, V, S> Hashtable<K, V, S>
where
    K: Hash,
    V: Hash,
{
    /// Sum over entries of `hash(key) ^ hash(value)`.
    ///
    /// A value that refers back to this table re-enters here while the
    /// outer traversal is running; the nested call returns 0.
    pub fn structural_hash(&self) -> i32 {
        let shared = self.lock();
        let Some(_guard) = shared.hashing.enter() else {
            return 0;
        };
        shared.reading(|t| {
            t.iter().fold(0i32, |h, (_, n)| {
                h.wrapping_add(stable_code(&n.key) ^ stable_code(&n.value))
            })
        })
    }
}

impl<K, V, S> Hash for Hashtable<K, V, S>
where
    K: Hash,
    V: Hash,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i32(self.structural_hash());
    }
}

impl<K, V, S> PartialEq for Hashtable<K, V, S>
where
    K: Eq + Hash + Clone,
    V: PartialEq + Clone,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        if core::ptr::eq(self, other) {
            return true;
        }
        // Copy the other side first so the two locks are never held
        // together.
        let theirs = other.snapshot();
        let hashed: Vec<(u32, K, V)> = theirs
            .into_iter()
            .map(|(k, v)| (self.hash_of(&k), k, v))
            .collect();
        self.read(|t| {
            t.len() == hashed.len()
                && hashed
                    .iter()
                    .all(|(h, k, v)| t.find(*h, k).is_some_and(|n| n.value == *v))
        })
    }
}

impl<K, V, S> Eq for Hashtable<K, V, S>
where
    K: Eq + Hash + Clone,
    V: Eq + Clone,
    S: BuildHasher,
{
}

impl<K, V, S> Clone for Hashtable<K, V, S>
where
    K: Clone,
    V: Clone,
    S: Clone,
{
    /// Deep copy with the same bucket layout and a fresh modification count.
    fn clone(&self) -> Self {
        let mut table = self.read(|t| t.clone());
        table.reset_mod_count();
        Self::from_parts(table, self.hasher.clone())
    }
}

impl<K, V, S> fmt::Display for Hashtable<K, V, S>
where
    K: fmt::Display,
    V: fmt::Display,
{
    /// `{k1=v1, k2=v2}` in traversal order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.lock();
        let Some(_guard) = shared.formatting.enter() else {
            return f.write_str("(this Map)");
        };
        let table = shared.table();
        f.write_str("{")?;
        for (i, (_, n)) in table.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", n.key, n.value)?;
        }
        f.write_str("}")
    }
}

impl<K, V, S> fmt::Debug for Hashtable<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.lock();
        let Some(_guard) = shared.formatting.enter() else {
            return f.write_str("(this Map)");
        };
        let table = shared.table();
        f.debug_map()
            .entries(table.iter().map(|(_, n)| (&n.key, &n.value)))
            .finish()
    }
}

impl<K, V, S> FromIterator<(K, V)> for Hashtable<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Default,
{
    /// Sized for twice the number of pairs, and never below the default.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let pairs: Vec<(K, V)> = iter.into_iter().collect();
        let capacity = pairs
            .len()
            .saturating_mul(2)
            .clamp(DEFAULT_CAPACITY, MAX_CAPACITY);
        let table = Self::from_parts(
            Table::with_capacity(capacity, DEFAULT_LOAD_FACTOR),
            S::default(),
        );
        table.put_all(pairs);
        table
    }
}

impl<K, V, S> Extend<(K, V)> for Hashtable<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.put_all(iter);
    }
}
