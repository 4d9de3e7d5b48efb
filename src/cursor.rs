//! Cursors over a live table.
//!
//! One traversal primitive drives two capability sets:
//! - `Cursor`: plain forward read cursor. It never fails; once the table
//!   changes underneath it, what it yields is best-effort.
//! - `Iter`: wraps a `Cursor`, checks the table's modification count
//!   before every advance and removal, and can remove the element it last
//!   yielded. Over entries it can also overwrite that element's value.
//!
//! Neither holds the table lock between steps. Each advance locks, moves
//! one element, and releases, so a concurrent change can be detected one
//! step late or, for `Cursor`, not at all. Use `Hashtable::for_each` when a
//! traversal must be consistent as a whole.
//!
//! Elements are cloned out of the table, since no borrow can outlive the
//! lock.

use core::fmt;
use core::marker::PhantomData;

use crate::chain::{Node, NodeKey, Table};
use crate::error::{Result, TableError};
use crate::hashtable::Hashtable;

/// Selects what a cursor yields for each entry.
pub trait Project<K, V> {
    type Item;
    fn project(key: &K, value: &V) -> Self::Item;
}

/// Markers for the three projections.
pub mod kind {
    #[derive(Debug, Clone, Copy)]
    pub struct Keys;
    #[derive(Debug, Clone, Copy)]
    pub struct Values;
    #[derive(Debug, Clone, Copy)]
    pub struct Entries;
}

impl<K: Clone, V> Project<K, V> for kind::Keys {
    type Item = K;
    fn project(key: &K, _value: &V) -> K {
        key.clone()
    }
}

impl<K, V: Clone> Project<K, V> for kind::Values {
    type Item = V;
    fn project(_key: &K, value: &V) -> V {
        value.clone()
    }
}

impl<K: Clone, V: Clone> Project<K, V> for kind::Entries {
    type Item = Entry<K, V>;
    fn project(key: &K, value: &V) -> Entry<K, V> {
        Entry::new(key.clone(), value.clone())
    }
}

/// A key/value pair copied out of the table. Write a new value back
/// through `Iter::set_value`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry<K, V> {
    key: K,
    value: V,
}

impl<K, V> Entry<K, V> {
    pub fn new(key: K, value: V) -> Self {
        Self { key, value }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_parts(self) -> (K, V) {
        (self.key, self.value)
    }
}

impl<K: fmt::Display, V: fmt::Display> fmt::Display for Entry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Position of a traversal: buckets are visited from the last to the
/// first, each chain from its head.
#[derive(Debug, Clone)]
struct Traversal {
    index: usize,
    next: Option<NodeKey>,
    last_returned: Option<NodeKey>,
}

impl Traversal {
    fn new(capacity: usize) -> Self {
        Self {
            index: capacity,
            next: None,
            last_returned: None,
        }
    }

    /// Move to the next live node without consuming it.
    fn settle<K, V>(&mut self, table: &Table<K, V>) -> bool {
        loop {
            if let Some(k) = self.next {
                if table.node(k).is_some() {
                    return true;
                }
                // Unlinked since we last looked; resume at the next bucket.
                self.next = None;
            }
            let index = self.index.min(table.capacity());
            if index == 0 {
                self.index = 0;
                return false;
            }
            self.index = index - 1;
            self.next = table.head(self.index);
        }
    }

    fn advance<'t, K, V>(&mut self, table: &'t Table<K, V>) -> Option<&'t Node<K, V>> {
        if !self.settle(table) {
            return None;
        }
        let k = self.next?;
        let node = table.node(k)?;
        self.next = node.next;
        self.last_returned = Some(k);
        Some(node)
    }
}

/// Forward read cursor with no modification check.
pub struct Cursor<'a, K, V, S, P> {
    table: &'a Hashtable<K, V, S>,
    traversal: Traversal,
    _kind: PhantomData<fn() -> P>,
}

impl<'a, K, V, S, P> Cursor<'a, K, V, S, P> {
    pub(crate) fn new(table: &'a Hashtable<K, V, S>) -> Self {
        Self {
            table,
            traversal: Traversal::new(table.capacity()),
            _kind: PhantomData,
        }
    }
}

impl<K, V, S, P> Cursor<'_, K, V, S, P>
where
    P: Project<K, V>,
{
    pub fn has_more_elements(&mut self) -> bool {
        let shared = self.table.lock();
        let table = shared.table();
        self.traversal.settle(&*table)
    }

    pub fn next_element(&mut self) -> Option<P::Item> {
        let shared = self.table.lock();
        let table = shared.table();
        self.traversal
            .advance(&*table)
            .map(|n| P::project(&n.key, &n.value))
    }
}

impl<K, V, S, P> Iterator for Cursor<'_, K, V, S, P>
where
    P: Project<K, V>,
{
    type Item = P::Item;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_element()
    }
}

/// Fail-fast iterator that can remove the element it last yielded.
///
/// As an `Iterator` it yields `Err(ConcurrentStructuralModification)` once
/// and then stops.
pub struct Iter<'a, K, V, S, P> {
    cursor: Cursor<'a, K, V, S, P>,
    expected_mod_count: u64,
    failed: bool,
}

impl<'a, K, V, S, P> Iter<'a, K, V, S, P> {
    pub(crate) fn new(table: &'a Hashtable<K, V, S>) -> Self {
        // Capacity and modification count are captured together.
        let (capacity, expected_mod_count) = table.read(|t| (t.capacity(), t.mod_count()));
        Self {
            cursor: Cursor {
                table,
                traversal: Traversal::new(capacity),
                _kind: PhantomData,
            },
            expected_mod_count,
            failed: false,
        }
    }
}

impl<K, V, S, P> Iter<'_, K, V, S, P>
where
    P: Project<K, V>,
{
    pub fn has_next(&mut self) -> bool {
        self.cursor.has_more_elements()
    }

    /// Advance, failing if the table changed structurally since this
    /// iterator was created or last removed an element.
    pub fn try_next(&mut self) -> Result<Option<P::Item>> {
        let shared = self.cursor.table.lock();
        let table = shared.table();
        if table.mod_count() != self.expected_mod_count {
            return Err(TableError::ConcurrentStructuralModification);
        }
        let item = self
            .cursor
            .traversal
            .advance(&*table)
            .map(|n| P::project(&n.key, &n.value));
        Ok(item)
    }

    /// Remove the element most recently yielded by `try_next`.
    pub fn remove(&mut self) -> Result<()> {
        let Some(k) = self.cursor.traversal.last_returned else {
            return Err(TableError::IllegalCursorState);
        };
        let shared = self.cursor.table.lock();
        let slot = {
            let table = shared.table();
            if table.mod_count() != self.expected_mod_count {
                return Err(TableError::ConcurrentStructuralModification);
            }
            table
                .locate_node(k)
                .ok_or(TableError::ConcurrentStructuralModification)?
        };
        let _node = shared.unlink(slot);
        self.expected_mod_count = shared.table().mod_count();
        self.cursor.traversal.last_returned = None;
        Ok(())
    }
}

impl<K, V, S> Iter<'_, K, V, S, kind::Entries>
where
    K: Clone,
    V: Clone,
{
    /// Overwrite the value of the entry most recently yielded by
    /// `try_next`, returning the value it held. Not a structural change.
    pub fn set_value(&mut self, value: V) -> Result<V> {
        let Some(k) = self.cursor.traversal.last_returned else {
            return Err(TableError::IllegalCursorState);
        };
        let shared = self.cursor.table.lock();
        if shared.table().node(k).is_none() {
            return Err(TableError::ConcurrentStructuralModification);
        }
        // Bound so the table borrow ends before the guard is released.
        let old = std::mem::replace(shared.table_mut().value_mut(k), value);
        Ok(old)
    }
}

impl<K, V, S, P> Iterator for Iter<'_, K, V, S, P>
where
    P: Project<K, V>,
{
    type Item = Result<P::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.try_next() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_visits_buckets_last_to_first() {
        let mut t: Table<&str, i32> = Table::with_capacity(5, 0.75);
        t.add_entry(0, "zero", 0);
        t.add_entry(4, "four", 4);
        t.add_entry(2, "two", 2);
        let mut tr = Traversal::new(t.capacity());
        let mut seen = Vec::new();
        while let Some(n) = tr.advance(&t) {
            seen.push(n.key);
        }
        assert_eq!(seen, vec!["four", "two", "zero"]);
        assert!(!tr.settle(&t));
    }

    #[test]
    fn traversal_skips_nodes_unlinked_under_it() {
        let mut t: Table<&str, i32> = Table::with_capacity(5, 0.75);
        t.add_entry(1, "a", 1);
        t.add_entry(6, "b", 2); // same bucket, chain b -> a
        let mut tr = Traversal::new(t.capacity());
        assert_eq!(tr.advance(&t).map(|n| n.key), Some("b"));
        let slot = t.locate_key(1, "a").unwrap();
        t.unlink(slot);
        assert!(tr.advance(&t).is_none());
    }

    #[test]
    fn traversal_clamps_to_a_smaller_table() {
        let t: Table<&str, i32> = Table::with_capacity(3, 0.75);
        let mut tr = Traversal::new(50);
        assert!(tr.advance(&t).is_none());
        assert_eq!(tr.index, 0);
    }

    #[test]
    fn cursor_and_iter_agree_on_order() {
        let table: Hashtable<i32, i32> = (0..30).map(|i| (i, i * 2)).collect();
        let keys: Vec<i32> = table.keys().collect();
        let values: Vec<i32> = table.elements().collect();
        let entries: Vec<Entry<i32, i32>> = table
            .entry_set()
            .iter()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(keys.len(), 30);
        for ((k, v), e) in keys.iter().zip(&values).zip(&entries) {
            assert_eq!(e.key(), k);
            assert_eq!(e.value(), v);
            assert_eq!(*v, k * 2);
        }
    }

    #[test]
    fn entry_display_and_parts() {
        let e = Entry::new("k", 3);
        assert_eq!(e.to_string(), "k=3");
        assert_eq!(e.into_parts(), ("k", 3));
    }
}
