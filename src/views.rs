//! Live views over a table.
//!
//! A view is a borrowed handle, not a copy. Size, membership, removal and
//! `clear` go straight to the table; `iter` builds a fail-fast iterator.

use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};

use crate::cursor::{kind, Iter};
use crate::hashtable::Hashtable;

macro_rules! view_common {
    ($view:ident, $kind:ty) => {
        impl<'a, K, V, S> $view<'a, K, V, S> {
            pub(crate) fn new(table: &'a Hashtable<K, V, S>) -> Self {
                Self { table }
            }

            pub fn len(&self) -> usize {
                self.table.len()
            }

            pub fn is_empty(&self) -> bool {
                self.table.is_empty()
            }

            /// Clears the backing table.
            pub fn clear(&self) {
                self.table.clear()
            }

            pub fn iter(&self) -> Iter<'a, K, V, S, $kind> {
                Iter::new(self.table)
            }
        }

        impl<K, V, S> Clone for $view<'_, K, V, S> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<K, V, S> Copy for $view<'_, K, V, S> {}
    };
}

/// The keys of a table.
pub struct KeySet<'a, K, V, S> {
    table: &'a Hashtable<K, V, S>,
}

/// The values of a table, duplicates included.
pub struct ValueCollection<'a, K, V, S> {
    table: &'a Hashtable<K, V, S>,
}

/// The key/value pairs of a table.
pub struct EntrySet<'a, K, V, S> {
    table: &'a Hashtable<K, V, S>,
}

view_common!(KeySet, kind::Keys);
view_common!(ValueCollection, kind::Values);
view_common!(EntrySet, kind::Entries);

impl<K, V, S> KeySet<'_, K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.contains_key(key)
    }

    /// Removes `key` from the backing table; true if it was present.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.remove(key).is_some()
    }
}

impl<K, V, S> ValueCollection<'_, K, V, S>
where
    V: PartialEq,
{
    pub fn contains(&self, value: &V) -> bool {
        self.table.contains_value(value)
    }

    /// Removes one entry holding `value`; true if there was one.
    pub fn remove(&self, value: &V) -> bool {
        self.table.remove_value(value)
    }
}

impl<K, V, S> EntrySet<'_, K, V, S>
where
    K: Eq + Hash,
    V: PartialEq,
    S: BuildHasher,
{
    /// True if `key` is present and maps to `value`. The bucket is derived
    /// from `key` on every call.
    pub fn contains<Q>(&self, key: &Q, value: &V) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.table.hash_of(key);
        self.table
            .read(|t| t.locate(hash, |n| n.key.borrow() == key && n.value == *value).is_some())
    }

    /// Removes `key` only while it maps to `value`.
    pub fn remove<Q>(&self, key: &Q, value: &V) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.remove_if_equals(key, value)
    }
}

impl<K, V, S> fmt::Debug for KeySet<'_, K, V, S>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_set();
        self.table.for_each(|k, _| {
            list.entry(k);
        });
        list.finish()
    }
}

impl<K, V, S> fmt::Debug for ValueCollection<'_, K, V, S>
where
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        self.table.for_each(|_, v| {
            list.entry(v);
        });
        list.finish()
    }
}

impl<K, V, S> fmt::Debug for EntrySet<'_, K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        self.table.for_each(|k, v| {
            set.entry(&(k, v));
        });
        set.finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::cursor::Entry;
    use crate::hashtable::Hashtable;

    fn sample() -> Hashtable<&'static str, i32> {
        let t = Hashtable::new();
        t.put("a", 1);
        t.put("b", 2);
        t.put("c", 1);
        t
    }

    #[test]
    fn views_delegate_to_the_table() {
        let t = sample();
        let keys = t.key_set();
        let values = t.values();
        let entries = t.entry_set();
        assert_eq!(keys.len(), 3);
        assert_eq!(values.len(), 3);
        assert!(keys.contains("b"));
        assert!(values.contains(&2));
        assert!(entries.contains("a", &1));
        assert!(!entries.contains("a", &2));

        assert!(keys.remove("b"));
        assert!(!t.contains_key("b"));
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn value_remove_takes_one_entry() {
        let t = sample();
        assert!(t.values().remove(&1));
        assert_eq!(t.len(), 2);
        assert!(t.contains_value(&1));
        assert!(t.values().remove(&1));
        assert!(!t.values().remove(&1));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn entry_remove_requires_matching_value() {
        let t = sample();
        let entries = t.entry_set();
        assert!(!entries.remove("a", &9));
        assert!(entries.remove("a", &1));
        assert!(!t.contains_key("a"));
    }

    #[test]
    fn entry_contains_survives_rehash() {
        let t = Hashtable::new();
        let entries = t.entry_set();
        t.put(0, 0);
        for i in 1..100 {
            t.put(i, i);
        }
        assert!(t.capacity() > 11);
        assert!(entries.contains(&0, &0));
        assert!(entries.contains(&99, &99));
    }

    #[test]
    fn view_clear_empties_the_table() {
        let t = sample();
        t.values().clear();
        assert!(t.is_empty());
        assert!(t.key_set().is_empty());
    }

    #[test]
    fn debug_lists_contents() {
        let t: Hashtable<&str, i32> = Hashtable::new();
        t.put("only", 7);
        assert_eq!(format!("{:?}", t.key_set()), r#"{"only"}"#);
        assert_eq!(format!("{:?}", t.values()), "[7]");
        assert_eq!(format!("{:?}", t.entry_set()), r#"{("only", 7)}"#);
        let e: Vec<Entry<&str, i32>> = t.entry_set().iter().map(|r| r.unwrap()).collect();
        assert_eq!(e, vec![Entry::new("only", 7)]);
    }
}
