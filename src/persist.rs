//! Persisted layout and its serde glue.
//!
//! The layout is capacity, load factor, live count, then every pair in
//! ascending bucket order. Hashes are not stored; they are recomputed with
//! the loading table's hasher.

use core::hash::{BuildHasher, Hash};
use std::collections::hash_map::RandomState;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::chain::{chain_hash, Table};
use crate::config::validate_load_factor;
use crate::error::{Result, TableError};
use crate::growth::restored_capacity;
use crate::hashtable::Hashtable;

/// Owned snapshot of a table in its persisted form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedTable<K, V> {
    pub capacity: usize,
    pub load_factor: f32,
    pub count: usize,
    pub entries: Vec<(K, V)>,
}

impl<K, V, S> Hashtable<K, V, S> {
    /// Copy the table into its persisted form.
    pub fn to_persisted(&self) -> PersistedTable<K, V>
    where
        K: Clone,
        V: Clone,
    {
        self.read(|t| PersistedTable {
            capacity: t.capacity(),
            load_factor: t.load_factor(),
            count: t.len(),
            entries: t
                .iter_ascending()
                .map(|(_, n)| (n.key.clone(), n.value.clone()))
                .collect(),
        })
    }
}

impl<K, V> Hashtable<K, V>
where
    K: Eq + Hash,
{
    pub fn from_persisted(persisted: PersistedTable<K, V>) -> Result<Self> {
        Self::from_persisted_with_hasher(persisted, RandomState::new())
    }
}

impl<K, V, S> Hashtable<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Rebuild a table from its persisted form.
    ///
    /// The bucket count is recomputed from the number of pairs, so a table
    /// persisted with spare capacity may come back smaller. The restored
    /// table starts with a modification count of zero.
    pub fn from_persisted_with_hasher(persisted: PersistedTable<K, V>, hasher: S) -> Result<Self> {
        let PersistedTable {
            capacity,
            load_factor,
            count,
            entries,
        } = persisted;
        validate_load_factor(load_factor)?;
        if count != entries.len() {
            return Err(TableError::ElementCountMismatch {
                declared: count,
                actual: entries.len(),
            });
        }

        let length = restored_capacity(capacity, count, load_factor);
        let mut table = Table::with_capacity(length, load_factor);
        for (key, value) in entries {
            let hash = chain_hash(hasher.hash_one(&key));
            table.reconstitute(hash, key, value)?;
        }

        tracing::debug!(
            persisted_capacity = capacity,
            capacity = length,
            entries = count,
            "Restored table."
        );
        Ok(Self::from_parts(table, hasher))
    }
}

impl<K, V, S> Serialize for Hashtable<K, V, S>
where
    K: Serialize,
    V: Serialize,
{
    fn serialize<Ser>(&self, ser: Ser) -> std::result::Result<Ser::Ok, Ser::Error>
    where
        Ser: Serializer,
    {
        self.read(|t| {
            let mut state = ser.serialize_struct("PersistedTable", 4)?;
            state.serialize_field("capacity", &t.capacity())?;
            state.serialize_field("load_factor", &t.load_factor())?;
            state.serialize_field("count", &t.len())?;
            state.serialize_field("entries", &PersistedEntries(t))?;
            state.end()
        })
    }
}

/// Borrowed pair sequence, written without cloning the table.
struct PersistedEntries<'t, K, V>(&'t Table<K, V>);

impl<K, V> Serialize for PersistedEntries<'_, K, V>
where
    K: Serialize,
    V: Serialize,
{
    fn serialize<Ser>(&self, ser: Ser) -> std::result::Result<Ser::Ok, Ser::Error>
    where
        Ser: Serializer,
    {
        ser.collect_seq(self.0.iter_ascending().map(|(_, n)| (&n.key, &n.value)))
    }
}

impl<'de, K, V, S> Deserialize<'de> for Hashtable<K, V, S>
where
    K: Deserialize<'de> + Eq + Hash,
    V: Deserialize<'de>,
    S: BuildHasher + Default,
{
    fn deserialize<D>(de: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let persisted = PersistedTable::<K, V>::deserialize(de)?;
        Self::from_persisted_with_hasher(persisted, S::default()).map_err(serde::de::Error::custom)
    }
}
