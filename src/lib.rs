//! sync-hashtable: a thread-safe hash table of singly linked chains, with
//! compound atomic operations, fail-fast cursors and live views.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: one table-wide lock, held for the full duration of every
//!   operation, so compound read-modify-write operations are atomic and a
//!   rehash is never observed half done.
//! - Layers:
//!   - `growth`: pure sizing arithmetic (threshold, `2n + 1` growth,
//!     restored capacity).
//!   - `chain::Table<K, V>`: bucket array of chain heads over a
//!     generational node arena. No locking, no user callbacks beyond
//!     `K: Eq` during lookup.
//!   - `Hashtable<K, V, S>`: public API. Owns the hasher and a re-entrant
//!     lock around the table.
//!   - `cursor` and `views`: handles borrowing a `Hashtable` that lock once
//!     per step.
//!
//! Constraints
//! - Coarse locking only; there is no per-bucket or lock-free path.
//! - Keys and values are never absent. "No value" is `None` at the API.
//! - A node's key and cached hash never change after insertion; only the
//!   value and the chain link are mutated.
//! - Growth relinks existing nodes and recomputes each bucket from the
//!   cached hash. Hashers are not called during a rehash.
//!
//! Re-entrancy policy
//! - The lock is re-entrant, so user code running under it (compute
//!   functions, visitors, `Eq`/`Hash`/`Display` of keys and values) may
//!   read the same table.
//! - User code runs while the table is only borrowed for reading. A
//!   callback that mutates the same table panics instead of corrupting
//!   the operation in progress.
//! - Values removed or displaced by an operation are dropped after the
//!   borrow is released; their `Drop` may use the table.
//! - The structural hash and `Display` carry a flag each. A value that
//!   contains its own table re-enters them and gets `0` or `(this Map)`
//!   back.
//!
//! Cursors versus bulk traversal
//! - `keys()`/`elements()` and view iterators lock per step and may
//!   interleave with other threads. View iterators are fail-fast: a
//!   structural change by anyone but the iterator itself is reported as
//!   `TableError::ConcurrentStructuralModification` on the next step.
//! - `for_each` and `replace_all` hold the lock for the whole traversal
//!   and see a consistent table.
//!
//! Persistence
//! - `PersistedTable` is the serde form: capacity, load factor, count and
//!   pairs. Hashes are recomputed on load with the loading table's
//!   hasher, so a table restores correctly under a different seed.

mod chain;
mod config;
pub mod cursor;
mod error;
mod growth;
mod hashtable;
mod persist;
mod reentrancy;
pub mod views;

// Public surface
pub use config::TableConfig;
pub use cursor::{Cursor, Entry, Iter};
pub use error::{Result, TableError};
pub use growth::{DEFAULT_CAPACITY, DEFAULT_LOAD_FACTOR, MAX_CAPACITY};
pub use hashtable::Hashtable;
pub use persist::PersistedTable;
pub use views::{EntrySet, KeySet, ValueCollection};
