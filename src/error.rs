//! Error type shared by every fallible table operation.

pub type Result<T> = std::result::Result<T, TableError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TableError {
    /// The table changed structurally after a fail-fast iterator captured
    /// its modification count.
    #[error("hashtable was structurally modified during traversal")]
    ConcurrentStructuralModification,

    /// `remove` on an iterator without a preceding successful advance, or
    /// called twice for the same element.
    #[error("iterator has no current element to remove")]
    IllegalCursorState,

    #[error("capacity {requested} exceeds the maximum of {max}")]
    CapacityOverflow { requested: usize, max: usize },

    #[error("illegal load factor: {0}")]
    IllegalLoadFactor(f32),

    #[error("duplicate key while restoring a persisted table")]
    DuplicateKeyOnLoad,

    #[error("persisted table declares {declared} elements but carries {actual}")]
    ElementCountMismatch { declared: usize, actual: usize },
}
