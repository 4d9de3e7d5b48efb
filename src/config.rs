//! Construction-time configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TableError};
use crate::growth::{DEFAULT_CAPACITY, DEFAULT_LOAD_FACTOR, MAX_CAPACITY};

/// Initial sizing for a `Hashtable`.
///
/// Deserializes with defaults for missing fields, so `{}` yields the same
/// table as `Hashtable::new()`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableConfig {
    pub initial_capacity: usize,
    pub load_factor: f32,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_CAPACITY,
            load_factor: DEFAULT_LOAD_FACTOR,
        }
    }
}

impl TableConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    pub fn with_load_factor(mut self, load_factor: f32) -> Self {
        self.load_factor = load_factor;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_load_factor(self.load_factor)?;
        if self.initial_capacity > MAX_CAPACITY {
            return Err(TableError::CapacityOverflow {
                requested: self.initial_capacity,
                max: MAX_CAPACITY,
            });
        }
        Ok(())
    }

    /// Bucket count actually allocated; a zero request becomes one bucket.
    pub(crate) fn effective_capacity(&self) -> usize {
        self.initial_capacity.max(1)
    }
}

pub(crate) fn validate_load_factor(load_factor: f32) -> Result<()> {
    if load_factor.is_nan() || load_factor <= 0.0 {
        return Err(TableError::IllegalLoadFactor(load_factor));
    }
    Ok(())
}
