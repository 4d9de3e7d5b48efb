//! Re-entrancy flag for traversals that may recurse into their own table.
//!
//! A value can hold a reference back to the table that stores it. Hashing
//! or formatting such a value walks the table again from inside the
//! traversal. The flag detects the nested entry so the caller can
//! short-circuit instead of recursing forever. It is only touched while
//! the table lock is held, so a `Cell` is enough.

use core::cell::Cell;

#[derive(Debug, Default)]
pub(crate) struct ReentrancyFlag {
    active: Cell<bool>,
}

impl ReentrancyFlag {
    pub const fn new() -> Self {
        Self {
            active: Cell::new(false),
        }
    }

    /// Mark a traversal as in progress. Returns `None` if one already is.
    #[inline]
    pub fn enter(&self) -> Option<ReentrancyGuard<'_>> {
        if self.active.replace(true) {
            return None;
        }
        Some(ReentrancyGuard { owner: self })
    }

    #[cfg(test)]
    fn is_active(&self) -> bool {
        self.active.get()
    }
}

/// Clears the flag on drop, including during unwinding.
pub(crate) struct ReentrancyGuard<'a> {
    owner: &'a ReentrancyFlag,
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        self.owner.active.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::ReentrancyFlag;

    #[test]
    fn enter_and_exit_is_ok() {
        let r = ReentrancyFlag::new();
        {
            let g = r.enter();
            assert!(g.is_some());
            assert!(r.is_active());
        }
        assert!(!r.is_active());
        assert!(r.enter().is_some());
    }

    #[test]
    fn nested_entry_is_refused() {
        let r = ReentrancyFlag::new();
        let _g1 = r.enter().unwrap();
        assert!(r.enter().is_none());
        // The refused attempt must not clear the outer marker.
        assert!(r.is_active());
    }

    #[test]
    fn flag_is_restored_after_panic() {
        let r = ReentrancyFlag::new();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _g = r.enter().unwrap();
            panic!("boom");
        }));
        assert!(res.is_err());
        assert!(!r.is_active());
    }
}
