//! Capacity and threshold arithmetic.
//!
//! All sizing decisions live here as pure functions so the chain layer
//! only has to relink nodes.

/// Largest bucket array the table will ever allocate.
pub const MAX_CAPACITY: usize = i32::MAX as usize - 8;

/// Capacity used by `Hashtable::new`.
pub const DEFAULT_CAPACITY: usize = 11;

/// Load factor used by `Hashtable::new`.
pub const DEFAULT_LOAD_FACTOR: f32 = 0.75;

/// Entry count at which the next insertion triggers a rehash.
pub(crate) fn threshold_for(capacity: usize, load_factor: f32) -> usize {
    let scaled = capacity as f32 * load_factor;
    // The float bound rounds up past `i32::MAX`; cap it there.
    (scaled.min(MAX_CAPACITY as f32 + 1.0) as usize).min(i32::MAX as usize)
}

/// Capacity after one growth step, or `None` when already at the maximum.
///
/// Growth doubles and adds one so capacities stay odd.
pub(crate) fn grown_capacity(old: usize) -> Option<usize> {
    let new = old.saturating_mul(2).saturating_add(1);
    if new > MAX_CAPACITY {
        if old == MAX_CAPACITY {
            return None;
        }
        return Some(MAX_CAPACITY);
    }
    Some(new)
}

/// Bucket count for a table rebuilt from `elements` persisted pairs.
///
/// Starts from the larger of the persisted capacity and the minimum that
/// keeps the load below `load_factor`, then prefers a tighter, odd length
/// that still leaves about 5% room to grow.
pub(crate) fn restored_capacity(persisted: usize, elements: usize, load_factor: f32) -> usize {
    let scaled = |n: usize| (n as f32 / load_factor) as usize;

    let lower = persisted.max(scaled(elements).saturating_add(1));
    let mut length = scaled(elements.saturating_add(elements / 20)).saturating_add(3);
    if length > elements && length % 2 == 0 {
        length -= 1;
    }
    length.min(lower).clamp(1, MAX_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_threshold_is_eight() {
        assert_eq!(threshold_for(DEFAULT_CAPACITY, DEFAULT_LOAD_FACTOR), 8);
        assert_eq!(threshold_for(23, DEFAULT_LOAD_FACTOR), 17);
        assert_eq!(threshold_for(1, DEFAULT_LOAD_FACTOR), 0);
    }

    #[test]
    fn threshold_is_clamped_for_large_load_factors() {
        assert_eq!(threshold_for(MAX_CAPACITY, 4.0), i32::MAX as usize);
    }

    #[test]
    fn threshold_uses_single_precision() {
        // 0.7f32 is slightly below 0.7, but 10 * 0.7f32 rounds to 7.0.
        assert_eq!(threshold_for(10, 0.7), 7);
        assert_eq!(threshold_for(21, 0.7), 14);
        assert_eq!(threshold_for(10, 0.6), 6);
        assert_eq!(threshold_for(100, 0.9), 90);
    }

    #[test]
    fn restored_capacity_uses_single_precision() {
        // 7 / 0.7f32 rounds to 10.0: lower bound 11, room-to-grow 13.
        assert_eq!(restored_capacity(5, 7, 0.7), 11);
    }

    #[test]
    fn growth_doubles_plus_one() {
        assert_eq!(grown_capacity(11), Some(23));
        assert_eq!(grown_capacity(1), Some(3));
        assert_eq!(grown_capacity(23), Some(47));
    }

    #[test]
    fn growth_clamps_then_stops_at_maximum() {
        assert_eq!(grown_capacity(MAX_CAPACITY / 2 + 10), Some(MAX_CAPACITY));
        assert_eq!(grown_capacity(MAX_CAPACITY), None);
    }

    #[test]
    fn restored_capacity_prefers_odd_room_to_grow() {
        // 9 pairs at 0.75: room-to-grow length is 15, bounded by 23.
        assert_eq!(restored_capacity(23, 9, 0.75), 15);
        // Small persisted capacity is raised to fit the elements.
        assert_eq!(restored_capacity(1, 30, 0.75), 41);
    }

    #[test]
    fn restored_capacity_of_empty_table() {
        assert_eq!(restored_capacity(11, 0, 0.75), 3);
        assert_eq!(restored_capacity(0, 0, 0.75), 1);
    }

    #[test]
    fn restored_capacity_saturates() {
        assert_eq!(restored_capacity(usize::MAX, usize::MAX, 0.01), MAX_CAPACITY);
    }
}
