//! The doorkeeper gate: a one-hit-wonder filter consulted once per lookup
//! before a freshly loaded value is written back to any tier.
//!
//! The concrete Bloom-filter doorkeeper is explicitly out of scope (spec
//! §1); this module only defines the trait boundary plus a trivial
//! always-admit implementation, grounded on the `put`/`contains`/`reset`
//! shape of `original_source/v2/filter.py`'s `BloomFilter`.

/// Gates whether a freshly loaded value is written back to storage tiers.
///
/// A doorkeeper tracks which keys have been *seen* before. On the first
/// sighting of a key it returns `false` ("not seen yet, don't write") and
/// records the key; on a later sighting it returns `true` ("seen before,
/// go ahead and write"). This turns single-hit keys (scans, one-off
/// lookups) into write-through misses instead of cache pollution.
pub trait Doorkeeper: Send + Sync {
    /// Records a sighting of `key` and reports whether it had been seen
    /// before this call.
    fn seen(&self, key: &str) -> bool;

    /// Clears all recorded sightings.
    fn reset(&self);
}

/// A doorkeeper that always reports a key as previously seen, so every
/// loaded value is written back immediately. Used as the default when a
/// node does not declare one.
#[derive(Debug, Default)]
pub struct AlwaysAdmit;

impl Doorkeeper for AlwaysAdmit {
    fn seen(&self, _key: &str) -> bool {
        true
    }

    fn reset(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_admit_never_blocks() {
        let gate = AlwaysAdmit;
        assert!(gate.seen("a"));
        assert!(gate.seen("a"));
        gate.reset();
        assert!(gate.seen("a"));
    }
}
