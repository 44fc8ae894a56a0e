//! Per-node-type metrics: atomic counters plus derived rates.
//!
//! Grounded on the teacher's `metrics/mod.rs` (`CoreCacheMetrics`:
//! `record_hit`/`record_miss`, `hit_rate`/`miss_rate` computed on read,
//! `to_btreemap()` for deterministic ordering) and on
//! `original_source/cacheme/interfaces.py`'s `Metrics` class, which names
//! exactly the six counters this module tracks and documents when each
//! increments. The counting rule used here (hit on any tier hit *or* a
//! joined in-flight load; miss only for the lookup that *initiates* a
//! load) is spelled out in SPEC_FULL.md and validated against spec §8's
//! scenarios S1/S2 — it is a refinement of the original source, which
//! increments `miss_count` once per caller that misses its single
//! configured local cache, not once per initiated load.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Atomic counters for a single node type, safe to share across tasks.
#[derive(Debug, Default)]
pub struct NodeMetrics {
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    load_success_count: AtomicU64,
    load_failure_count: AtomicU64,
    eviction_count: AtomicU64,
    total_load_time_ns: AtomicU64,
}

impl NodeMetrics {
    pub fn record_hit(&self) {
        self.hit_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.miss_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_success(&self, elapsed: std::time::Duration) {
        self.load_success_count.fetch_add(1, Ordering::Relaxed);
        self.total_load_time_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn record_load_failure(&self, elapsed: std::time::Duration) {
        self.load_failure_count.fetch_add(1, Ordering::Relaxed);
        self.total_load_time_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.eviction_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds `n` evictions at once, for a storage tier that only reports an
    /// aggregate count (see [`crate::storage::Storage::evictions_since_last_check`])
    /// rather than one call per eviction.
    pub fn record_evictions(&self, n: u64) {
        self.eviction_count.fetch_add(n, Ordering::Relaxed);
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.miss_count.load(Ordering::Relaxed)
    }

    pub fn load_success_count(&self) -> u64 {
        self.load_success_count.load(Ordering::Relaxed)
    }

    pub fn load_failure_count(&self) -> u64 {
        self.load_failure_count.load(Ordering::Relaxed)
    }

    pub fn eviction_count(&self) -> u64 {
        self.eviction_count.load(Ordering::Relaxed)
    }

    /// `hit_count + miss_count`: every lookup that reached the engine.
    pub fn request_count(&self) -> u64 {
        self.hit_count() + self.miss_count()
    }

    pub fn hit_rate(&self) -> f64 {
        ratio(self.hit_count(), self.request_count())
    }

    pub fn miss_rate(&self) -> f64 {
        ratio(self.miss_count(), self.request_count())
    }

    /// `load_success_count + load_failure_count`: every load the engine
    /// actually initiated, as opposed to joined in flight.
    pub fn load_count(&self) -> u64 {
        self.load_success_count() + self.load_failure_count()
    }

    pub fn load_failure_rate(&self) -> f64 {
        ratio(self.load_failure_count(), self.load_count())
    }

    pub fn average_load_time(&self) -> std::time::Duration {
        let count = self.load_count();
        if count == 0 {
            return std::time::Duration::ZERO;
        }
        std::time::Duration::from_nanos(self.total_load_time_ns.load(Ordering::Relaxed) / count)
    }

    /// A deterministically-ordered snapshot, for logging or a metrics
    /// endpoint — `BTreeMap` rather than a hash map so repeated dumps
    /// diff cleanly, matching the teacher's `to_btreemap()` rationale.
    pub fn to_btreemap(&self) -> BTreeMap<&'static str, u64> {
        let mut map = BTreeMap::new();
        map.insert("hit_count", self.hit_count());
        map.insert("miss_count", self.miss_count());
        map.insert("load_success_count", self.load_success_count());
        map.insert("load_failure_count", self.load_failure_count());
        map.insert("eviction_count", self.eviction_count());
        map.insert(
            "total_load_time_ns",
            self.total_load_time_ns.load(Ordering::Relaxed),
        );
        map
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// A registry of [`NodeMetrics`], one per node type (or, for a dynamic
/// node, per runtime name), lazily created on first access. Keyed by
/// owned `String` rather than `&'static str`: a static node's type name is
/// `'static`, but a dynamic node's name is only known at runtime (see
/// [`crate::node::Node::type_name`]).
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    by_type: DashMap<String, std::sync::Arc<NodeMetrics>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_type(&self, type_name: &str) -> std::sync::Arc<NodeMetrics> {
        if let Some(existing) = self.by_type.get(type_name) {
            return existing.clone();
        }
        self.by_type
            .entry(type_name.to_string())
            .or_insert_with(|| std::sync::Arc::new(NodeMetrics::default()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn hit_and_miss_rates_are_derived_correctly() {
        let m = NodeMetrics::default();
        m.record_hit();
        m.record_hit();
        m.record_hit();
        m.record_miss();
        assert_eq!(m.request_count(), 4);
        assert_eq!(m.hit_rate(), 0.75);
        assert_eq!(m.miss_rate(), 0.25);
    }

    #[test]
    fn rates_are_zero_with_no_requests() {
        let m = NodeMetrics::default();
        assert_eq!(m.hit_rate(), 0.0);
        assert_eq!(m.load_failure_rate(), 0.0);
        assert_eq!(m.average_load_time(), Duration::ZERO);
    }

    #[test]
    fn load_counters_are_independent_of_hit_miss() {
        let m = NodeMetrics::default();
        m.record_miss();
        m.record_load_success(Duration::from_millis(10));
        assert_eq!(m.load_count(), 1);
        assert_eq!(m.load_failure_rate(), 0.0);
        assert_eq!(m.average_load_time(), Duration::from_millis(10));
    }

    #[test]
    fn registry_returns_the_same_instance_per_type() {
        let registry = MetricsRegistry::new();
        let a = registry.for_type("t1");
        a.record_hit();
        let b = registry.for_type("t1");
        assert_eq!(b.hit_count(), 1);
    }

    #[test]
    fn counters_are_monotonic() {
        let m = NodeMetrics::default();
        for _ in 0..10 {
            m.record_hit();
        }
        assert_eq!(m.hit_count(), 10);
    }
}
