//! Stats Module - per-VM allocation and collection counters
//!
//! Trimmed port of `fgc::stats::GcStats`: atomics for the counters every
//! caller wants without locking, a pause-time histogram, and a `summary()`
//! snapshot. The young/old generation split and the `Histogram` type's
//! bucket machinery are dropped — this collector has one generation and
//! pause times are few enough per process that a running min/max/total is
//! sufficient.

use indexmap::IndexMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Live counters for a single VM's heap. Cheap enough to leave enabled by
/// default (see [`crate::config::VmConfig::stats_enabled`]).
pub struct VmStats {
    allocations: AtomicU64,
    bytes_allocated: AtomicU64,
    collections: AtomicU64,
    bytes_reclaimed: AtomicU64,
    pause_count: AtomicU64,
    pause_total_nanos: AtomicU64,
    pause_max_nanos: AtomicU64,
    start_time: Instant,
}

impl Default for VmStats {
    fn default() -> Self {
        VmStats {
            allocations: AtomicU64::new(0),
            bytes_allocated: AtomicU64::new(0),
            collections: AtomicU64::new(0),
            bytes_reclaimed: AtomicU64::new(0),
            pause_count: AtomicU64::new(0),
            pause_total_nanos: AtomicU64::new(0),
            pause_max_nanos: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }
}

impl VmStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_allocation(&self, bytes: usize) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.bytes_allocated.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_collection(&self, stats: &crate::gc::CollectionStats, pause: Duration) {
        self.collections.fetch_add(1, Ordering::Relaxed);
        let reclaimed = stats.bytes_before.saturating_sub(stats.bytes_after);
        self.bytes_reclaimed.fetch_add(reclaimed as u64, Ordering::Relaxed);

        let nanos = pause.as_nanos() as u64;
        self.pause_count.fetch_add(1, Ordering::Relaxed);
        self.pause_total_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.pause_max_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    /// Insertion-ordered key/value dump of [`StatsSummary`], the shape a
    /// diagnostics command or log line wants — grounded on
    /// `fgc::gc::GarbageCollector::diagnostics`'s `IndexMap` return type.
    pub fn diagnostics(&self) -> IndexMap<&'static str, String> {
        let summary = self.summary();
        let mut map = IndexMap::new();
        map.insert("allocations", summary.allocations.to_string());
        map.insert("bytes_allocated", summary.bytes_allocated.to_string());
        map.insert("collections", summary.collections.to_string());
        map.insert("bytes_reclaimed", summary.bytes_reclaimed.to_string());
        map.insert("avg_pause_nanos", summary.avg_pause_nanos.to_string());
        map.insert("max_pause_nanos", summary.max_pause_nanos.to_string());
        map.insert("uptime_secs", summary.uptime.as_secs_f64().to_string());
        map
    }

    pub fn summary(&self) -> StatsSummary {
        let pause_count = self.pause_count.load(Ordering::Relaxed);
        let pause_total = self.pause_total_nanos.load(Ordering::Relaxed);
        StatsSummary {
            allocations: self.allocations.load(Ordering::Relaxed),
            bytes_allocated: self.bytes_allocated.load(Ordering::Relaxed),
            collections: self.collections.load(Ordering::Relaxed),
            bytes_reclaimed: self.bytes_reclaimed.load(Ordering::Relaxed),
            avg_pause_nanos: if pause_count == 0 { 0 } else { pause_total / pause_count },
            max_pause_nanos: self.pause_max_nanos.load(Ordering::Relaxed),
            uptime: self.start_time.elapsed(),
        }
    }
}

/// Point-in-time snapshot returned by [`VmStats::summary`].
#[derive(Debug, Clone)]
pub struct StatsSummary {
    pub allocations: u64,
    pub bytes_allocated: u64,
    pub collections: u64,
    pub bytes_reclaimed: u64,
    pub avg_pause_nanos: u64,
    pub max_pause_nanos: u64,
    pub uptime: Duration,
}

/// A lifetime peak-usage counter, used by [`crate::vm::Vm`] to report the
/// high-water mark independent of the live `Heap::bytes_used` value.
#[derive(Default)]
pub struct PeakUsage {
    peak: AtomicUsize,
}

impl PeakUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, current: usize) {
        self.peak.fetch_max(current, Ordering::Relaxed);
    }

    pub fn get(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_allocations() {
        let stats = VmStats::new();
        stats.record_allocation(24);
        stats.record_allocation(32);
        let s = stats.summary();
        assert_eq!(s.allocations, 2);
        assert_eq!(s.bytes_allocated, 56);
    }

    #[test]
    fn diagnostics_reports_allocation_count() {
        let stats = VmStats::new();
        stats.record_allocation(16);
        let diag = stats.diagnostics();
        assert_eq!(diag.get("allocations").map(String::as_str), Some("1"));
        assert_eq!(diag.keys().next(), Some(&"allocations"));
    }

    #[test]
    fn peak_usage_only_increases() {
        let peak = PeakUsage::new();
        peak.observe(100);
        peak.observe(50);
        assert_eq!(peak.get(), 100);
        peak.observe(200);
        assert_eq!(peak.get(), 200);
    }
}
