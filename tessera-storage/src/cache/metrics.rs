//! Refresh counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one engine, updated lock-free.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
    /// Refreshes that published a new snapshot
    pub refresh_cycles: AtomicU64,
    /// Timer ticks where the marker showed nothing changed
    pub skipped_cycles: AtomicU64,
    /// Callers that waited on an in-flight refresh instead of running one
    pub joined_refreshes: AtomicU64,
    /// Refreshes aborted by a listing error or shutdown
    pub refresh_failures: AtomicU64,
    /// Records read because they were new or changed
    pub items_fetched: AtomicU64,
    /// Records evicted because they were no longer listed
    pub items_removed: AtomicU64,
    /// Per-record reads that failed or could not be decoded
    pub fetch_failures: AtomicU64,
}

impl RefreshMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RefreshMetricsSnapshot {
        RefreshMetricsSnapshot {
            refresh_cycles: self.refresh_cycles.load(Ordering::Relaxed),
            skipped_cycles: self.skipped_cycles.load(Ordering::Relaxed),
            joined_refreshes: self.joined_refreshes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            items_fetched: self.items_fetched.load(Ordering::Relaxed),
            items_removed: self.items_removed.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn incr(counter: &AtomicU64, by: usize) {
        counter.fetch_add(by as u64, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`RefreshMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshMetricsSnapshot {
    pub refresh_cycles: u64,
    pub skipped_cycles: u64,
    pub joined_refreshes: u64,
    pub refresh_failures: u64,
    pub items_fetched: u64,
    pub items_removed: u64,
    pub fetch_failures: u64,
}
