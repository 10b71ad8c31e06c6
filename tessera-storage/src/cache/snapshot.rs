//! Immutable cache snapshots and the refresh diff.
//!
//! A snapshot is never mutated after it is built. Refresh computes a
//! [`SnapshotDiff`] against the remote summary, fetches the changed ids
//! and assembles a new snapshot that shares unchanged entries with the
//! old one.

use std::collections::HashMap;
use std::sync::Arc;

use tessera_core::{Record, TesseraError, Timestamp};

/// One cached record plus the remote timestamp it was read at.
///
/// `observed_at` is the store's own last-modified value for the blob,
/// which can differ from the payload's internal field.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub record: T,
    pub observed_at: Timestamp,
}

impl<T> CacheEntry<T> {
    pub fn new(record: T, observed_at: Timestamp) -> Self {
        Self {
            record,
            observed_at,
        }
    }
}

/// Point-in-time set of every known record of one type, keyed by
/// normalized id.
#[derive(Debug)]
pub struct CacheSnapshot<T> {
    entries: HashMap<String, Arc<CacheEntry<T>>>,
    refreshed_at: Option<Timestamp>,
    generation: u64,
}

impl<T> Default for CacheSnapshot<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> CacheSnapshot<T> {
    /// The snapshot an engine starts with: empty and never refreshed.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            refreshed_at: None,
            generation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a refresh has ever produced this snapshot.
    pub fn is_populated(&self) -> bool {
        self.refreshed_at.is_some()
    }

    /// Start time of the refresh that built this snapshot.
    pub fn refreshed_at(&self) -> Option<Timestamp> {
        self.refreshed_at
    }

    /// Number of successful refreshes before this snapshot, inclusive.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, id: &str) -> Option<&Arc<CacheEntry<T>>> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Arc<CacheEntry<T>>)> {
        self.entries.iter().map(|(id, e)| (id.as_str(), e))
    }
}

impl<T: Record> CacheSnapshot<T> {
    /// Clone every record out of the snapshot.
    pub fn records(&self) -> Vec<T> {
        self.entries.values().map(|e| e.record.clone()).collect()
    }
}

/// Result of fetching one changed id during refresh.
#[derive(Debug)]
pub enum FetchOutcome<T> {
    /// Body read and decoded.
    Fetched(CacheEntry<T>),
    /// Listed but gone by the time it was read; counts as a removal.
    Vanished,
    /// Body could not be decoded; the id is dropped.
    Corrupt(TesseraError),
    /// Remote read failed; the previous value, if any, is kept.
    Failed(TesseraError),
}

/// How a remote summary differs from the previous snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// Present in both, remote not newer than what was observed.
    pub unchanged: Vec<String>,
    /// New ids, or ids whose remote timestamp moved forward.
    pub changed: Vec<String>,
    /// In the previous snapshot but no longer listed.
    pub removed: Vec<String>,
}

impl SnapshotDiff {
    pub fn compute<T>(
        previous: &CacheSnapshot<T>,
        summary: &HashMap<String, Timestamp>,
    ) -> Self {
        let mut diff = Self::default();
        for (id, remote) in summary {
            match previous.get(id) {
                Some(entry) if entry.observed_at >= *remote => diff.unchanged.push(id.clone()),
                _ => diff.changed.push(id.clone()),
            }
        }
        diff.removed = previous
            .ids()
            .filter(|id| !summary.contains_key(*id))
            .map(str::to_string)
            .collect();
        diff
    }

    pub fn is_noop(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Counts from assembling a snapshot, for logs and metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblyStats {
    pub carried: usize,
    pub fetched: usize,
    pub removed: usize,
    pub vanished: usize,
    pub corrupt: usize,
    pub retained_after_failure: usize,
    pub failed: usize,
}

impl<T> CacheSnapshot<T> {
    /// Build the successor of `previous`.
    ///
    /// Unchanged entries are shared by reference. A changed id with no
    /// outcome (its worker died) is treated like a failed fetch.
    pub fn assemble(
        previous: &CacheSnapshot<T>,
        diff: &SnapshotDiff,
        mut outcomes: HashMap<String, FetchOutcome<T>>,
        refreshed_at: Timestamp,
    ) -> (Self, AssemblyStats) {
        let mut stats = AssemblyStats {
            removed: diff.removed.len(),
            ..AssemblyStats::default()
        };
        let mut entries = HashMap::with_capacity(diff.unchanged.len() + diff.changed.len());

        for id in &diff.unchanged {
            if let Some(entry) = previous.get(id) {
                entries.insert(id.clone(), Arc::clone(entry));
                stats.carried += 1;
            }
        }

        for id in &diff.changed {
            match outcomes.remove(id) {
                Some(FetchOutcome::Fetched(entry)) => {
                    entries.insert(id.clone(), Arc::new(entry));
                    stats.fetched += 1;
                }
                Some(FetchOutcome::Vanished) => stats.vanished += 1,
                Some(FetchOutcome::Corrupt(_)) => stats.corrupt += 1,
                Some(FetchOutcome::Failed(_)) | None => {
                    stats.failed += 1;
                    if let Some(entry) = previous.get(id) {
                        entries.insert(id.clone(), Arc::clone(entry));
                        stats.retained_after_failure += 1;
                    }
                }
            }
        }

        let refreshed_at = match previous.refreshed_at {
            Some(prev) if prev > refreshed_at => prev,
            _ => refreshed_at,
        };

        let snapshot = Self {
            entries,
            refreshed_at: Some(refreshed_at),
            generation: previous.generation + 1,
        };
        (snapshot, stats)
    }
}
