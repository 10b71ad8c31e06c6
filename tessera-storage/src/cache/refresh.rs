//! Incremental refresh.
//!
//! A refresh lists the type's folder, diffs the listing against the
//! current snapshot, fetches only new or changed ids through the worker
//! pool and publishes the assembled snapshot in one swap. Refreshes are
//! single-flight per engine.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use tessera_core::{Record, TesseraResult, Timestamp};

use super::engine::RecordCache;
use super::metrics::RefreshMetrics;
use super::snapshot::{CacheEntry, CacheSnapshot, FetchOutcome, SnapshotDiff};
use crate::codec::RecordCodec;
use crate::layout::KeyLayout;
use crate::store::{list_all, ObjectStore};

/// Listed ids with their remote timestamps and actual keys.
#[derive(Debug, Default)]
struct RemoteSummary {
    timestamps: HashMap<String, Timestamp>,
    keys: HashMap<String, String>,
}

impl<T: Record> RecordCache<T> {
    /// Bring the snapshot up to date with the store.
    ///
    /// A caller that arrives while another refresh is running waits for
    /// it and returns its result, failed or not, instead of starting a
    /// second one. On a listing failure the current snapshot stays
    /// published.
    pub async fn refresh(&self) -> TesseraResult<Arc<CacheSnapshot<T>>> {
        let seen_attempts = self.inner.refresh_attempts.load(Ordering::Acquire);
        let seen = self.snapshot()?.generation();
        let mut last_failure = self.inner.refresh_lock.lock().await;

        let previous = self.snapshot()?;
        let attempted = self.inner.refresh_attempts.load(Ordering::Acquire) != seen_attempts;
        if attempted || previous.generation() != seen {
            RefreshMetrics::incr(&self.inner.metrics.joined_refreshes, 1);
            tracing::debug!(
                record_type = %self.record_type(),
                generation = previous.generation(),
                failed = attempted && last_failure.is_some(),
                "Joined in-flight refresh"
            );
            return match last_failure.as_ref() {
                Some(e) if attempted => Err(e.clone()),
                _ => Ok(previous),
            };
        }

        let result = tokio::select! {
            result = self.run_refresh(previous) => result,
            _ = self.shutdown_deadline() => Err(self.abandoned("refresh")),
        };

        if let Err(e) = &result {
            RefreshMetrics::incr(&self.inner.metrics.refresh_failures, 1);
            self.inner.health.record_failure();
            if e.is_abandoned() {
                tracing::warn!(
                    record_type = %self.record_type(),
                    grace_ms = self.config().shutdown_grace.as_millis() as u64,
                    "Refresh abandoned at shutdown"
                );
            } else {
                tracing::error!(
                    record_type = %self.record_type(),
                    error = %e,
                    "Refresh failed, keeping current snapshot"
                );
            }
        }

        *last_failure = result.as_ref().err().cloned();
        self.inner.refresh_attempts.fetch_add(1, Ordering::Release);
        result
    }

    async fn run_refresh(
        &self,
        previous: Arc<CacheSnapshot<T>>,
    ) -> TesseraResult<Arc<CacheSnapshot<T>>> {
        // Taken before listing so writes racing the listing re-trigger a
        // refresh on the next read.
        let started_at = Utc::now();
        tracing::debug!(record_type = %self.record_type(), "Refresh started");

        let summary = self.list_remote().await?;
        let diff = SnapshotDiff::compute(&previous, &summary.timestamps);
        let outcomes = self.fetch_changed(&diff.changed, &summary.keys).await;
        let (next, stats) = CacheSnapshot::assemble(&previous, &diff, outcomes, started_at);
        let next = Arc::new(next);
        self.publish(Arc::clone(&next))?;

        let metrics = &self.inner.metrics;
        RefreshMetrics::incr(&metrics.refresh_cycles, 1);
        RefreshMetrics::incr(&metrics.items_fetched, stats.fetched);
        RefreshMetrics::incr(&metrics.items_removed, stats.removed + stats.vanished);
        RefreshMetrics::incr(&metrics.fetch_failures, stats.failed + stats.corrupt);
        self.inner.health.record_success(started_at);

        if diff.is_noop() {
            tracing::trace!(
                record_type = %self.record_type(),
                records = next.len(),
                "Refresh completed with no changes"
            );
        } else {
            tracing::info!(
                record_type = %self.record_type(),
                records = next.len(),
                fetched = stats.fetched,
                removed = stats.removed + stats.vanished,
                failed = stats.failed + stats.corrupt,
                elapsed_ms = (Utc::now() - started_at).num_milliseconds(),
                "Refresh completed"
            );
        }
        Ok(next)
    }

    async fn list_remote(&self) -> TesseraResult<RemoteSummary> {
        let layout = &self.inner.layout;
        let listed = list_all(
            self.inner.store.as_ref(),
            layout.prefix(),
            self.config().list_page_size,
        )
        .await?;

        let mut summary = RemoteSummary::default();
        for object in listed {
            let Some(id) = layout.id_from_key(&object.key) else {
                continue;
            };
            let id = KeyLayout::normalize_id(&id);
            let newer = summary
                .timestamps
                .get(&id)
                .map_or(true, |seen| object.last_modified > *seen);
            if newer {
                summary.timestamps.insert(id.clone(), object.last_modified);
                summary.keys.insert(id, object.key);
            }
        }
        Ok(summary)
    }

    async fn fetch_changed(
        &self,
        changed: &[String],
        keys: &HashMap<String, String>,
    ) -> HashMap<String, FetchOutcome<T>> {
        let jobs: Vec<(String, String)> = changed
            .iter()
            .filter_map(|id| keys.get(id).map(|key| (id.clone(), key.clone())))
            .collect();
        if jobs.is_empty() {
            return HashMap::new();
        }

        let store = Arc::clone(&self.inner.store);
        let codec = Arc::clone(&self.inner.codec);
        let results = self
            .inner
            .pool
            .run(jobs, move |(id, key)| {
                let store = Arc::clone(&store);
                let codec = Arc::clone(&codec);
                async move {
                    let outcome = fetch_one(store.as_ref(), codec.as_ref(), &key).await;
                    (id, key, outcome)
                }
            })
            .await;

        let mut outcomes = HashMap::with_capacity(results.len());
        for (id, key, outcome) in results {
            match &outcome {
                FetchOutcome::Failed(e) => tracing::warn!(
                    record_type = %self.record_type(),
                    key = %key,
                    error = %e,
                    "Failed to fetch record, keeping previous value"
                ),
                FetchOutcome::Corrupt(e) => tracing::warn!(
                    record_type = %self.record_type(),
                    key = %key,
                    error = %e,
                    "Dropping undecodable record"
                ),
                FetchOutcome::Vanished => tracing::debug!(
                    record_type = %self.record_type(),
                    key = %key,
                    "Record deleted between list and fetch"
                ),
                FetchOutcome::Fetched(_) => {}
            }
            outcomes.insert(id, outcome);
        }
        outcomes
    }
}

async fn fetch_one<T: Record>(
    store: &dyn ObjectStore,
    codec: &dyn RecordCodec<T>,
    key: &str,
) -> FetchOutcome<T> {
    match store.get(key).await {
        Ok(Some(object)) => match codec.decode(key, &object.body) {
            Ok(mut record) => {
                record.set_last_modified(object.last_modified);
                FetchOutcome::Fetched(CacheEntry::new(record, object.last_modified))
            }
            Err(e) => FetchOutcome::Corrupt(e),
        },
        Ok(None) => FetchOutcome::Vanished,
        Err(e) if e.is_not_found() => FetchOutcome::Vanished,
        Err(e) => FetchOutcome::Failed(e),
    }
}
