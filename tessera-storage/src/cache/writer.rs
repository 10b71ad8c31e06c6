//! Write path.
//!
//! Every mutation writes the data first and the staleness marker second,
//! so a reader that sees the new marker is guaranteed to find the new
//! data when it lists. Bulk operations touch the marker once at the end.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tessera_core::{Record, StoreError, TesseraError, TesseraResult, Timestamp};

use super::engine::RecordCache;
use crate::codec::RecordCodec;
use crate::store::{ObjectStore, Versioning};

/// Outcome of a bulk operation that fully succeeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkReport {
    pub succeeded: usize,
    pub elapsed: Duration,
}

impl<T: Record> RecordCache<T> {
    /// Write `record` under `id` and return it stamped with the write time.
    ///
    /// The returned value is the local echo of what was written; the store
    /// is not re-read, so it is correct even when the store is only
    /// eventually consistent.
    pub async fn upsert(&self, id: &str, mut record: T) -> TesseraResult<T> {
        self.ensure_writable("upsert")?;
        let key = self.inner.layout.record_key(id);
        let written_at = write_one(
            self.inner.store.as_ref(),
            self.inner.codec.as_ref(),
            &key,
            &record,
        )
        .await?;
        self.inner.oracle.mark_changed().await?;

        tracing::debug!(record_type = %self.record_type(), id, "Record written");
        record.set_last_modified(written_at);
        Ok(record)
    }

    /// Delete the record stored under `id`. Deleting a missing id succeeds.
    pub async fn delete(&self, id: &str) -> TesseraResult<()> {
        self.ensure_writable("delete")?;
        let key = self.inner.layout.record_key(id);
        self.inner.store.delete(&key).await?;
        self.inner.oracle.mark_changed().await?;
        tracing::debug!(record_type = %self.record_type(), id, "Record deleted");
        Ok(())
    }

    /// Write many records with bounded concurrency.
    ///
    /// Each record is stored under its own id. Fails with
    /// [`StoreError::BulkFailed`] naming every id that was not written,
    /// after the marker has been touched for the ones that were.
    pub async fn bulk_upsert(&self, records: Vec<T>) -> TesseraResult<BulkReport> {
        self.ensure_writable("bulk_upsert")?;
        let layout = &self.inner.layout;
        let jobs: Vec<(String, (String, T))> = records
            .into_iter()
            .map(|record| {
                let id = record.id().to_string();
                let key = layout.record_key(&id);
                (id, (key, record))
            })
            .collect();

        let store = Arc::clone(&self.inner.store);
        let codec = Arc::clone(&self.inner.codec);
        self.run_bulk("bulk_upsert", jobs, move |(key, record)| {
            let store = Arc::clone(&store);
            let codec = Arc::clone(&codec);
            async move {
                write_one(store.as_ref(), codec.as_ref(), &key, &record)
                    .await
                    .map(|_| ())
            }
        })
        .await
    }

    /// Delete many ids with bounded concurrency.
    pub async fn bulk_delete(&self, ids: Vec<String>) -> TesseraResult<BulkReport> {
        self.ensure_writable("bulk_delete")?;
        let jobs: Vec<(String, String)> = ids
            .into_iter()
            .map(|id| {
                let key = self.inner.layout.record_key(&id);
                (id, key)
            })
            .collect();

        let store = Arc::clone(&self.inner.store);
        self.run_bulk("bulk_delete", jobs, move |key| {
            let store = Arc::clone(&store);
            async move { store.delete(&key).await }
        })
        .await
    }

    fn ensure_writable(&self, operation: &str) -> TesseraResult<()> {
        if self.config().read_only {
            return Err(TesseraError::Store(StoreError::ReadOnly {
                operation: format!("{operation} on {}", self.record_type()),
            }));
        }
        Ok(())
    }

    async fn run_bulk<I, F, Fut>(
        &self,
        operation: &str,
        jobs: Vec<(String, I)>,
        task: F,
    ) -> TesseraResult<BulkReport>
    where
        I: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TesseraResult<()>> + Send + 'static,
    {
        if jobs.is_empty() {
            return Ok(BulkReport::default());
        }

        let started = Instant::now();
        let ids: Vec<String> = jobs.iter().map(|(id, _)| id.clone()).collect();
        let run = self.inner.pool.run(jobs, move |(id, item)| {
            let call = task(item);
            async move { (id, call.await) }
        });

        let results = tokio::select! {
            results = run => Some(results),
            _ = self.shutdown_deadline() => None,
        };

        // Some writes may have landed even when the rest were abandoned.
        let marked = self.inner.oracle.mark_changed().await;

        let Some(results) = results else {
            if let Err(e) = &marked {
                tracing::error!(
                    record_type = %self.record_type(),
                    error = %e,
                    "Failed to mark changed after abandoned bulk operation"
                );
            }
            tracing::warn!(
                record_type = %self.record_type(),
                operation,
                "Bulk operation abandoned at shutdown"
            );
            return Err(self.abandoned(operation));
        };
        marked?;

        let mut succeeded = HashSet::with_capacity(results.len());
        for (id, result) in results {
            match result {
                Ok(()) => {
                    succeeded.insert(id);
                }
                Err(e) => tracing::warn!(
                    record_type = %self.record_type(),
                    operation,
                    id = %id,
                    error = %e,
                    "Bulk item failed"
                ),
            }
        }

        let failed: Vec<String> = ids
            .into_iter()
            .filter(|id| !succeeded.contains(id))
            .collect();
        if !failed.is_empty() {
            return Err(TesseraError::Store(StoreError::BulkFailed {
                record_type: self.record_type().name.clone(),
                failed,
            }));
        }

        let report = BulkReport {
            succeeded: succeeded.len(),
            elapsed: started.elapsed(),
        };
        tracing::info!(
            record_type = %self.record_type(),
            operation,
            succeeded = report.succeeded,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Bulk operation completed"
        );
        Ok(report)
    }
}

/// Encode and store one record, snapshotting the old body first when the
/// backend only keeps versions on request.
async fn write_one<T: Record>(
    store: &dyn ObjectStore,
    codec: &dyn RecordCodec<T>,
    key: &str,
    record: &T,
) -> TesseraResult<Timestamp> {
    let body = codec.encode(record)?;
    if store.versioning() == Versioning::Snapshot {
        store.snapshot(key).await?;
    }
    store.put(key, body).await
}
