//! Eventually-consistent object store double.
//!
//! Mutations are queued and only become visible to readers after
//! [`EventuallyConsistentObjectStore::flush`]. Tests use it to pin down
//! exactly when a write reaches other readers without depending on real
//! network timing.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tessera_core::{StoreError, TesseraError, TesseraResult, Timestamp};

use super::{
    InMemoryObjectStore, ListPage, ObjectStore, StoredObject, VersionSummary, Versioning,
};

#[derive(Debug)]
enum PendingOp {
    Put { key: String, body: Vec<u8> },
    Delete { key: String },
    Snapshot { key: String },
}

/// Store whose writes are buffered until flushed.
#[derive(Debug)]
pub struct EventuallyConsistentObjectStore {
    inner: InMemoryObjectStore,
    pending: Mutex<VecDeque<PendingOp>>,
}

impl EventuallyConsistentObjectStore {
    pub fn new(inner: InMemoryObjectStore) -> Self {
        Self {
            inner,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Unversioned double over a fresh in-memory store.
    pub fn plain(bucket: impl Into<String>) -> Self {
        Self::new(InMemoryObjectStore::plain(bucket))
    }

    /// Number of mutations waiting for a flush.
    pub fn pending(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Make every queued mutation visible, in submission order.
    pub async fn flush(&self) -> TesseraResult<usize> {
        let ops: Vec<PendingOp> = {
            let mut pending = self
                .pending
                .lock()
                .map_err(|_| TesseraError::Store(StoreError::LockPoisoned))?;
            pending.drain(..).collect()
        };

        let applied = ops.len();
        for op in ops {
            match op {
                PendingOp::Put { key, body } => {
                    self.inner.put(&key, body).await?;
                }
                PendingOp::Delete { key } => self.inner.delete(&key).await?,
                PendingOp::Snapshot { key } => self.inner.snapshot(&key).await?,
            }
        }
        Ok(applied)
    }

    fn enqueue(&self, op: PendingOp) -> TesseraResult<()> {
        self.pending
            .lock()
            .map_err(|_| TesseraError::Store(StoreError::LockPoisoned))?
            .push_back(op);
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for EventuallyConsistentObjectStore {
    fn name(&self) -> &str {
        "eventually-consistent-memory"
    }

    async fn ensure_bucket_exists(&self) -> TesseraResult<()> {
        self.inner.ensure_bucket_exists().await
    }

    fn versioning(&self) -> Versioning {
        self.inner.versioning()
    }

    fn health_interval(&self) -> Duration {
        self.inner.health_interval()
    }

    async fn list(
        &self,
        prefix: &str,
        continuation: Option<String>,
        page_size: usize,
    ) -> TesseraResult<ListPage> {
        self.inner.list(prefix, continuation, page_size).await
    }

    async fn get(&self, key: &str) -> TesseraResult<Option<StoredObject>> {
        self.inner.get(key).await
    }

    async fn get_version(
        &self,
        key: &str,
        version_id: &str,
    ) -> TesseraResult<Option<StoredObject>> {
        self.inner.get_version(key, version_id).await
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> TesseraResult<Timestamp> {
        self.enqueue(PendingOp::Put {
            key: key.to_string(),
            body,
        })?;
        Ok(Utc::now())
    }

    async fn delete(&self, key: &str) -> TesseraResult<()> {
        self.enqueue(PendingOp::Delete {
            key: key.to_string(),
        })
    }

    async fn snapshot(&self, key: &str) -> TesseraResult<()> {
        self.enqueue(PendingOp::Snapshot {
            key: key.to_string(),
        })
    }

    async fn list_versions(
        &self,
        key: &str,
        max_results: usize,
    ) -> TesseraResult<Vec<VersionSummary>> {
        self.inner.list_versions(key, max_results).await
    }
}
