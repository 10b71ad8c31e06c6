//! Remote object store interface.
//!
//! The cache engine talks to blob storage only through [`ObjectStore`].
//! Each backend is one implementation of the trait, chosen at startup by
//! [`tessera_core::BackendKind`]; the engine never branches on the
//! concrete type, only on [`ObjectStore::versioning`].

pub mod eventual;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tessera_core::{BackendKind, StoreConfig, TesseraResult, Timestamp};

pub use eventual::EventuallyConsistentObjectStore;
pub use memory::InMemoryObjectStore;

/// Default health interval reported by a backend.
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(30);

/// How a backend keeps historical versions of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Versioning {
    /// Only the current body exists.
    Unsupported,
    /// Every overwrite retains the previous body on its own.
    Automatic,
    /// Previous bodies are kept only when [`ObjectStore::snapshot`] is called.
    Snapshot,
}

impl Versioning {
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

/// Metadata for one listed key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub last_modified: Timestamp,
}

/// One page of a listing, with an opaque continuation token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    /// Pass back to [`ObjectStore::list`] for the next page; `None` when done.
    pub continuation: Option<String>,
}

/// A blob body plus its remote metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub last_modified: Timestamp,
}

/// One historical version of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSummary {
    pub version_id: String,
    pub last_modified: Timestamp,
}

/// Blob store addressed by logical keys.
///
/// Implementations own their retry and auth concerns. A missing key is
/// `Ok(None)` from the getters, never an error.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short backend name for logs and errors.
    fn name(&self) -> &str;

    /// Create the bucket if it is not there.
    async fn ensure_bucket_exists(&self) -> TesseraResult<()>;

    /// Versioning capability of this backend.
    fn versioning(&self) -> Versioning;

    fn supports_versioning(&self) -> bool {
        self.versioning().is_supported()
    }

    /// Grace window after which a cache with no completed refresh is degraded.
    fn health_interval(&self) -> Duration {
        DEFAULT_HEALTH_INTERVAL
    }

    /// List keys under `prefix`, one page at a time.
    async fn list(
        &self,
        prefix: &str,
        continuation: Option<String>,
        page_size: usize,
    ) -> TesseraResult<ListPage>;

    /// Read the current body of `key`.
    async fn get(&self, key: &str) -> TesseraResult<Option<StoredObject>>;

    /// Read one historical version of `key`.
    async fn get_version(&self, key: &str, version_id: &str)
        -> TesseraResult<Option<StoredObject>>;

    /// Write `body` to `key`, returning the new last-modified instant.
    async fn put(&self, key: &str, body: Vec<u8>) -> TesseraResult<Timestamp>;

    /// Delete `key` and any versions. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> TesseraResult<()>;

    /// Retain the current body of `key` as a historical version.
    async fn snapshot(&self, key: &str) -> TesseraResult<()>;

    /// Versions of `key`, newest first, at most `max_results`.
    async fn list_versions(
        &self,
        key: &str,
        max_results: usize,
    ) -> TesseraResult<Vec<VersionSummary>>;
}

/// Drain every page of a listing.
pub async fn list_all<S>(store: &S, prefix: &str, page_size: usize) -> TesseraResult<Vec<ObjectSummary>>
where
    S: ObjectStore + ?Sized,
{
    let mut objects = Vec::new();
    let mut continuation = None;
    loop {
        let page = store.list(prefix, continuation, page_size).await?;
        objects.extend(page.objects);
        match page.continuation {
            Some(token) => continuation = Some(token),
            None => break,
        }
    }
    Ok(objects)
}

/// Build the backend selected by `config`.
pub fn from_config(config: &StoreConfig) -> TesseraResult<Arc<dyn ObjectStore>> {
    config.validate()?;
    let bucket = config.bucket.clone().unwrap_or_default();
    let versioning = match config.backend {
        BackendKind::Memory => Versioning::Unsupported,
        BackendKind::VersionedMemory => Versioning::Automatic,
        BackendKind::SnapshotMemory => Versioning::Snapshot,
    };
    Ok(Arc::new(InMemoryObjectStore::new(bucket, versioning)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_all_drains_pages() {
        let store = InMemoryObjectStore::new("front", Versioning::Unsupported);
        for i in 0..7 {
            store
                .put(&format!("things/{i}/thing.json"), b"{}".to_vec())
                .await
                .unwrap();
        }
        store.put("other/x", b"{}".to_vec()).await.unwrap();

        let first = store.list("things/", None, 3).await.unwrap();
        assert_eq!(first.objects.len(), 3);
        assert!(first.continuation.is_some());

        let all = list_all(&store, "things/", 3).await.unwrap();
        assert_eq!(all.len(), 7);
        assert!(all.iter().all(|o| o.key.starts_with("things/")));
    }

    #[test]
    fn test_from_config_selects_versioning() {
        let config = StoreConfig::for_bucket("front").with_backend(BackendKind::SnapshotMemory);
        let store = from_config(&config).unwrap();
        assert_eq!(store.versioning(), Versioning::Snapshot);
        assert!(store.supports_versioning());
    }

    #[test]
    fn test_from_config_rejects_missing_bucket() {
        assert!(from_config(&StoreConfig::default()).is_err());
    }
}
