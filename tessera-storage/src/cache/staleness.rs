//! Staleness marker for cache invalidation.
//!
//! Each record type has a small marker blob recording when the type was
//! last mutated. Readers compare it to the start of their last refresh;
//! a newer marker means the snapshot might be stale. Checking the marker
//! is one cheap read, where a full refresh lists every key.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tessera_core::{StoreError, TesseraError, TesseraResult, Timestamp};

use crate::layout::KeyLayout;
use crate::store::ObjectStore;

/// Body of the marker blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StalenessMarker {
    pub record_type: String,
    pub last_modified: Timestamp,
}

impl StalenessMarker {
    pub fn new(record_type: impl Into<String>, last_modified: Timestamp) -> Self {
        Self {
            record_type: record_type.into(),
            last_modified,
        }
    }
}

/// Answers "has this type changed since I last looked?".
///
/// Writers call [`StalenessOracle::mark_changed`] after every mutation
/// has been written; readers call [`StalenessOracle::last_changed`].
#[async_trait]
pub trait StalenessOracle: Send + Sync {
    /// When the type was last marked changed. `None` if never marked.
    async fn last_changed(&self) -> TesseraResult<Option<Timestamp>>;

    /// Record a mutation, returning the new marker value.
    async fn mark_changed(&self) -> TesseraResult<Timestamp>;

    /// Whether a snapshot built at `refreshed_at` might be stale.
    ///
    /// Treats "never refreshed" and "never marked" as stale.
    async fn is_stale_since(&self, refreshed_at: Option<Timestamp>) -> TesseraResult<bool> {
        let Some(refreshed_at) = refreshed_at else {
            return Ok(true);
        };
        Ok(match self.last_changed().await? {
            Some(changed) => changed > refreshed_at,
            None => true,
        })
    }
}

/// Marker stored next to the records in the object store.
pub struct RemoteStalenessOracle {
    store: Arc<dyn ObjectStore>,
    record_type: String,
    key: String,
}

impl RemoteStalenessOracle {
    pub fn new(store: Arc<dyn ObjectStore>, layout: &KeyLayout) -> Self {
        Self {
            store,
            record_type: layout.record_type().name.clone(),
            key: layout.marker_key(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Debug for RemoteStalenessOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStalenessOracle")
            .field("store", &self.store.name())
            .field("key", &self.key)
            .finish()
    }
}

#[async_trait]
impl StalenessOracle for RemoteStalenessOracle {
    async fn last_changed(&self) -> TesseraResult<Option<Timestamp>> {
        let Some(object) = self.store.get(&self.key).await? else {
            return Ok(None);
        };
        match serde_json::from_slice::<StalenessMarker>(&object.body) {
            // A marker that only became visible after it was stamped
            // still counts from the moment the store exposed it.
            Ok(marker) => Ok(Some(marker.last_modified.max(object.last_modified))),
            Err(e) => {
                // Unreadable body: the blob's own write time is still a
                // valid upper bound on the last mutation.
                tracing::debug!(
                    key = %self.key,
                    error = %e,
                    "Staleness marker body unreadable, using object timestamp"
                );
                Ok(Some(object.last_modified))
            }
        }
    }

    async fn mark_changed(&self) -> TesseraResult<Timestamp> {
        let marker = StalenessMarker::new(self.record_type.clone(), Utc::now());
        let body = serde_json::to_vec(&marker).map_err(|e| {
            TesseraError::Store(StoreError::SerializationFailed {
                reason: e.to_string(),
            })
        })?;
        let stored_at = self.store.put(&self.key, body).await?;
        let changed_at = marker.last_modified.max(stored_at);
        tracing::trace!(
            record_type = %self.record_type,
            last_modified = %changed_at,
            "Marked record type changed"
        );
        Ok(changed_at)
    }
}
