//! Version history reads.

use std::sync::Arc;

use tessera_core::{Record, TesseraError, TesseraResult};

use super::engine::RecordCache;

impl<T: Record> RecordCache<T> {
    /// Up to `max_results` versions of `id`, newest first, each stamped
    /// with its own remote timestamp.
    ///
    /// Without versioning support, or when only one result is asked for,
    /// this is the current value alone. Versions that no longer exist or
    /// cannot be decoded are skipped.
    pub async fn history(&self, id: &str, max_results: usize) -> TesseraResult<Vec<T>> {
        if max_results == 0 {
            return Ok(Vec::new());
        }
        if max_results == 1 || !self.supports_versioning() {
            return Ok(vec![self.find_by_id(id).await?]);
        }

        let key = self.inner.layout.record_key(id);
        let versions = self.inner.store.list_versions(&key, max_results).await?;
        if versions.is_empty() {
            return Err(TesseraError::not_found(&self.record_type().name, id));
        }

        let store = Arc::clone(&self.inner.store);
        let version_key = key.clone();
        let mut fetched = self
            .inner
            .pool
            .run(
                versions.into_iter().enumerate().collect::<Vec<_>>(),
                move |(position, version)| {
                    let store = Arc::clone(&store);
                    let key = version_key.clone();
                    async move {
                        let object = store.get_version(&key, &version.version_id).await;
                        (position, version, object)
                    }
                },
            )
            .await;
        fetched.sort_by_key(|(position, _, _)| *position);

        let mut history = Vec::with_capacity(fetched.len());
        for (_, version, object) in fetched {
            let Some(object) = object? else {
                tracing::debug!(
                    key = %key,
                    version_id = %version.version_id,
                    "Version disappeared before it was read"
                );
                continue;
            };
            match self.inner.codec.decode(&key, &object.body) {
                Ok(mut record) => {
                    record.set_last_modified(version.last_modified);
                    history.push(record);
                }
                Err(e) => tracing::warn!(
                    key = %key,
                    version_id = %version.version_id,
                    error = %e,
                    "Skipping undecodable version"
                ),
            }
        }
        Ok(history)
    }
}
