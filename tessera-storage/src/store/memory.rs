//! In-memory object store.
//!
//! Keys are kept in a `BTreeMap` so listing pages come out in key order
//! and the continuation token can simply be the last key returned.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use tessera_core::{StoreError, TesseraError, TesseraResult, Timestamp};
use uuid::Uuid;

use super::{ListPage, ObjectStore, ObjectSummary, StoredObject, VersionSummary, Versioning};

#[derive(Debug, Clone)]
struct Version {
    version_id: String,
    body: Vec<u8>,
    last_modified: Timestamp,
}

#[derive(Debug, Default)]
struct Entry {
    current: Option<Version>,
    /// Older versions, oldest first.
    history: Vec<Version>,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<String, Entry>,
    last_stamp: Option<Timestamp>,
}

impl State {
    /// Wall clock, nudged forward so two writes never share an instant.
    fn next_stamp(&mut self) -> Timestamp {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + chrono::Duration::nanoseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

/// Object store backed by process memory.
#[derive(Debug)]
pub struct InMemoryObjectStore {
    bucket: String,
    versioning: Versioning,
    state: RwLock<State>,
}

impl InMemoryObjectStore {
    pub fn new(bucket: impl Into<String>, versioning: Versioning) -> Self {
        Self {
            bucket: bucket.into(),
            versioning,
            state: RwLock::new(State::default()),
        }
    }

    /// Unversioned store.
    pub fn plain(bucket: impl Into<String>) -> Self {
        Self::new(bucket, Versioning::Unsupported)
    }

    /// Store that keeps every overwritten body.
    pub fn versioned(bucket: impl Into<String>) -> Self {
        Self::new(bucket, Versioning::Automatic)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Number of keys with a current body.
    pub fn len(&self) -> usize {
        self.state
            .read()
            .map(|s| s.objects.values().filter(|e| e.current.is_some()).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_state(&self) -> TesseraResult<std::sync::RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| TesseraError::Store(StoreError::LockPoisoned))
    }

    fn write_state(&self) -> TesseraResult<std::sync::RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| TesseraError::Store(StoreError::LockPoisoned))
    }

    fn unsupported(&self) -> TesseraError {
        TesseraError::Store(StoreError::VersioningUnsupported {
            backend: self.name().to_string(),
        })
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn name(&self) -> &str {
        match self.versioning {
            Versioning::Unsupported => "memory",
            Versioning::Automatic => "versioned-memory",
            Versioning::Snapshot => "snapshot-memory",
        }
    }

    async fn ensure_bucket_exists(&self) -> TesseraResult<()> {
        Ok(())
    }

    fn versioning(&self) -> Versioning {
        self.versioning
    }

    async fn list(
        &self,
        prefix: &str,
        continuation: Option<String>,
        page_size: usize,
    ) -> TesseraResult<ListPage> {
        let state = self.read_state()?;
        let lower = match continuation {
            Some(ref after) => Bound::Excluded(after.clone()),
            None => Bound::Included(prefix.to_string()),
        };

        let mut matching = state
            .objects
            .range((lower, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter_map(|(key, entry)| {
                entry.current.as_ref().map(|v| ObjectSummary {
                    key: key.clone(),
                    last_modified: v.last_modified,
                })
            });

        let objects: Vec<ObjectSummary> = matching.by_ref().take(page_size.max(1)).collect();
        let continuation = match matching.next() {
            Some(_) => objects.last().map(|o| o.key.clone()),
            None => None,
        };

        Ok(ListPage {
            objects,
            continuation,
        })
    }

    async fn get(&self, key: &str) -> TesseraResult<Option<StoredObject>> {
        let state = self.read_state()?;
        Ok(state
            .objects
            .get(key)
            .and_then(|e| e.current.as_ref())
            .map(|v| StoredObject {
                body: v.body.clone(),
                last_modified: v.last_modified,
            }))
    }

    async fn get_version(
        &self,
        key: &str,
        version_id: &str,
    ) -> TesseraResult<Option<StoredObject>> {
        if !self.versioning.is_supported() {
            return Err(self.unsupported());
        }
        let state = self.read_state()?;
        Ok(state.objects.get(key).and_then(|entry| {
            entry
                .current
                .iter()
                .chain(entry.history.iter())
                .find(|v| v.version_id == version_id)
                .map(|v| StoredObject {
                    body: v.body.clone(),
                    last_modified: v.last_modified,
                })
        }))
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> TesseraResult<Timestamp> {
        let mut state = self.write_state()?;
        let last_modified = state.next_stamp();
        let version = Version {
            version_id: Uuid::now_v7().to_string(),
            body,
            last_modified,
        };

        let retain = self.versioning == Versioning::Automatic;
        let entry = state.objects.entry(key.to_string()).or_default();
        if let Some(previous) = entry.current.replace(version) {
            if retain {
                entry.history.push(previous);
            }
        }
        Ok(last_modified)
    }

    async fn delete(&self, key: &str) -> TesseraResult<()> {
        let mut state = self.write_state()?;
        state.objects.remove(key);
        Ok(())
    }

    async fn snapshot(&self, key: &str) -> TesseraResult<()> {
        if !self.versioning.is_supported() {
            return Err(self.unsupported());
        }
        let mut state = self.write_state()?;
        if let Some(entry) = state.objects.get_mut(key) {
            if let Some(current) = entry.current.clone() {
                entry.history.push(Version {
                    version_id: Uuid::now_v7().to_string(),
                    ..current
                });
            }
        }
        Ok(())
    }

    async fn list_versions(
        &self,
        key: &str,
        max_results: usize,
    ) -> TesseraResult<Vec<VersionSummary>> {
        if !self.versioning.is_supported() {
            return Err(self.unsupported());
        }
        let state = self.read_state()?;
        let Some(entry) = state.objects.get(key) else {
            return Ok(Vec::new());
        };

        // Snapshot mode copies the current body, so skip history entries
        // that merely duplicate it.
        let current = entry.current.iter();
        let history = entry.history.iter().rev().filter(|v| {
            self.versioning != Versioning::Snapshot
                || entry
                    .current
                    .as_ref()
                    .map(|c| c.last_modified != v.last_modified)
                    .unwrap_or(true)
        });

        Ok(current
            .chain(history)
            .take(max_results)
            .map(|v| VersionSummary {
                version_id: v.version_id.clone(),
                last_modified: v.last_modified,
            })
            .collect())
    }
}
