//! Tessera Test Utilities
//!
//! Shared test infrastructure for the tessera workspace:
//! - Object store decorators that count calls or inject faults
//! - Proptest generators for records and listings
//! - Fixtures for the `Widget` record type
//! - Assertions over record sets

pub use tessera_core::{
    HealthStatus, Record, RecordType, StoreError, TesseraError, TesseraResult, Timestamp,
};
pub use tessera_storage::{
    BulkReport, CacheSnapshot, EngineConfig, EventuallyConsistentObjectStore, InMemoryObjectStore,
    ObjectStore, RecordCache, Versioning,
};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tessera_storage::{ListPage, StoredObject, VersionSummary};

// ============================================================================
// MOCK STORES
// ============================================================================

/// Per-method call counts of a [`CountingObjectStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list: u64,
    pub get: u64,
    pub get_version: u64,
    pub put: u64,
    pub delete: u64,
    pub snapshot: u64,
    pub list_versions: u64,
}

#[derive(Debug, Default)]
struct Counters {
    list: AtomicU64,
    get: AtomicU64,
    get_version: AtomicU64,
    put: AtomicU64,
    delete: AtomicU64,
    snapshot: AtomicU64,
    list_versions: AtomicU64,
}

/// Store decorator that counts every call, and every `get` per key.
pub struct CountingObjectStore {
    inner: Arc<dyn ObjectStore>,
    counters: Counters,
    gets_by_key: Mutex<HashMap<String, u64>>,
}

impl CountingObjectStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            counters: Counters::default(),
            gets_by_key: Mutex::new(HashMap::new()),
        }
    }

    pub fn calls(&self) -> CallCounts {
        let c = &self.counters;
        CallCounts {
            list: c.list.load(Ordering::SeqCst),
            get: c.get.load(Ordering::SeqCst),
            get_version: c.get_version.load(Ordering::SeqCst),
            put: c.put.load(Ordering::SeqCst),
            delete: c.delete.load(Ordering::SeqCst),
            snapshot: c.snapshot.load(Ordering::SeqCst),
            list_versions: c.list_versions.load(Ordering::SeqCst),
        }
    }

    /// Number of `get` calls made for `key`.
    pub fn gets_of(&self, key: &str) -> u64 {
        self.gets_by_key
            .lock()
            .map(|m| m.get(key).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn reset(&self) {
        let c = &self.counters;
        for counter in [
            &c.list,
            &c.get,
            &c.get_version,
            &c.put,
            &c.delete,
            &c.snapshot,
            &c.list_versions,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
        if let Ok(mut m) = self.gets_by_key.lock() {
            m.clear();
        }
    }
}

#[async_trait]
impl ObjectStore for CountingObjectStore {
    fn name(&self) -> &str {
        self.inner.name()
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
        self.counters.list.fetch_add(1, Ordering::SeqCst);
        self.inner.list(prefix, continuation, page_size).await
    }

    async fn get(&self, key: &str) -> TesseraResult<Option<StoredObject>> {
        self.counters.get.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut m) = self.gets_by_key.lock() {
            *m.entry(key.to_string()).or_default() += 1;
        }
        self.inner.get(key).await
    }

    async fn get_version(
        &self,
        key: &str,
        version_id: &str,
    ) -> TesseraResult<Option<StoredObject>> {
        self.counters.get_version.fetch_add(1, Ordering::SeqCst);
        self.inner.get_version(key, version_id).await
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> TesseraResult<Timestamp> {
        self.counters.put.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, body).await
    }

    async fn delete(&self, key: &str) -> TesseraResult<()> {
        self.counters.delete.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }

    async fn snapshot(&self, key: &str) -> TesseraResult<()> {
        self.counters.snapshot.fetch_add(1, Ordering::SeqCst);
        self.inner.snapshot(key).await
    }

    async fn list_versions(
        &self,
        key: &str,
        max_results: usize,
    ) -> TesseraResult<Vec<VersionSummary>> {
        self.counters.list_versions.fetch_add(1, Ordering::SeqCst);
        self.inner.list_versions(key, max_results).await
    }
}

/// Store decorator that fails or slows down chosen calls.
pub struct FailingObjectStore {
    inner: Arc<dyn ObjectStore>,
    fail_list: AtomicBool,
    fail_marker: AtomicBool,
    fail_get: Mutex<HashSet<String>>,
    fail_put: Mutex<HashSet<String>>,
    get_delay: Mutex<Option<Duration>>,
    list_delay: Mutex<Option<Duration>>,
}

impl FailingObjectStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            fail_list: AtomicBool::new(false),
            fail_marker: AtomicBool::new(false),
            fail_get: Mutex::new(HashSet::new()),
            fail_put: Mutex::new(HashSet::new()),
            get_delay: Mutex::new(None),
            list_delay: Mutex::new(None),
        }
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    /// Fail reads of any key ending in `last-modified.json`.
    pub fn fail_marker_reads(&self, fail: bool) {
        self.fail_marker.store(fail, Ordering::SeqCst);
    }

    pub fn fail_get_of(&self, key: impl Into<String>) {
        if let Ok(mut keys) = self.fail_get.lock() {
            keys.insert(key.into());
        }
    }

    pub fn fail_put_of(&self, key: impl Into<String>) {
        if let Ok(mut keys) = self.fail_put.lock() {
            keys.insert(key.into());
        }
    }

    /// Make every record `get` sleep first. Marker reads are not delayed.
    pub fn delay_gets(&self, delay: Option<Duration>) {
        if let Ok(mut d) = self.get_delay.lock() {
            *d = delay;
        }
    }

    /// Make every listing page sleep first, failing or not.
    pub fn delay_listing(&self, delay: Option<Duration>) {
        if let Ok(mut d) = self.list_delay.lock() {
            *d = delay;
        }
    }

    /// Clear every injected fault and delay.
    pub fn heal(&self) {
        self.fail_listing(false);
        self.fail_marker_reads(false);
        self.delay_gets(None);
        self.delay_listing(None);
        if let Ok(mut keys) = self.fail_get.lock() {
            keys.clear();
        }
        if let Ok(mut keys) = self.fail_put.lock() {
            keys.clear();
        }
    }

    fn failing(set: &Mutex<HashSet<String>>, key: &str) -> bool {
        set.lock().map(|keys| keys.contains(key)).unwrap_or(false)
    }
}

#[async_trait]
impl ObjectStore for FailingObjectStore {
    fn name(&self) -> &str {
        self.inner.name()
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
        let delay = self.list_delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(TesseraError::transient("list", prefix, "injected listing failure"));
        }
        self.inner.list(prefix, continuation, page_size).await
    }

    async fn get(&self, key: &str) -> TesseraResult<Option<StoredObject>> {
        let is_marker = key.ends_with(tessera_core::MARKER_FILENAME);
        if is_marker && self.fail_marker.load(Ordering::SeqCst) {
            return Err(TesseraError::transient("get", key, "injected marker failure"));
        }
        if Self::failing(&self.fail_get, key) {
            return Err(TesseraError::transient("get", key, "injected read failure"));
        }
        let delay = self.get_delay.lock().ok().and_then(|d| *d);
        if let (false, Some(delay)) = (is_marker, delay) {
            tokio::time::sleep(delay).await;
        }
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
        if Self::failing(&self.fail_put, key) {
            return Err(TesseraError::transient("put", key, "injected write failure"));
        }
        self.inner.put(key, body).await
    }

    async fn delete(&self, key: &str) -> TesseraResult<()> {
        self.inner.delete(key).await
    }

    async fn snapshot(&self, key: &str) -> TesseraResult<()> {
        self.inner.snapshot(key).await
    }

    async fn list_versions(
        &self,
        key: &str,
        max_results: usize,
    ) -> TesseraResult<Vec<VersionSummary>> {
        self.inner.list_versions(key, max_results).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::fixtures::Widget;
    use proptest::prelude::*;

    /// Record ids as they appear in real folders: lowercase, dashed.
    pub fn arb_record_id() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,15}"
    }

    pub fn arb_widget() -> impl Strategy<Value = Widget> {
        (arb_record_id(), "[a-zA-Z ]{1,20}", 0u32..1000)
            .prop_map(|(id, name, size)| Widget::new(id, name).with_size(size))
    }

    /// Widgets with distinct ids.
    pub fn arb_widget_set(max: usize) -> impl Strategy<Value = Vec<Widget>> {
        prop::collection::hash_map(arb_record_id(), ("[a-zA-Z ]{1,20}", 0u32..1000), 0..max)
            .prop_map(|widgets| {
                widgets
                    .into_iter()
                    .map(|(id, (name, size))| Widget::new(id, name).with_size(size))
                    .collect()
            })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;
    use serde::{Deserialize, Serialize};

    /// Minimal record used across the engine tests.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Widget {
        pub id: String,
        pub name: String,
        #[serde(default)]
        pub size: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub last_modified: Option<Timestamp>,
    }

    impl Widget {
        pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
            Self {
                id: id.into(),
                name: name.into(),
                size: 0,
                last_modified: None,
            }
        }

        pub fn with_size(mut self, size: u32) -> Self {
            self.size = size;
            self
        }
    }

    impl Record for Widget {
        fn id(&self) -> &str {
            &self.id
        }

        fn last_modified(&self) -> Option<Timestamp> {
            self.last_modified
        }

        fn set_last_modified(&mut self, at: Timestamp) {
            self.last_modified = Some(at);
        }
    }

    pub fn widget_type() -> RecordType {
        RecordType::new("widget", "widgets", "widget-metadata.json")
    }

    /// Key a widget is stored under with no root folder.
    pub fn widget_key(id: &str) -> String {
        format!("widgets/{}/widget-metadata.json", id.to_lowercase())
    }

    pub const WIDGET_MARKER_KEY: &str = "widgets/last-modified.json";

    /// Engine settings sized for tests: small pool, short grace.
    pub fn test_config() -> EngineConfig {
        EngineConfig::default()
            .with_worker_pool(4)
            .with_batch_size(3)
            .with_refresh_interval(Duration::from_millis(25))
            .with_shutdown_grace(Duration::from_millis(50))
    }

    pub fn widget_cache(store: Arc<dyn ObjectStore>) -> RecordCache<Widget> {
        widget_cache_with(store, test_config())
    }

    pub fn widget_cache_with(
        store: Arc<dyn ObjectStore>,
        config: EngineConfig,
    ) -> RecordCache<Widget> {
        RecordCache::new(widget_type(), store, config).expect("valid test config")
    }

    /// A plain in-memory store behind a call counter.
    pub fn counted_memory_store() -> (Arc<InMemoryObjectStore>, Arc<CountingObjectStore>) {
        let memory = Arc::new(InMemoryObjectStore::plain("test-bucket"));
        let counting = Arc::new(CountingObjectStore::new(memory.clone()));
        (memory, counting)
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    use super::*;

    /// Sorted ids of `records`.
    pub fn ids_of<T: Record>(records: &[T]) -> Vec<String> {
        let mut ids: Vec<String> = records.iter().map(|r| r.id().to_lowercase()).collect();
        ids.sort();
        ids
    }

    /// Assert `records` holds exactly `expected` ids, in any order.
    pub fn assert_ids<T: Record>(records: &[T], expected: &[&str]) {
        let mut want: Vec<String> = expected.iter().map(|s| s.to_lowercase()).collect();
        want.sort();
        assert_eq!(ids_of(records), want, "record ids differ");
    }

    pub fn assert_store_error(err: &TesseraError, matches: impl Fn(&StoreError) -> bool) {
        match err {
            TesseraError::Store(e) if matches(e) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::generators::*;
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_counting_store_counts_gets_per_key() {
        let (_, store) = counted_memory_store();
        store.put("a", b"1".to_vec()).await.unwrap();
        store.get("a").await.unwrap();
        store.get("a").await.unwrap();
        store.get("b").await.unwrap();

        assert_eq!(store.gets_of("a"), 2);
        assert_eq!(store.calls().get, 3);
        assert_eq!(store.calls().put, 1);

        store.reset();
        assert_eq!(store.calls(), CallCounts::default());
    }

    #[tokio::test]
    async fn test_failing_store_injects_and_heals() {
        let store = FailingObjectStore::new(Arc::new(InMemoryObjectStore::plain("b")));
        store.put("k", b"1".to_vec()).await.unwrap();

        store.fail_get_of("k");
        store.fail_listing(true);
        assert!(store.get("k").await.unwrap_err().is_transient());
        assert!(store.list("", None, 10).await.is_err());

        store.heal();
        assert!(store.get("k").await.unwrap().is_some());
    }

    #[test]
    fn test_widget_json_shape() {
        let json = serde_json::to_value(Widget::new("w1", "foo")).unwrap();
        assert_eq!(json["id"], "w1");
        assert!(json.get("lastModified").is_none());
    }

    proptest! {
        #[test]
        fn prop_widget_sets_have_unique_ids(widgets in arb_widget_set(20)) {
            let ids: HashSet<_> = widgets.iter().map(|w| w.id.clone()).collect();
            prop_assert_eq!(ids.len(), widgets.len());
        }
    }
}
