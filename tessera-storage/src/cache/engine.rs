//! Record cache engine.
//!
//! One [`RecordCache`] serves one record type. It owns the current
//! snapshot, refreshes it from the object store when the staleness
//! marker says so, and routes writes back to the store.
//!
//! The snapshot is published as an `Arc` behind a short-lived lock:
//! readers clone the `Arc` and never see a half-built snapshot.

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tessera_core::{
    ConfigError, HealthCheck, Record, RecordType, RecordTypeSettings, StoreConfig, StoreError,
    TesseraError, TesseraResult, Timestamp, DEFAULT_BATCH_SIZE, DEFAULT_LIST_PAGE_SIZE,
};
use tokio::sync::{watch, Mutex};

use super::health::HealthTracker;
use super::metrics::{RefreshMetrics, RefreshMetricsSnapshot};
use super::pool::WorkerPool;
use super::snapshot::CacheSnapshot;
use super::staleness::{RemoteStalenessOracle, StalenessOracle};
use crate::codec::{JsonCodec, RecordCodec};
use crate::layout::KeyLayout;
use crate::store::ObjectStore;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for one record type's cache engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Concurrent remote calls for fetches and bulk writes (default: 20)
    pub worker_pool: usize,
    /// Items per spawned batch (default: 10)
    pub batch_size: usize,
    /// Background refresh period (default: 60 seconds)
    pub refresh_interval: Duration,
    /// Health grace window; `None` uses the backend's interval
    pub health_interval: Option<Duration>,
    /// Force a full refresh once the snapshot is this old (default: 5 minutes)
    pub max_refresh_age: Duration,
    /// How long in-flight work may run after shutdown (default: 5 seconds)
    pub shutdown_grace: Duration,
    /// Keys per listing page (default: 1000)
    pub list_page_size: usize,
    /// Prefix for this type's folder
    pub root_folder: Option<String>,
    /// Reject mutations
    pub read_only: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_pool: 20,
            batch_size: DEFAULT_BATCH_SIZE,
            refresh_interval: Duration::from_secs(60),
            health_interval: None,
            max_refresh_age: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(5),
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
            root_folder: None,
            read_only: false,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Combine per-type settings with store-wide settings.
    pub fn from_settings(settings: &RecordTypeSettings, store: &StoreConfig) -> Self {
        Self {
            worker_pool: settings.worker_pool,
            batch_size: settings.batch_size,
            refresh_interval: settings.refresh_interval,
            list_page_size: store.list_page_size,
            root_folder: store.root_folder.clone(),
            read_only: store.read_only,
            ..Self::default()
        }
    }

    pub fn with_worker_pool(mut self, size: usize) -> Self {
        self.worker_pool = size;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = Some(interval);
        self
    }

    pub fn with_max_refresh_age(mut self, age: Duration) -> Self {
        self.max_refresh_age = age;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_list_page_size(mut self, size: usize) -> Self {
        self.list_page_size = size;
        self
    }

    pub fn with_root_folder(mut self, root: impl Into<String>) -> Self {
        self.root_folder = Some(root.into());
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn validate(&self) -> TesseraResult<()> {
        let positive = [
            ("worker_pool", self.worker_pool),
            ("batch_size", self.batch_size),
            ("list_page_size", self.list_page_size),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(TesseraError::Config(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                    reason: format!("{field} must be at least 1"),
                }));
            }
        }
        if self.refresh_interval.is_zero() {
            return Err(TesseraError::Config(ConfigError::InvalidValue {
                field: "refresh_interval".to_string(),
                value: format!("{:?}", self.refresh_interval),
                reason: "refresh_interval must be positive".to_string(),
            }));
        }
        Ok(())
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub(super) struct EngineInner<T: Record> {
    pub(super) layout: KeyLayout,
    pub(super) store: Arc<dyn ObjectStore>,
    pub(super) codec: Arc<dyn RecordCodec<T>>,
    pub(super) oracle: Arc<dyn StalenessOracle>,
    pub(super) config: EngineConfig,
    pub(super) pool: WorkerPool,
    pub(super) health: HealthTracker,
    pub(super) metrics: RefreshMetrics,
    /// Held for a whole refresh; holds the last attempt's error, if any.
    pub(super) refresh_lock: Mutex<Option<TesseraError>>,
    /// Finished refresh attempts, successful or not.
    pub(super) refresh_attempts: AtomicU64,
    pub(super) shutdown_tx: watch::Sender<bool>,
    current: RwLock<Arc<CacheSnapshot<T>>>,
}

/// Snapshot cache for one record type.
///
/// Cloning is cheap and every clone shares the same snapshot, refresh
/// lock and shutdown signal.
pub struct RecordCache<T: Record> {
    pub(super) inner: Arc<EngineInner<T>>,
}

impl<T: Record> Clone for RecordCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Record> std::fmt::Debug for RecordCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCache")
            .field("record_type", &self.inner.layout.record_type().name)
            .field("store", &self.inner.store.name())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl<T: Record> RecordCache<T> {
    /// Engine with the JSON codec and the remote staleness marker.
    pub fn new(
        record_type: RecordType,
        store: Arc<dyn ObjectStore>,
        config: EngineConfig,
    ) -> TesseraResult<Self> {
        let layout = KeyLayout::new(record_type, config.root_folder.as_deref());
        let oracle = Arc::new(RemoteStalenessOracle::new(Arc::clone(&store), &layout));
        Self::with_parts(layout, store, Arc::new(JsonCodec::new()), oracle, config)
    }

    pub fn with_parts(
        layout: KeyLayout,
        store: Arc<dyn ObjectStore>,
        codec: Arc<dyn RecordCodec<T>>,
        oracle: Arc<dyn StalenessOracle>,
        config: EngineConfig,
    ) -> TesseraResult<Self> {
        config.validate()?;
        let health_interval = config
            .health_interval
            .unwrap_or_else(|| store.health_interval());
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(EngineInner {
                pool: WorkerPool::new(config.worker_pool, config.batch_size),
                health: HealthTracker::new(layout.record_type().name.clone(), health_interval),
                metrics: RefreshMetrics::new(),
                refresh_lock: Mutex::new(None),
                refresh_attempts: AtomicU64::new(0),
                current: RwLock::new(Arc::new(CacheSnapshot::empty())),
                layout,
                store,
                codec,
                oracle,
                config,
                shutdown_tx,
            }),
        })
    }

    pub fn record_type(&self) -> &RecordType {
        self.inner.layout.record_type()
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.inner.layout
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.inner.store
    }

    pub fn metrics(&self) -> RefreshMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> TesseraResult<Arc<CacheSnapshot<T>>> {
        self.inner
            .current
            .read()
            .map(|current| Arc::clone(&*current))
            .map_err(|_| TesseraError::Store(StoreError::LockPoisoned))
    }

    pub(super) fn publish(&self, next: Arc<CacheSnapshot<T>>) -> TesseraResult<()> {
        let mut current = self
            .inner
            .current
            .write()
            .map_err(|_| TesseraError::Store(StoreError::LockPoisoned))?;
        *current = next;
        Ok(())
    }

    /// Every record of this type.
    ///
    /// Refreshes first when the marker says the snapshot is stale. If that
    /// refresh fails and an earlier snapshot exists, the earlier snapshot
    /// is served.
    pub async fn all(&self) -> TesseraResult<Vec<T>> {
        let snapshot = self.snapshot()?;
        if !self.should_refresh_for(&snapshot).await {
            return Ok(snapshot.records());
        }

        match self.refresh().await {
            Ok(fresh) => Ok(fresh.records()),
            Err(e) if snapshot.is_populated() => {
                tracing::warn!(
                    record_type = %self.record_type(),
                    error = %e,
                    "Refresh failed, serving previous snapshot"
                );
                Ok(snapshot.records())
            }
            Err(e) => Err(e),
        }
    }

    /// Read one record straight from the store, bypassing the snapshot.
    pub async fn find_by_id(&self, id: &str) -> TesseraResult<T> {
        let key = self.inner.layout.record_key(id);
        let Some(object) = self.inner.store.get(&key).await? else {
            return Err(TesseraError::not_found(&self.record_type().name, id));
        };
        let mut record = self.inner.codec.decode(&key, &object.body)?;
        record.set_last_modified(object.last_modified);
        Ok(record)
    }

    pub fn supports_versioning(&self) -> bool {
        self.inner.store.supports_versioning()
    }

    /// Whether the current snapshot might be stale.
    pub async fn should_refresh(&self) -> bool {
        match self.snapshot() {
            Ok(snapshot) => self.should_refresh_for(&snapshot).await,
            Err(_) => true,
        }
    }

    pub(super) async fn should_refresh_for(&self, snapshot: &CacheSnapshot<T>) -> bool {
        match self
            .inner
            .oracle
            .is_stale_since(snapshot.refreshed_at())
            .await
        {
            Ok(stale) => stale,
            Err(e) => {
                tracing::warn!(
                    record_type = %self.record_type(),
                    error = %e,
                    "Staleness check failed, treating cache as stale"
                );
                true
            }
        }
    }

    /// Start time of the refresh behind the current snapshot.
    pub fn last_refreshed_at(&self) -> Option<Timestamp> {
        self.snapshot().ok().and_then(|s| s.refreshed_at())
    }

    pub fn is_healthy(&self) -> bool {
        self.health().status.is_healthy()
    }

    pub fn health(&self) -> HealthCheck {
        let snapshot = self.snapshot().ok();
        let populated = snapshot.as_ref().is_some_and(|s| s.is_populated());
        let check = self
            .inner
            .health
            .check(populated, snapshot.as_ref().and_then(|s| s.refreshed_at()));
        match snapshot {
            Some(s) => check.with_metadata("records", serde_json::Value::from(s.len())),
            None => check,
        }
    }

    /// Run one refresh before serving, for types that warm at startup.
    pub async fn warm(&self) -> TesseraResult<usize> {
        let snapshot = self.refresh().await?;
        tracing::info!(
            record_type = %self.record_type(),
            records = snapshot.len(),
            "Cache warmed"
        );
        Ok(snapshot.len())
    }

    /// Refresh if the marker moved or the snapshot is older than
    /// `max_refresh_age`. Returns whether a refresh ran.
    ///
    /// A check that finds nothing to do still counts as a healthy cycle.
    pub async fn refresh_if_stale(&self) -> TesseraResult<bool> {
        let snapshot = self.snapshot()?;
        let checked_at = Utc::now();
        let max_age = chrono::Duration::from_std(self.inner.config.max_refresh_age)
            .unwrap_or(chrono::Duration::MAX);
        let aged = snapshot
            .refreshed_at()
            .map_or(true, |at| checked_at - at > max_age);

        if !aged && !self.should_refresh_for(&snapshot).await {
            RefreshMetrics::incr(&self.inner.metrics.skipped_cycles, 1);
            self.inner.health.record_success(checked_at);
            tracing::trace!(record_type = %self.record_type(), "Cache current, refresh skipped");
            return Ok(false);
        }

        self.refresh().await.map(|_| true)
    }

    /// Signal shutdown. In-flight refreshes and bulk writes get
    /// `shutdown_grace` to finish before they are abandoned.
    pub fn shutdown(&self) {
        self.inner.shutdown_tx.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown_tx.borrow()
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.inner.shutdown_tx.subscribe()
    }

    pub(super) fn abandoned(&self, operation: &str) -> TesseraError {
        TesseraError::Store(StoreError::Abandoned {
            record_type: self.record_type().name.clone(),
            operation: operation.to_string(),
        })
    }

    /// Resolves `shutdown_grace` after shutdown is signalled.
    pub(super) async fn shutdown_deadline(&self) {
        let mut rx = self.subscribe_shutdown();
        loop {
            let stopping = *rx.borrow_and_update();
            if stopping {
                break;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
        tokio::time::sleep(self.inner.config.shutdown_grace).await;
    }
}
