//! Engine Runtime
//!
//! Boots one [`RecordCache`] per configured record type over a shared
//! object store, warms the ones configured for it, spawns their refresh
//! tasks and tears everything down within a bounded time.

use std::sync::Arc;
use std::time::Duration;

use tessera_core::{HealthCheck, RecordType, RecordTypeSettings};
use tessera_storage::{
    spawn_refresh_task, EngineConfig, ObjectStore, RecordCache, RefreshMetricsSnapshot,
};
use tokio::task::JoinHandle;

use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::record::DocumentRecord;

pub type DocumentCache = RecordCache<DocumentRecord>;

struct RunningEngine {
    cache: DocumentCache,
    task: JoinHandle<RefreshMetricsSnapshot>,
}

pub struct CacheRuntime {
    engines: Vec<RunningEngine>,
    shutdown_timeout: Duration,
}

impl CacheRuntime {
    /// Start engines with per-type settings from the environment.
    pub async fn start(config: &ServiceConfig, store: Arc<dyn ObjectStore>) -> ServiceResult<Self> {
        Self::start_with(config, store, RecordTypeSettings::from_env).await
    }

    /// Start engines with per-type settings from `settings_for`.
    ///
    /// A warm-up failure is logged and left to the refresh task; any
    /// configuration error aborts startup.
    pub async fn start_with<F>(
        config: &ServiceConfig,
        store: Arc<dyn ObjectStore>,
        settings_for: F,
    ) -> ServiceResult<Self>
    where
        F: Fn(&RecordType) -> RecordTypeSettings,
    {
        config.validate()?;
        store.ensure_bucket_exists().await?;

        let mut caches = Vec::with_capacity(config.record_types.len());
        for record_type in &config.record_types {
            let settings = settings_for(record_type);
            settings.validate()?;

            let engine_config = EngineConfig::from_settings(&settings, &config.store)
                .with_shutdown_grace(config.shutdown_grace);
            let cache = RecordCache::new(record_type.clone(), Arc::clone(&store), engine_config)?;

            if settings.warm_cache {
                if let Err(e) = cache.warm().await {
                    tracing::warn!(
                        record_type = %record_type,
                        error = %e,
                        "Cache warm-up failed, background refresh will retry"
                    );
                }
            }
            caches.push(cache);
        }

        // No task is spawned until every engine is built.
        let engines = caches
            .into_iter()
            .map(|cache| RunningEngine {
                task: spawn_refresh_task(cache.clone()),
                cache,
            })
            .collect::<Vec<_>>();

        tracing::info!(
            backend = %store.name(),
            record_types = engines.len(),
            "Cache runtime started"
        );

        Ok(Self {
            engines,
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    pub fn caches(&self) -> impl Iterator<Item = &DocumentCache> {
        self.engines.iter().map(|e| &e.cache)
    }

    pub fn cache(&self, name: &str) -> Option<&DocumentCache> {
        self.caches().find(|c| c.record_type().name == name)
    }

    pub fn health(&self) -> Vec<HealthCheck> {
        self.caches().map(DocumentCache::health).collect()
    }

    /// Signal every engine, then wait up to `shutdown_timeout` for all
    /// refresh tasks. Tasks still running at the deadline are aborted.
    ///
    /// Every task is drained even if one of them failed; the first join
    /// error is returned after that.
    pub async fn shutdown(self) -> ServiceResult<Vec<(String, RefreshMetricsSnapshot)>> {
        for engine in &self.engines {
            engine.cache.shutdown();
        }

        let deadline = tokio::time::Instant::now() + self.shutdown_timeout;
        let tasks = self
            .engines
            .into_iter()
            .map(|e| (e.cache.record_type().name.clone(), e.task))
            .collect();
        let (finished, mut failures) = drain_tasks(tasks, deadline).await;

        tracing::info!(
            stopped = finished.len(),
            failed = failures.len(),
            "Cache runtime stopped"
        );
        if failures.is_empty() {
            Ok(finished)
        } else {
            Err(failures.remove(0))
        }
    }
}

type Stopped = Vec<(String, RefreshMetricsSnapshot)>;

async fn drain_tasks(
    tasks: Vec<(String, JoinHandle<RefreshMetricsSnapshot>)>,
    deadline: tokio::time::Instant,
) -> (Stopped, Vec<ServiceError>) {
    let mut finished = Vec::with_capacity(tasks.len());
    let mut failures = Vec::new();
    for (record_type, mut task) in tasks {
        match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(Ok(metrics)) => finished.push((record_type, metrics)),
            Ok(Err(e)) => {
                tracing::error!(
                    record_type = %record_type,
                    error = %e,
                    "Refresh task failed"
                );
                failures.push(ServiceError::TaskJoin {
                    record_type,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                tracing::warn!(
                    record_type = %record_type,
                    "Refresh task did not stop in time, aborting"
                );
                task.abort();
            }
        }
    }
    (finished, failures)
}
