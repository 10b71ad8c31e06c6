//! Snapshot cache for record types stored in an object store.
//!
//! Each record type gets one [`RecordCache`]. Reads are served from an
//! immutable [`CacheSnapshot`] that is refreshed incrementally: the
//! engine lists the type's folder, fetches only ids whose remote
//! timestamp moved, and swaps in the new snapshot atomically.
//!
//! # Staleness
//!
//! Writers touch a per-type marker after every mutation. [`RecordCache::all`]
//! checks the marker first and skips the listing entirely when nothing
//! changed since the last refresh, so steady-state reads cost one small
//! remote read.
//!
//! # Example
//!
//! ```ignore
//! let store = tessera_storage::store::from_config(&store_config)?;
//! let cache: RecordCache<Pipeline> =
//!     RecordCache::new(RecordType::pipelines(), store, EngineConfig::default())?;
//!
//! cache.upsert("deploy-prod", pipeline).await?;
//! let everything = cache.all().await?;
//!
//! let task = spawn_refresh_task(cache.clone());
//! // ...
//! cache.shutdown();
//! task.await?;
//! ```

pub mod engine;
pub mod health;
pub mod history;
pub mod metrics;
pub mod pool;
pub mod refresh;
pub mod scheduler;
pub mod snapshot;
pub mod staleness;
pub mod writer;

pub use engine::{EngineConfig, RecordCache};
pub use health::HealthTracker;
pub use metrics::{RefreshMetrics, RefreshMetricsSnapshot};
pub use pool::WorkerPool;
pub use scheduler::{refresh_task, spawn_refresh_task};
pub use snapshot::{AssemblyStats, CacheEntry, CacheSnapshot, FetchOutcome, SnapshotDiff};
pub use staleness::{RemoteStalenessOracle, StalenessMarker, StalenessOracle};
pub use writer::BulkReport;
