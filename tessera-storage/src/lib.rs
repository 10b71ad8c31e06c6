//! Tessera Storage - Object Store Interface and Record Cache
//!
//! Defines the [`store::ObjectStore`] abstraction over blob storage, the
//! in-memory backends, and the per-record-type snapshot cache built on
//! top of them.

pub mod cache;
pub mod codec;
pub mod layout;
pub mod store;

pub use cache::{
    spawn_refresh_task, BulkReport, CacheEntry, CacheSnapshot, EngineConfig, RecordCache,
    RefreshMetricsSnapshot, StalenessOracle,
};
pub use codec::{JsonCodec, RecordCodec};
pub use layout::KeyLayout;
pub use store::{
    from_config, list_all, EventuallyConsistentObjectStore, InMemoryObjectStore, ListPage,
    ObjectStore, ObjectSummary, StoredObject, VersionSummary, Versioning,
};
