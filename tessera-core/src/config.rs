//! Configuration types

use crate::{ConfigError, RecordType, TesseraError, TesseraResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Default number of keys requested per listing page.
pub const DEFAULT_LIST_PAGE_SIZE: usize = 1000;

/// Default number of records per fetch/write batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Which object store implementation to build at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// In-memory store, no history
    Memory,
    /// In-memory store that retains every overwritten version itself
    VersionedMemory,
    /// In-memory store that only keeps versions the writer snapshots explicitly
    SnapshotMemory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::VersionedMemory => "versioned-memory",
            Self::SnapshotMemory => "snapshot-memory",
        }
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "versioned-memory" => Ok(Self::VersionedMemory),
            "snapshot-memory" => Ok(Self::SnapshotMemory),
            other => Err(ConfigError::UnknownBackend {
                backend: other.to_string(),
            }),
        }
    }
}

/// Object store connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: BackendKind,
    /// Bucket (container) holding every record type. Required.
    pub bucket: Option<String>,
    /// Optional prefix prepended to every record type folder.
    pub root_folder: Option<String>,
    /// Reject every mutation when set.
    pub read_only: bool,
    /// Keys requested per listing page.
    pub list_page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            bucket: None,
            root_folder: None,
            read_only: false,
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
        }
    }
}

impl StoreConfig {
    /// Create StoreConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `TESSERA_STORE_BACKEND`: `memory`, `versioned-memory` or `snapshot-memory` (default: memory)
    /// - `TESSERA_STORE_BUCKET`: bucket name (required)
    /// - `TESSERA_STORE_ROOT_FOLDER`: key prefix for all record types
    /// - `TESSERA_STORE_READ_ONLY`: reject mutations (default: false)
    /// - `TESSERA_STORE_LIST_PAGE_SIZE`: keys per listing page (default: 1000)
    pub fn from_env() -> TesseraResult<Self> {
        let backend = match std::env::var("TESSERA_STORE_BACKEND") {
            Ok(value) => value.parse::<BackendKind>()?,
            Err(_) => BackendKind::Memory,
        };

        let bucket = std::env::var("TESSERA_STORE_BUCKET")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let root_folder = std::env::var("TESSERA_STORE_ROOT_FOLDER")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let read_only = std::env::var("TESSERA_STORE_READ_ONLY")
            .ok()
            .map(|s| s == "true" || s == "1")
            .unwrap_or(false);

        let list_page_size = std::env::var("TESSERA_STORE_LIST_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_LIST_PAGE_SIZE);

        Ok(Self {
            backend,
            bucket,
            root_folder,
            read_only,
            list_page_size,
        })
    }

    /// Create a config for the given bucket with default settings.
    pub fn for_bucket(bucket: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
            ..Self::default()
        }
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_root_folder(mut self, root_folder: impl Into<String>) -> Self {
        self.root_folder = Some(root_folder.into());
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Validate the configuration.
    ///
    /// A missing bucket is fatal: there is nothing to recover at runtime.
    pub fn validate(&self) -> TesseraResult<()> {
        match self.bucket.as_deref() {
            None => {
                return Err(TesseraError::Config(ConfigError::MissingRequired {
                    field: "bucket".to_string(),
                }));
            }
            Some(bucket) if bucket.contains('/') => {
                return Err(TesseraError::Config(ConfigError::InvalidValue {
                    field: "bucket".to_string(),
                    value: bucket.to_string(),
                    reason: "bucket must not contain '/'".to_string(),
                }));
            }
            Some(_) => {}
        }

        if self.list_page_size == 0 {
            return Err(TesseraError::Config(ConfigError::InvalidValue {
                field: "list_page_size".to_string(),
                value: self.list_page_size.to_string(),
                reason: "list_page_size must be greater than 0".to_string(),
            }));
        }

        Ok(())
    }
}

/// Per record type cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTypeSettings {
    /// Concurrent remote calls allowed for this type's fetches and writes.
    pub worker_pool: usize,
    /// Period of the background refresh task.
    pub refresh_interval: Duration,
    /// Run one refresh at startup before serving.
    pub warm_cache: bool,
    /// Records per fetch/write batch.
    pub batch_size: usize,
}

impl RecordTypeSettings {
    pub fn new(worker_pool: usize, refresh_interval: Duration) -> Self {
        Self {
            worker_pool,
            refresh_interval,
            warm_cache: true,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_warm_cache(mut self, warm_cache: bool) -> Self {
        self.warm_cache = warm_cache;
        self
    }

    /// Defaults for a well-known record type.
    ///
    /// High-churn types get a larger pool; snapshots, plugin info and
    /// entity tags are small or rarely listed.
    pub fn defaults_for(record_type: &RecordType) -> Self {
        match record_type.name.as_str() {
            "snapshot" | "plugin_info" => Self::new(2, Duration::from_secs(60)),
            "entity_tags" => Self::new(2, Duration::from_secs(300)).with_warm_cache(false),
            _ => Self::new(20, Duration::from_secs(60)),
        }
    }

    /// Defaults for `record_type`, overridden by environment variables.
    ///
    /// # Environment Variables
    /// - `TESSERA_<TYPE>_WORKER_POOL`
    /// - `TESSERA_<TYPE>_REFRESH_MS`
    /// - `TESSERA_<TYPE>_WARM_CACHE`
    ///
    /// where `<TYPE>` is the upper-cased record type name.
    pub fn from_env(record_type: &RecordType) -> Self {
        let defaults = Self::defaults_for(record_type);
        let prefix = format!("TESSERA_{}", record_type.name.to_uppercase());

        Self {
            worker_pool: std::env::var(format!("{prefix}_WORKER_POOL"))
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.worker_pool),
            refresh_interval: std::env::var(format!("{prefix}_REFRESH_MS"))
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.refresh_interval),
            warm_cache: std::env::var(format!("{prefix}_WARM_CACHE"))
                .ok()
                .map(|s| s.to_lowercase() != "false")
                .unwrap_or(defaults.warm_cache),
            batch_size: defaults.batch_size,
        }
    }

    /// Validate the settings.
    pub fn validate(&self) -> TesseraResult<()> {
        if self.worker_pool == 0 {
            return Err(TesseraError::Config(ConfigError::InvalidValue {
                field: "worker_pool".to_string(),
                value: self.worker_pool.to_string(),
                reason: "worker_pool must be at least 1".to_string(),
            }));
        }

        if self.batch_size == 0 {
            return Err(TesseraError::Config(ConfigError::InvalidValue {
                field: "batch_size".to_string(),
                value: self.batch_size.to_string(),
                reason: "batch_size must be at least 1".to_string(),
            }));
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
