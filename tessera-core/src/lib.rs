//! Tessera Core - Record Contracts
//!
//! Data types shared by every tessera crate: the record contract, record
//! type conventions, errors, configuration and health reporting. No I/O
//! lives here.

pub mod config;
pub mod error;
pub mod health;
pub mod record;

pub use config::{
    BackendKind, RecordTypeSettings, StoreConfig, DEFAULT_BATCH_SIZE, DEFAULT_LIST_PAGE_SIZE,
};
pub use error::{ConfigError, StoreError, TesseraError, TesseraResult};
pub use health::{HealthCheck, HealthStatus};
pub use record::{Record, RecordType, Timestamp, MARKER_FILENAME};
