//! Tessera Service - Cache Runtime
//!
//! Boots a cache engine for each configured record type from environment
//! configuration, keeps them refreshed in the background and stops them
//! within a bounded time on ctrl-c.

pub mod config;
pub mod constants;
pub mod error;
pub mod record;
pub mod runtime;
pub mod telemetry;

pub use config::ServiceConfig;
pub use error::{ServiceError, ServiceResult};
pub use record::DocumentRecord;
pub use runtime::{CacheRuntime, DocumentCache};
pub use telemetry::{init_telemetry, LogFormat, TelemetryConfig};
