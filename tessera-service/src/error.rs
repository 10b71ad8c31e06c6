//! Error type for the service binary.

use tessera_core::TesseraError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Tessera(#[from] TesseraError),

    #[error("Failed to initialize telemetry: {0}")]
    Telemetry(String),

    #[error("Failed to join refresh task for {record_type}: {reason}")]
    TaskJoin { record_type: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
