//! Error types for tessera operations

use thiserror::Error;

/// Object store and cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Record not found: {record_type} with id {id}")]
    NotFound { record_type: String, id: String },

    #[error("Transient store failure during {operation} on {key}: {reason}")]
    Transient {
        operation: String,
        key: String,
        reason: String,
    },

    #[error("Corrupt record at {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("Serialization failed: {reason}")]
    SerializationFailed { reason: String },

    #[error("Store is read-only, refusing {operation}")]
    ReadOnly { operation: String },

    #[error("Backend {backend} does not support object versioning")]
    VersioningUnsupported { backend: String },

    #[error("{operation} of {record_type} abandoned during shutdown")]
    Abandoned {
        record_type: String,
        operation: String,
    },

    #[error("Bulk operation on {record_type} failed for {failed:?}")]
    BulkFailed {
        record_type: String,
        failed: Vec<String>,
    },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unknown storage backend: {backend}")]
    UnknownBackend { backend: String },
}

/// Master error type for all tessera errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TesseraError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl TesseraError {
    /// Build a `NotFound` error for a record id.
    pub fn not_found(record_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Store(StoreError::NotFound {
            record_type: record_type.into(),
            id: id.into(),
        })
    }

    /// Build a `Transient` error for a failed remote call.
    pub fn transient(
        operation: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Store(StoreError::Transient {
            operation: operation.into(),
            key: key.into(),
            reason: reason.into(),
        })
    }

    /// Build a `CorruptRecord` error for an undecodable blob.
    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Store(StoreError::CorruptRecord {
            key: key.into(),
            reason: reason.into(),
        })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound { .. }))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(StoreError::Transient { .. }))
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Store(StoreError::CorruptRecord { .. }))
    }

    pub fn is_abandoned(&self) -> bool {
        matches!(self, Self::Store(StoreError::Abandoned { .. }))
    }
}

/// Result type alias for tessera operations.
pub type TesseraResult<T> = Result<T, TesseraError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display_not_found() {
        let err = StoreError::NotFound {
            record_type: "pipelines".to_string(),
            id: "deploy-prod".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Record not found"));
        assert!(msg.contains("pipelines"));
        assert!(msg.contains("deploy-prod"));
    }

    #[test]
    fn test_store_error_display_transient() {
        let err = StoreError::Transient {
            operation: "list".to_string(),
            key: "front/applications".to_string(),
            reason: "503 slow down".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("list"));
        assert!(msg.contains("front/applications"));
        assert!(msg.contains("503"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "worker_pool".to_string(),
            value: "0".to_string(),
            reason: "must be at least 1".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("worker_pool"));
        assert!(msg.contains("0"));
        assert!(msg.contains("must be at least 1"));
    }

    #[test]
    fn test_tessera_error_from_variants() {
        let store = TesseraError::from(StoreError::LockPoisoned);
        assert!(matches!(store, TesseraError::Store(_)));

        let config = TesseraError::from(ConfigError::UnknownBackend {
            backend: "tape".to_string(),
        });
        assert!(matches!(config, TesseraError::Config(_)));
    }

    #[test]
    fn test_error_predicates() {
        assert!(TesseraError::not_found("pipelines", "a").is_not_found());
        assert!(TesseraError::transient("get", "k", "timeout").is_transient());
        assert!(TesseraError::corrupt("k", "eof").is_corrupt());
        assert!(!TesseraError::from(StoreError::LockPoisoned).is_not_found());
    }
}
