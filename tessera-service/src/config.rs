//! Service Configuration
//!
//! Which record types to cache and how long shutdown may take. Store and
//! per-type cache settings are read by `tessera-core`.

use std::time::Duration;

use tessera_core::{ConfigError, RecordType, StoreConfig, TesseraError, TesseraResult};

use crate::constants::{DEFAULT_SHUTDOWN_GRACE_MS, DEFAULT_SHUTDOWN_TIMEOUT_MS};

// ============================================================================
// SERVICE CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub store: StoreConfig,

    /// Record types to boot engines for.
    pub record_types: Vec<RecordType>,

    /// Upper bound on waiting for every refresh task after ctrl-c.
    pub shutdown_timeout: Duration,

    /// Passed to each engine as its shutdown grace.
    pub shutdown_grace: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            record_types: RecordType::well_known(),
            shutdown_timeout: Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS),
            shutdown_grace: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `TESSERA_RECORD_TYPES`: comma-separated record type names (default: all well-known)
    /// - `TESSERA_SHUTDOWN_TIMEOUT_MS`: default 10000
    /// - `TESSERA_SHUTDOWN_GRACE_MS`: default 5000
    ///
    /// plus the `TESSERA_STORE_*` variables read by [`StoreConfig::from_env`].
    pub fn from_env() -> TesseraResult<Self> {
        let store = StoreConfig::from_env()?;

        let record_types = match std::env::var("TESSERA_RECORD_TYPES") {
            Ok(value) if !value.trim().is_empty() => parse_record_types(&value)?,
            _ => RecordType::well_known(),
        };

        let shutdown_timeout = std::env::var("TESSERA_SHUTDOWN_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS));

        let shutdown_grace = std::env::var("TESSERA_SHUTDOWN_GRACE_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS));

        Ok(Self {
            store,
            record_types,
            shutdown_timeout,
            shutdown_grace,
        })
    }

    pub fn validate(&self) -> TesseraResult<()> {
        self.store.validate()?;

        if self.record_types.is_empty() {
            return Err(TesseraError::Config(ConfigError::InvalidValue {
                field: "record_types".to_string(),
                value: String::new(),
                reason: "at least one record type must be configured".to_string(),
            }));
        }

        if self.shutdown_grace > self.shutdown_timeout {
            return Err(TesseraError::Config(ConfigError::InvalidValue {
                field: "shutdown_grace".to_string(),
                value: format!("{:?}", self.shutdown_grace),
                reason: format!(
                    "must not exceed shutdown_timeout ({:?})",
                    self.shutdown_timeout
                ),
            }));
        }

        Ok(())
    }
}

/// Parse `application, pipeline` into well-known record types, rejecting
/// unknown names and dropping duplicates.
pub fn parse_record_types(value: &str) -> TesseraResult<Vec<RecordType>> {
    let mut types: Vec<RecordType> = Vec::new();
    for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let record_type = RecordType::by_name(name).ok_or_else(|| {
            TesseraError::Config(ConfigError::InvalidValue {
                field: "TESSERA_RECORD_TYPES".to_string(),
                value: name.to_string(),
                reason: "not a known record type".to_string(),
            })
        })?;
        if !types.contains(&record_type) {
            types.push(record_type);
        }
    }
    Ok(types)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record_types() {
        let types = parse_record_types("pipeline, application,pipeline").unwrap();
        let names: Vec<&str> = types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["pipeline", "application"]);
    }

    #[test]
    fn test_parse_unknown_record_type() {
        let err = parse_record_types("pipeline,widgets").unwrap_err();
        assert!(err.to_string().contains("widgets"));
    }

    #[test]
    fn test_validate() {
        let config = ServiceConfig {
            store: StoreConfig::for_bucket("front"),
            ..ServiceConfig::default()
        };
        assert!(config.validate().is_ok());

        let no_bucket = ServiceConfig::default();
        assert!(no_bucket.validate().is_err());

        let no_types = ServiceConfig {
            record_types: Vec::new(),
            ..config.clone()
        };
        assert!(no_types.validate().is_err());

        let long_grace = ServiceConfig {
            shutdown_grace: Duration::from_secs(60),
            ..config
        };
        assert!(long_grace.validate().is_err());
    }
}
