//! Health reporting types
//!
//! Each cache engine reports one of two states to whoever operates it
//! (a liveness probe, the service binary).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::Timestamp;

/// Health status of one record type's cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// A refresh completed within the health interval
    Healthy,
    /// No recent refresh, or the cache was never populated
    Degraded,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Detailed health check result for a record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall health status
    pub status: HealthStatus,
    /// Record type name
    pub component: String,
    /// Why the cache is degraded, if it is
    pub message: Option<String>,
    /// When the last refresh completed
    pub last_refreshed_at: Option<Timestamp>,
    /// Additional metadata
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl HealthCheck {
    /// Create a healthy check result.
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            component: component.into(),
            message: None,
            last_refreshed_at: None,
            metadata: None,
        }
    }

    /// Create a degraded check result.
    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            component: component.into(),
            message: Some(message.into()),
            last_refreshed_at: None,
            metadata: None,
        }
    }

    /// Set the last refresh time.
    pub fn with_last_refreshed_at(mut self, at: Option<Timestamp>) -> Self {
        self.last_refreshed_at = at;
        self
    }

    /// Add metadata.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }
}
