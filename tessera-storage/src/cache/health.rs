//! Cache health tracking.

use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use tessera_core::{HealthCheck, HealthStatus, Timestamp};

#[derive(Debug)]
struct HealthState {
    /// Last time a cycle confirmed the snapshot current.
    last_verified: Option<Timestamp>,
    consecutive_failures: u64,
    reported: HealthStatus,
}

/// Derives HEALTHY/DEGRADED from refresh outcomes.
///
/// Healthy means the cache has been populated and some cycle confirmed
/// it current within the last `interval`: either a completed refresh or
/// a staleness check that found nothing to do.
#[derive(Debug)]
pub struct HealthTracker {
    component: String,
    interval: Duration,
    state: Mutex<HealthState>,
}

impl HealthTracker {
    pub fn new(component: impl Into<String>, interval: Duration) -> Self {
        Self {
            component: component.into(),
            interval,
            state: Mutex::new(HealthState {
                last_verified: None,
                consecutive_failures: 0,
                reported: HealthStatus::Degraded,
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// A cycle confirmed the snapshot current at `at`.
    pub fn record_success(&self, at: Timestamp) {
        if let Ok(mut state) = self.state.lock() {
            state.last_verified = Some(match state.last_verified {
                Some(prev) if prev > at => prev,
                _ => at,
            });
            state.consecutive_failures = 0;
        }
        self.evaluate(true);
    }

    pub fn record_failure(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.consecutive_failures += 1;
        }
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.state
            .lock()
            .map(|s| s.consecutive_failures)
            .unwrap_or(0)
    }

    /// Compute the current status, logging transitions.
    pub fn evaluate(&self, populated: bool) -> HealthStatus {
        self.check(populated, None).status
    }

    /// Full health report.
    pub fn check(&self, populated: bool, last_refreshed_at: Option<Timestamp>) -> HealthCheck {
        let Ok(mut state) = self.state.lock() else {
            return HealthCheck::degraded(&self.component, "health state lock poisoned");
        };

        let now = Utc::now();
        let window = chrono::Duration::from_std(self.interval).unwrap_or(chrono::Duration::MAX);
        let check = match (populated, state.last_verified) {
            (false, _) | (_, None) => {
                HealthCheck::degraded(&self.component, "cache has never been populated")
            }
            (true, Some(at)) if now - at > window => HealthCheck::degraded(
                &self.component,
                format!(
                    "no refresh completed in {:?} ({} consecutive failures)",
                    self.interval, state.consecutive_failures
                ),
            ),
            (true, Some(_)) => HealthCheck::healthy(&self.component),
        };

        if check.status != state.reported {
            match check.status {
                HealthStatus::Healthy => tracing::info!(
                    record_type = %self.component,
                    "Cache healthy"
                ),
                HealthStatus::Degraded => tracing::warn!(
                    record_type = %self.component,
                    reason = check.message.as_deref().unwrap_or_default(),
                    "Cache degraded"
                ),
            }
            state.reported = check.status;
        }

        check
            .with_last_refreshed_at(last_refreshed_at)
            .with_metadata(
                "consecutive_failures",
                serde_json::Value::from(state.consecutive_failures),
            )
    }
}
