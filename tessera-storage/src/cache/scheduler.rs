//! Background Refresh Task
//!
//! One task per record type. On every tick it asks the engine whether the
//! snapshot is stale and refreshes it if so; see
//! [`RecordCache::refresh_if_stale`]. Ticks that fall behind are skipped,
//! never queued.
//!
//! The task stops when the engine's shutdown signal fires:
//!
//! ```ignore
//! let handle = spawn_refresh_task(cache.clone());
//!
//! // Later
//! cache.shutdown();
//! let metrics = handle.await?;
//! ```

use tessera_core::Record;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::engine::RecordCache;
use super::metrics::RefreshMetricsSnapshot;

/// Refresh `cache` every `refresh_interval` until shutdown.
///
/// The first tick fires one interval after start; warming is a separate
/// step done before the task is spawned.
pub async fn refresh_task<T: Record>(cache: RecordCache<T>) -> RefreshMetricsSnapshot {
    let mut shutdown_rx = cache.subscribe_shutdown();
    let period = cache.config().refresh_interval;

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        record_type = %cache.record_type(),
        refresh_interval_ms = period.as_millis() as u64,
        "Refresh task started"
    );

    let already_stopping = *shutdown_rx.borrow_and_update();
    if !already_stopping {
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    // The next tick retries.
                    if let Err(e) = cache.refresh_if_stale().await {
                        tracing::warn!(
                            record_type = %cache.record_type(),
                            error = %e,
                            "Scheduled refresh failed"
                        );
                    }
                }
            }
        }
    }

    let snapshot = cache.metrics();
    tracing::info!(
        record_type = %cache.record_type(),
        refresh_cycles = snapshot.refresh_cycles,
        skipped_cycles = snapshot.skipped_cycles,
        joined_refreshes = snapshot.joined_refreshes,
        refresh_failures = snapshot.refresh_failures,
        items_fetched = snapshot.items_fetched,
        items_removed = snapshot.items_removed,
        fetch_failures = snapshot.fetch_failures,
        "Refresh task completed"
    );
    snapshot
}

/// Spawn [`refresh_task`] on the current runtime.
pub fn spawn_refresh_task<T: Record>(cache: RecordCache<T>) -> JoinHandle<RefreshMetricsSnapshot> {
    tokio::spawn(refresh_task(cache))
}
