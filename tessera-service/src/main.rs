//! Tessera Service Entry Point
//!
//! Reads configuration, builds the object store and the per-type engines,
//! then runs until ctrl-c.

use tessera_service::{init_telemetry, CacheRuntime, ServiceConfig, ServiceResult, TelemetryConfig};

#[tokio::main]
async fn main() -> ServiceResult<()> {
    let telemetry_config = TelemetryConfig::from_env()?;
    init_telemetry(&telemetry_config)?;

    let config = ServiceConfig::from_env()?;
    let store = tessera_storage::from_config(&config.store)?;
    tracing::info!(
        backend = %config.store.backend.as_str(),
        bucket = config.store.bucket.as_deref().unwrap_or_default(),
        read_only = config.store.read_only,
        "Starting tessera"
    );

    let runtime = CacheRuntime::start(&config, store).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    for (record_type, metrics) in runtime.shutdown().await? {
        tracing::debug!(
            record_type = %record_type,
            refresh_cycles = metrics.refresh_cycles,
            refresh_failures = metrics.refresh_failures,
            "Engine stopped"
        );
    }
    Ok(())
}
