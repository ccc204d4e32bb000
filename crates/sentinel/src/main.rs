//! Test Sentinel - diagnostic safety net for automated UI test runs
//!
//! Supervises guarded operations with timeouts, retries and a circuit
//! breaker, enforces runtime and memory ceilings, and exposes health and
//! Prometheus metrics endpoints.

use anyhow::Result;
use sentinel_lib::{EmergencyReason, ResourceGuard, ShutdownController};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const SENTINEL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!(version = SENTINEL_VERSION, "Starting test-sentinel");

    // Load configuration
    let config = config::SentinelConfig::load()?;
    info!(
        api_port = config.api_port,
        evidence_dir = %config.evidence_dir,
        max_run_time_secs = config.max_run_time_secs,
        max_memory_mb = config.max_memory_mb,
        "Sentinel configured"
    );

    // Build the guard and verify the host before accepting work
    let shutdown = ShutdownController::new();
    let guard = Arc::new(
        ResourceGuard::new(config.limits(), shutdown.clone())
            .with_monitor_interval(config.monitor_interval()),
    );
    guard.validate_environment().await?;

    // Background ceiling checks
    let monitor_handle = guard.spawn_monitor();

    // Surface emergencies in the log as they happen
    let mut emergencies = guard.subscribe_emergency();
    tokio::spawn(async move {
        while let Ok(reason) = emergencies.recv().await {
            match reason {
                EmergencyReason::CircuitBreakerTripped { .. } => {
                    warn!(%reason, "Circuit breaker tripped")
                }
                other => error!(reason = %other, "Emergency shutdown"),
            }
        }
    });

    // Start health and metrics server
    let app_state = Arc::new(api::AppState::new(Arc::clone(&guard)));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for a shutdown signal from either side
    let mut shutdown_rx = shutdown.subscribe();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("SIGINT received");
            guard.shutdown().await;
        }
        _ = shutdown_rx.changed() => {
            info!("Shutdown triggered by resource guard");
        }
    }

    monitor_handle.abort();
    api_handle.abort();
    info!("Shutting down");

    Ok(())
}
