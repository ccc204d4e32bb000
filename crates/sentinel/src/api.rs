//! HTTP API for health checks and Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use sentinel_lib::ResourceGuard;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub guard: Arc<ResourceGuard>,
}

impl AppState {
    pub fn new(guard: Arc<ResourceGuard>) -> Self {
        Self { guard }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    limits: sentinel_lib::guard::LimitCheck,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    breaker_state: sentinel_lib::guard::BreakerState,
}

#[derive(Serialize)]
struct LimitsResponse {
    limits: sentinel_lib::guard::LimitCheck,
    stats: sentinel_lib::guard::ResourceStats,
    breaker_state: sentinel_lib::guard::BreakerState,
}

/// Health check - returns 200 while every resource ceiling holds, 503 after
/// any limit is breached or the breaker opened
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let limits = state.guard.is_within_limits().await;

    let (status_code, status) = if limits.all_ok() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (status_code, Json(HealthResponse { status, limits }))
}

/// Readiness check - returns 200 while the guard accepts new operations
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ready = state.guard.can_proceed().await && !state.guard.is_terminated();
    let breaker_state = state.guard.breaker_state().await;

    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(ReadinessResponse {
            ready,
            breaker_state,
        }),
    )
}

/// Full limit and usage snapshot
async fn limits(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = LimitsResponse {
        limits: state.guard.is_within_limits().await,
        stats: state.guard.stats().await,
        breaker_state: state.guard.breaker_state().await,
    };
    Json(response)
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder.encode(&metric_families, &mut buffer).unwrap();

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/limits", get(limits))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
