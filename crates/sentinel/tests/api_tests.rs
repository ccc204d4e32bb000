//! Integration tests for the sentinel API endpoints

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use sentinel_lib::{ResourceGuard, ResourceLimits, SentinelMetrics, ShutdownController};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceExt;

#[derive(Clone)]
struct AppState {
    guard: Arc<ResourceGuard>,
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

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let limits = state.guard.is_within_limits().await;
    let (status_code, status) = if limits.all_ok() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };
    (status_code, Json(HealthResponse { status, limits }))
}

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

async fn limits(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(LimitsResponse {
        limits: state.guard.is_within_limits().await,
        stats: state.guard.stats().await,
        breaker_state: state.guard.breaker_state().await,
    })
}

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

fn create_test_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/limits", get(limits))
        .route("/metrics", get(metrics))
        .with_state(state)
}

fn setup_test_app() -> (Router, Arc<AppState>) {
    let guard = Arc::new(ResourceGuard::new(
        ResourceLimits::default(),
        ShutdownController::new(),
    ));
    let state = Arc::new(AppState { guard });
    let router = create_test_router(state.clone());
    (router, state)
}

#[tokio::test]
async fn test_healthz_returns_ok_within_limits() {
    let (app, _state) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(health["status"], "healthy");
    assert_eq!(health["limits"]["breaker_closed"], true);
}

#[tokio::test]
async fn test_healthz_returns_503_after_breaker_opens() {
    let limits = ResourceLimits {
        failure_threshold: 2,
        ..ResourceLimits::default()
    };
    let guard = Arc::new(ResourceGuard::new(limits, ShutdownController::new()));
    let state = Arc::new(AppState {
        guard: Arc::clone(&guard),
    });
    let app = create_test_router(state);

    guard.record_breaker_failure().await;
    guard.record_breaker_failure().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(health["status"], "unhealthy");
    assert_eq!(health["limits"]["breaker_closed"], false);
}

#[tokio::test]
async fn test_readyz_returns_ok_when_accepting_work() {
    let (app, _state) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/readyz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(readiness["ready"], true);
    assert_eq!(readiness["breaker_state"], "closed");
}

#[tokio::test]
async fn test_readyz_returns_503_after_breaker_opens() {
    let limits = ResourceLimits {
        failure_threshold: 1,
        ..ResourceLimits::default()
    };
    let guard = Arc::new(ResourceGuard::new(limits, ShutdownController::new()));
    let state = Arc::new(AppState {
        guard: Arc::clone(&guard),
    });
    let app = create_test_router(state);

    guard.record_breaker_failure().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/readyz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(readiness["ready"], false);
    assert_eq!(readiness["breaker_state"], "open");
}

#[tokio::test]
async fn test_limits_returns_snapshot() {
    let guard = Arc::new(ResourceGuard::new(
        ResourceLimits::default(),
        ShutdownController::new(),
    ));
    let state = Arc::new(AppState {
        guard: Arc::clone(&guard),
    });
    let app = create_test_router(state);

    guard.record_healing_attempt().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/limits")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let snapshot: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(snapshot["limits"]["within_run_time"], true);
    assert_eq!(snapshot["limits"]["breaker_closed"], true);
    assert_eq!(snapshot["stats"]["healing_attempts"], 1);
    assert_eq!(snapshot["stats"]["tests_run"], 0);
    assert_eq!(snapshot["breaker_state"], "closed");
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, _state) = setup_test_app();

    // Record some metrics
    let metrics = SentinelMetrics::new();
    metrics.observe_operation_latency(0.120);
    metrics.inc_retries();
    metrics.inc_evidence_bundles();
    metrics.set_page_health_score(85);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    // Verify expected metrics are present
    assert!(metrics_text.contains("test_sentinel_operation_latency_seconds"));
    assert!(metrics_text.contains("test_sentinel_retries_total"));
    assert!(metrics_text.contains("test_sentinel_evidence_bundles_total"));
    assert!(metrics_text.contains("test_sentinel_page_health_score"));
}

#[tokio::test]
async fn test_metrics_contains_histogram_buckets() {
    let (app, _state) = setup_test_app();

    let metrics = SentinelMetrics::new();
    metrics.observe_operation_latency(0.015);
    metrics.observe_operation_latency(0.250);
    metrics.observe_operation_latency(2.5);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    // Verify histogram has bucket labels
    assert!(metrics_text.contains("test_sentinel_operation_latency_seconds_bucket"));
    assert!(metrics_text.contains("test_sentinel_operation_latency_seconds_count"));
    assert!(metrics_text.contains("test_sentinel_operation_latency_seconds_sum"));
}
