//! Observability infrastructure for the test sentinel
//!
//! Prometheus metrics for guard activity (operation latency, retries,
//! breaker trips), evidence collection and classification outcomes.

use crate::guard::BreakerState;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_gauge, GaugeVec, Histogram, IntGauge,
};
use std::sync::OnceLock;

/// Histogram buckets for guarded-operation latency (in seconds).
const LATENCY_BUCKETS: &[f64] = &[
    0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SentinelMetricsInner> = OnceLock::new();

struct SentinelMetricsInner {
    operation_latency_seconds: Histogram,
    retries_total: IntGauge,
    breaker_trips_total: IntGauge,
    breaker_state: IntGauge,
    resource_warnings_total: IntGauge,
    evidence_bundles_total: IntGauge,
    capture_errors_total: IntGauge,
    classifications_total: GaugeVec,
    page_health_score: IntGauge,
}

impl SentinelMetricsInner {
    fn new() -> Self {
        Self {
            operation_latency_seconds: register_histogram!(
                "test_sentinel_operation_latency_seconds",
                "Time spent in guarded test operations",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register operation_latency_seconds"),

            retries_total: register_int_gauge!(
                "test_sentinel_retries_total",
                "Total retry attempts across all guarded operations"
            )
            .expect("Failed to register retries_total"),

            breaker_trips_total: register_int_gauge!(
                "test_sentinel_breaker_trips_total",
                "Total circuit breaker trips"
            )
            .expect("Failed to register breaker_trips_total"),

            breaker_state: register_int_gauge!(
                "test_sentinel_breaker_state",
                "Circuit breaker state (0=closed, 1=half_open, 2=open)"
            )
            .expect("Failed to register breaker_state"),

            resource_warnings_total: register_int_gauge!(
                "test_sentinel_resource_warnings_total",
                "Total memory ceiling warnings from the background monitor"
            )
            .expect("Failed to register resource_warnings_total"),

            evidence_bundles_total: register_int_gauge!(
                "test_sentinel_evidence_bundles_total",
                "Total evidence bundles written"
            )
            .expect("Failed to register evidence_bundles_total"),

            capture_errors_total: register_int_gauge!(
                "test_sentinel_capture_errors_total",
                "Total evidence sub-captures that failed"
            )
            .expect("Failed to register capture_errors_total"),

            classifications_total: register_gauge_vec!(
                "test_sentinel_classifications_total",
                "Failure classifications by winning type",
                &["failure_type"]
            )
            .expect("Failed to register classifications_total"),

            page_health_score: register_int_gauge!(
                "test_sentinel_page_health_score",
                "Most recent page health score (0-100)"
            )
            .expect("Failed to register page_health_score"),
        }
    }
}

/// Sentinel metrics for Prometheus exposition.
///
/// A lightweight handle to the global metrics instance; multiple clones
/// share the same underlying metrics.
#[derive(Clone)]
pub struct SentinelMetrics {
    _private: (),
}

impl Default for SentinelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SentinelMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SentinelMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SentinelMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_operation_latency(&self, duration_secs: f64) {
        self.inner().operation_latency_seconds.observe(duration_secs);
    }

    pub fn inc_retries(&self) {
        self.inner().retries_total.inc();
    }

    pub fn inc_breaker_trips(&self) {
        self.inner().breaker_trips_total.inc();
    }

    pub fn set_breaker_state(&self, state: BreakerState) {
        let value = match state {
            BreakerState::Closed => 0,
            BreakerState::HalfOpen => 1,
            BreakerState::Open => 2,
        };
        self.inner().breaker_state.set(value);
    }

    pub fn inc_resource_warnings(&self) {
        self.inner().resource_warnings_total.inc();
    }

    pub fn inc_evidence_bundles(&self) {
        self.inner().evidence_bundles_total.inc();
    }

    pub fn inc_capture_errors(&self) {
        self.inner().capture_errors_total.inc();
    }

    pub fn inc_classification(&self, failure_type: &str) {
        self.inner()
            .classifications_total
            .with_label_values(&[failure_type])
            .inc();
    }

    pub fn set_page_health_score(&self, score: i64) {
        self.inner().page_health_score.set(score);
    }
}
