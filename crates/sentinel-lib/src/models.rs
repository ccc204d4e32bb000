//! Core data models for the test sentinel

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Returns the current time as epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Console message severity as reported by the page session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warning,
    Error,
}

impl ConsoleLevel {
    /// Levels the sentinel records as failure signals.
    pub fn is_signal(&self) -> bool {
        matches!(self, ConsoleLevel::Warning | ConsoleLevel::Error)
    }
}

/// A console error or warning observed on the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleError {
    pub level: ConsoleLevel,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub timestamp_ms: i64,
}

/// A failed HTTP response or request-level network error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkFailure {
    pub url: String,
    /// HTTP status for failed responses; None for request-level failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    /// Driver-reported reason for aborted or blocked requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub timestamp_ms: i64,
}

/// Navigation, paint and memory timings reported by the page session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dom_content_loaded_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_event_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_paint_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_contentful_paint_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub js_heap_used_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub js_heap_total_bytes: Option<u64>,
}

/// Broad category supplied by the caller alongside a failure description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Assertion,
    Timeout,
    Navigation,
    Unknown,
}

/// Caller-supplied description of a test failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Test name, used to derive the evidence bundle identifier.
    pub name: String,
    /// Error message from the failed test action.
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
}

impl FailureInfo {
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: FailureKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Normalized, page-independent description of a failure's observable
/// symptoms. Sole input to the failure classifier; immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_failures: Option<Vec<NetworkFailure>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console_errors: Option<Vec<ConsoleError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dom_snapshot_path: Option<PathBuf>,
    pub url: String,
    pub captured_at_ms: i64,
}

impl Evidence {
    /// Create evidence with no captured signals.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            error_message: None,
            network_failures: None,
            console_errors: None,
            performance: None,
            screenshot_path: None,
            dom_snapshot_path: None,
            url: url.into(),
            captured_at_ms: now_ms(),
        }
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_network_failures(mut self, failures: Vec<NetworkFailure>) -> Self {
        self.network_failures = Some(failures);
        self
    }

    pub fn with_console_errors(mut self, errors: Vec<ConsoleError>) -> Self {
        self.console_errors = Some(errors);
        self
    }

    pub fn with_performance(mut self, metrics: PerformanceMetrics) -> Self {
        self.performance = Some(metrics);
        self
    }
}
