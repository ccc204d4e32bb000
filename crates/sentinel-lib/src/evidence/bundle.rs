//! Evidence bundle records
//!
//! Per-category capture records making up one forensic bundle. Every record
//! can independently mark itself as not captured with an error string, so a
//! partially failed capture still yields a useful manifest.

use crate::audit::AccessibilityIssue;
use crate::models::{ConsoleError, Evidence, FailureInfo, NetworkFailure, PerformanceMetrics};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotEvidence {
    pub captured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScreenshotEvidence {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            captured: false,
            path: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomSnapshotEvidence {
    pub captured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DomSnapshotEvidence {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            captured: false,
            path: None,
            size_bytes: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleErrorsEvidence {
    pub captured: bool,
    pub count: usize,
    pub entries: Vec<ConsoleError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConsoleErrorsEvidence {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            captured: false,
            count: 0,
            entries: Vec::new(),
            path: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkFailuresEvidence {
    pub captured: bool,
    pub count: usize,
    pub entries: Vec<NetworkFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NetworkFailuresEvidence {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            captured: false,
            count: 0,
            entries: Vec::new(),
            path: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetricsEvidence {
    pub captured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<PerformanceMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PerformanceMetricsEvidence {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            captured: false,
            metrics: None,
            path: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStateEvidence {
    pub captured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StorageStateEvidence {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            captured: false,
            path: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessibilityEvidence {
    pub captured: bool,
    pub issues: Vec<AccessibilityIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AccessibilityEvidence {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            captured: false,
            issues: Vec::new(),
            path: None,
            error: Some(error.into()),
        }
    }
}

/// The durable, multi-file forensic record captured at the moment of a test
/// failure. Written as `evidence.json` in its bundle directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceBundle {
    /// Deterministic identifier: `<ISO-timestamp>-<sanitized-test-name>`.
    pub id: String,
    pub failure: FailureInfo,
    pub url: String,
    pub captured_at_ms: i64,
    pub dir: PathBuf,
    pub screenshot: ScreenshotEvidence,
    pub dom_snapshot: DomSnapshotEvidence,
    pub console_errors: ConsoleErrorsEvidence,
    pub network_failures: NetworkFailuresEvidence,
    pub performance: PerformanceMetricsEvidence,
    pub storage_state: StorageStateEvidence,
    pub accessibility: AccessibilityEvidence,
}

impl EvidenceBundle {
    /// Number of categories that captured successfully, out of seven.
    pub fn captured_count(&self) -> usize {
        [
            self.screenshot.captured,
            self.dom_snapshot.captured,
            self.console_errors.captured,
            self.network_failures.captured,
            self.performance.captured,
            self.storage_state.captured,
            self.accessibility.captured,
        ]
        .iter()
        .filter(|c| **c)
        .count()
    }

    /// Convert the bundle into the classifier's `Evidence` input. Categories
    /// that failed to capture become absent fields.
    pub fn to_evidence(&self) -> Evidence {
        Evidence {
            error_message: Some(self.failure.error.clone()),
            network_failures: self
                .network_failures
                .captured
                .then(|| self.network_failures.entries.clone()),
            console_errors: self
                .console_errors
                .captured
                .then(|| self.console_errors.entries.clone()),
            performance: self.performance.metrics.clone(),
            screenshot_path: self.screenshot.path.clone(),
            dom_snapshot_path: self.dom_snapshot.path.clone(),
            url: self.url.clone(),
            captured_at_ms: self.captured_at_ms,
        }
    }
}
