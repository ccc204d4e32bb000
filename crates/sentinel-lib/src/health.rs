//! Page health scoring
//!
//! Continuously observes a page session's console/network signal stream and
//! produces an on-demand composite quality score. Scoring answers "is this
//! page, right now, degraded?", so deductions only count signals inside a
//! short recency window rather than session-wide noise from earlier pages.

use crate::audit::{audit_dom, total_deduction, AccessibilityIssue};
use crate::models::{now_ms, ConsoleError, NetworkFailure, PerformanceMetrics};
use crate::observability::SentinelMetrics;
use crate::session::PageSession;
use crate::signals::SignalLog;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::debug;

/// Signals older than this do not affect the score.
const RECENCY_WINDOW_MS: i64 = 5_000;

/// Deduction per recent console error.
const CONSOLE_ERROR_PENALTY: u32 = 10;

/// Deduction per recent network failure.
const NETWORK_FAILURE_PENALTY: u32 = 15;

/// One-time deduction for slow first contentful paint.
const SLOW_FCP_PENALTY: u32 = 20;

/// First-contentful-paint threshold.
const FCP_THRESHOLD_MS: f64 = 3_000.0;

/// Per-category sub-scores and raw counts backing a health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub error_score: u32,
    pub network_score: u32,
    pub performance_score: u32,
    pub accessibility_score: u32,
    pub recent_console_errors: usize,
    pub recent_network_failures: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_contentful_paint_ms: Option<f64>,
    pub accessibility_issues: Vec<AccessibilityIssue>,
}

/// A scored snapshot of page quality. Derived, never persisted by the
/// scorer; the caller decides persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageHealthReport {
    /// Composite score in [0, 100].
    pub score: u32,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub metrics: HealthMetrics,
    pub url: String,
    pub assessed_at_ms: i64,
}

/// Counts over the accumulated observation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationSummary {
    pub console_errors: usize,
    pub network_failures: usize,
    pub total: usize,
}

/// Attaches to a live page session and scores it on demand.
pub struct PageHealthScorer {
    signals: SignalLog,
    metrics: SentinelMetrics,
}

impl PageHealthScorer {
    pub fn new() -> Self {
        Self {
            signals: SignalLog::new(),
            metrics: SentinelMetrics::new(),
        }
    }

    /// Register listeners on the session's event stream. Observations are
    /// appended to an ordered internal log with no deduplication.
    pub fn attach(&self, session: &dyn PageSession) -> JoinHandle<()> {
        self.signals.attach(session)
    }

    /// Compute a health score from the current observation log plus live
    /// performance and DOM probes. Probe failures degrade the assessment
    /// instead of failing it.
    pub async fn assess(&self, session: &dyn PageSession) -> PageHealthReport {
        let assessed_at_ms = now_ms();
        let since = assessed_at_ms - RECENCY_WINDOW_MS;

        let recent_errors = self.signals.recent_console_errors(since).await;
        let recent_failures = self.signals.recent_network_failures(since).await;

        let performance = match session.performance_metrics().await {
            Ok(p) => Some(p),
            Err(e) => {
                debug!(error = %e, "Performance metrics unavailable for assessment");
                None
            }
        };
        let accessibility_issues = match session.dom_html().await {
            Ok(html) => audit_dom(&html),
            Err(e) => {
                debug!(error = %e, "DOM unavailable, skipping accessibility checks");
                Vec::new()
            }
        };

        let report = self.build_report(
            session.url(),
            assessed_at_ms,
            &recent_errors,
            &recent_failures,
            performance,
            accessibility_issues,
        );
        self.metrics.set_page_health_score(report.score as i64);
        report
    }

    fn build_report(
        &self,
        url: String,
        assessed_at_ms: i64,
        recent_errors: &[ConsoleError],
        recent_failures: &[NetworkFailure],
        performance: Option<PerformanceMetrics>,
        accessibility_issues: Vec<AccessibilityIssue>,
    ) -> PageHealthReport {
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();
        let mut deduction = 0u32;

        let error_penalty = CONSOLE_ERROR_PENALTY * recent_errors.len() as u32;
        if !recent_errors.is_empty() {
            issues.push(format!(
                "{} console error(s) in the last {}s",
                recent_errors.len(),
                RECENCY_WINDOW_MS / 1000
            ));
            recommendations.push("Fix console errors before they mask real failures".to_string());
        }
        deduction += error_penalty;

        let network_penalty = NETWORK_FAILURE_PENALTY * recent_failures.len() as u32;
        if !recent_failures.is_empty() {
            issues.push(format!(
                "{} network failure(s) in the last {}s",
                recent_failures.len(),
                RECENCY_WINDOW_MS / 1000
            ));
            recommendations
                .push("Check backend availability for the failing endpoints".to_string());
        }
        deduction += network_penalty;

        let fcp_ms = performance.as_ref().and_then(|p| p.first_contentful_paint_ms);
        let slow_paint = fcp_ms.map(|fcp| fcp > FCP_THRESHOLD_MS).unwrap_or(false);
        if slow_paint {
            issues.push(format!(
                "first contentful paint {:.0}ms exceeds {:.0}ms",
                fcp_ms.unwrap_or_default(),
                FCP_THRESHOLD_MS
            ));
            recommendations
                .push("Reduce render-blocking resources to speed up first paint".to_string());
            deduction += SLOW_FCP_PENALTY;
        }

        let accessibility_penalty = total_deduction(&accessibility_issues);
        for issue in &accessibility_issues {
            issues.push(format!("accessibility: {} (x{})", issue.description, issue.count));
        }
        if !accessibility_issues.is_empty() {
            recommendations
                .push("Address accessibility findings in the DOM snapshot".to_string());
        }
        deduction += accessibility_penalty;

        let metrics = HealthMetrics {
            error_score: 100u32.saturating_sub(error_penalty),
            network_score: 100u32.saturating_sub(network_penalty),
            performance_score: if slow_paint { 100 - SLOW_FCP_PENALTY } else { 100 },
            accessibility_score: 100u32.saturating_sub(accessibility_penalty),
            recent_console_errors: recent_errors.len(),
            recent_network_failures: recent_failures.len(),
            first_contentful_paint_ms: fcp_ms,
            accessibility_issues,
        };

        PageHealthReport {
            score: 100u32.saturating_sub(deduction),
            issues,
            recommendations,
            metrics,
            url,
            assessed_at_ms,
        }
    }

    /// Counts over the accumulated observation log.
    pub async fn observation_summary(&self) -> ObservationSummary {
        let console_errors = self.signals.console_errors().await.len();
        let network_failures = self.signals.network_failures().await.len();
        ObservationSummary {
            console_errors,
            network_failures,
            total: console_errors + network_failures,
        }
    }

    /// All console errors observed so far.
    pub async fn current_errors(&self) -> Vec<ConsoleError> {
        self.signals.console_errors().await
    }

    /// Clear the observation log so the same attached scorer can score a
    /// successive page.
    pub async fn reset(&self) {
        self.signals.reset().await;
    }

    /// The underlying signal log, shared with the evidence collector when
    /// both observe the same page.
    pub fn signals(&self) -> &SignalLog {
        &self.signals
    }
}

impl Default for PageHealthScorer {
    fn default() -> Self {
        Self::new()
    }
}
