//! Failure classification
//!
//! Scores captured evidence against four failure hypotheses (test flake,
//! application regression, environment issue, data problem) and picks the
//! highest-confidence one. Classification is pure and never fails: empty
//! evidence simply yields zero confidence everywhere.

use crate::models::{now_ms, Evidence, NetworkFailure};
use crate::observability::SentinelMetrics;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Confidence ceiling. Heuristic scores are additive and can exceed 1.0;
/// they are clamped here so the output never claims certainty.
pub const MAX_CONFIDENCE: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    TestFlake,
    AppRegression,
    EnvironmentIssue,
    DataProblem,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::TestFlake => "test_flake",
            FailureType::AppRegression => "app_regression",
            FailureType::EnvironmentIssue => "environment_issue",
            FailureType::DataProblem => "data_problem",
        }
    }
}

impl std::fmt::Display for FailureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scored hypothesis with the signals that contributed to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub failure_type: FailureType,
    pub confidence: f64,
    pub reasons: Vec<String>,
    /// Whether an automated fix (retry, selector repair) is worth attempting.
    pub fixable: bool,
    /// Targeted guidance, one entry per kind of signal that fired, in the
    /// order the signals were scored.
    pub recommendations: Vec<String>,
}

/// Full result of a classification run: the winning hypothesis plus the
/// scores of all four, for audit trails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullClassification {
    pub best: Classification,
    pub all_classifications: Vec<Classification>,
    pub analyzed_at_ms: i64,
}

#[derive(Default)]
pub struct FailureClassifier {
    metrics: SentinelMetrics,
}

impl FailureClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score all four hypotheses and return the strict-max winner. Ties keep
    /// the earlier hypothesis in the fixed order flake, regression,
    /// environment, data.
    pub fn classify(&self, evidence: &Evidence) -> FullClassification {
        let all = vec![
            score_test_flake(evidence),
            score_app_regression(evidence),
            score_environment_issue(evidence),
            score_data_problem(evidence),
        ];

        let mut best = &all[0];
        for candidate in &all[1..] {
            if candidate.confidence > best.confidence {
                best = candidate;
            }
        }
        let best = best.clone();

        self.metrics.inc_classification(best.failure_type.as_str());
        info!(
            failure_type = %best.failure_type,
            confidence = best.confidence,
            fixable = best.fixable,
            "Failure classified"
        );

        FullClassification {
            best,
            all_classifications: all,
            analyzed_at_ms: now_ms(),
        }
    }
}

struct Scorer {
    confidence: f64,
    reasons: Vec<String>,
    recommendations: Vec<String>,
}

impl Scorer {
    fn new() -> Self {
        Self {
            confidence: 0.0,
            reasons: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    /// Record a matched condition: its weight, the reason, and the guidance
    /// keyed to that specific reason.
    fn add(&mut self, weight: f64, reason: impl Into<String>, recommendations: &[&str]) {
        self.confidence += weight;
        self.reasons.push(reason.into());
        for rec in recommendations {
            if !self.recommendations.iter().any(|r| r == rec) {
                self.recommendations.push((*rec).to_string());
            }
        }
    }

    fn finish(self, failure_type: FailureType, fixable: bool) -> Classification {
        Classification {
            failure_type,
            confidence: self.confidence.min(MAX_CONFIDENCE),
            reasons: self.reasons,
            fixable,
            recommendations: self.recommendations,
        }
    }
}

fn error_text(evidence: &Evidence) -> String {
    evidence
        .error_message
        .as_deref()
        .unwrap_or_default()
        .to_lowercase()
}

fn console_texts(evidence: &Evidence) -> Vec<String> {
    evidence
        .console_errors
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|e| e.text.to_lowercase())
        .collect()
}

fn network_failures(evidence: &Evidence) -> &[NetworkFailure] {
    evidence.network_failures.as_deref().unwrap_or_default()
}

fn any_status(evidence: &Evidence, pred: impl Fn(u16) -> bool) -> bool {
    network_failures(evidence)
        .iter()
        .any(|f| f.status.map(&pred).unwrap_or(false))
}

fn score_test_flake(evidence: &Evidence) -> Classification {
    let mut s = Scorer::new();
    let error = error_text(evidence);

    if error.contains("timeout") {
        s.add(
            0.6,
            "Error message indicates a timeout",
            &[
                "Increase timeout values for the failing step",
                "Add explicit waits before assertions",
            ],
        );
    }
    if error.contains("element not found") {
        s.add(
            0.4,
            "Element lookup failed, often timing-related",
            &["Wait for the element to be attached before interacting"],
        );
    }
    if network_failures(evidence).iter().any(|f| {
        f.failure_reason
            .as_deref()
            .map(|r| r.to_lowercase().contains("timeout") || r.to_lowercase().contains("timed_out"))
            .unwrap_or(false)
    }) {
        s.add(
            0.3,
            "Network request timed out during the test",
            &["Wait for pending network requests to settle before asserting"],
        );
    }
    if error.contains("not visible") || error.contains("not attached") {
        s.add(
            0.5,
            "Element state churn (not visible / not attached)",
            &["Wait for the element to be visible and stable before interacting"],
        );
    }
    if console_texts(evidence)
        .iter()
        .any(|t| t.contains("animation") || t.contains("transition"))
    {
        s.add(
            0.2,
            "Animation or transition activity in console output",
            &["Disable animations and transitions in the test environment"],
        );
    }

    let fixable = s.confidence > 0.0;
    s.finish(FailureType::TestFlake, fixable)
}

fn score_app_regression(evidence: &Evidence) -> Classification {
    let mut s = Scorer::new();
    let console = console_texts(evidence);

    let js_errors = console
        .iter()
        .filter(|t| {
            t.contains("typeerror")
                || t.contains("referenceerror")
                || t.contains("cannot read property")
        })
        .count();
    if js_errors > 0 {
        s.add(
            0.7,
            format!("{js_errors} JavaScript runtime error(s) in the page console"),
            &["Inspect console stack traces against recent frontend changes"],
        );
    }
    if any_status(evidence, |st| st >= 500) {
        s.add(
            0.8,
            "Server error response (5xx)",
            &["Check server logs for the failing endpoints"],
        );
    }
    if any_status(evidence, |st| (400..=499).contains(&st)) {
        s.add(
            0.6,
            "Client error response (4xx)",
            &["Verify the client request contract against the current API"],
        );
    }
    if console.iter().any(|t| {
        t.contains("react") || t.contains("vue") || t.contains("angular") || t.contains("component")
    }) {
        s.add(
            0.5,
            "Frontend framework error in the page console",
            &["Bisect recent component changes"],
        );
    }

    let has_property_error = console.iter().any(|t| t.contains("cannot read property"));
    let has_api_404 = network_failures(evidence)
        .iter()
        .any(|f| f.status == Some(404) && f.url.contains("/api/"));
    let fixable = s.confidence > 0.8 && (has_property_error || has_api_404);

    s.finish(FailureType::AppRegression, fixable)
}

fn score_environment_issue(evidence: &Evidence) -> Classification {
    let mut s = Scorer::new();
    let error = error_text(evidence);
    let reasons: Vec<String> = network_failures(evidence)
        .iter()
        .filter_map(|f| f.failure_reason.as_deref())
        .map(str::to_lowercase)
        .collect();

    let mentions = |needle: &str| error.contains(needle) || reasons.iter().any(|r| r.contains(needle));

    if mentions("connection refused") || mentions("err_connection_refused") {
        s.add(
            0.9,
            "Connection refused, target service unreachable",
            &["Verify the target service is up and reachable from the test host"],
        );
    }
    if mentions("connection reset") || mentions("err_connection_reset") {
        s.add(
            0.8,
            "Connection reset mid-request",
            &["Check for proxy or load balancer instability"],
        );
    }
    if mentions("dns") || mentions("name not resolved") {
        s.add(
            0.9,
            "DNS resolution failure",
            &["Check DNS configuration on the test host"],
        );
    }
    if error.contains("session closed") || error.contains("browser has been closed") {
        s.add(
            0.8,
            "Browser session died underneath the test",
            &["Restart the browser host and rerun"],
        );
    }
    if let Some(perf) = &evidence.performance {
        if perf.js_heap_used_bytes.unwrap_or(0) > 100 * 1024 * 1024 {
            s.add(
                0.3,
                "JS heap above 100MB, possible resource exhaustion",
                &["Increase browser memory or split the test into smaller runs"],
            );
        }
    }

    s.finish(FailureType::EnvironmentIssue, false)
}

fn score_data_problem(evidence: &Evidence) -> Classification {
    let mut s = Scorer::new();
    let error = error_text(evidence);

    if any_status(evidence, |st| st == 401) {
        s.add(
            0.7,
            "Unauthorized response, credentials or session fixture stale",
            &["Refresh auth credentials or session fixtures"],
        );
    }
    if error.contains("not found") && any_status(evidence, |st| st == 404) {
        s.add(
            0.6,
            "Expected entity missing (404 with not-found error)",
            &["Reseed the test data the scenario expects"],
        );
    }
    if any_status(evidence, |st| st == 503) {
        s.add(
            0.5,
            "Dependent service unavailable (503)",
            &["Wait for dependent services to become available before the run"],
        );
    }
    if any_status(evidence, |st| st == 422) {
        s.add(
            0.4,
            "Request rejected as unprocessable (422)",
            &["Validate fixture payloads against the current schema"],
        );
    }

    s.finish(FailureType::DataProblem, false)
}
