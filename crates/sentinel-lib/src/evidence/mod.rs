//! Evidence collection
//!
//! Captures a seven-part forensic bundle at the moment a test fails:
//! screenshot, DOM snapshot, console errors, network failures, performance
//! metrics, storage state, and an accessibility audit. Individual captures
//! run concurrently and fail independently; a manifest is always written.

mod bundle;

pub use bundle::{
    AccessibilityEvidence, ConsoleErrorsEvidence, DomSnapshotEvidence, EvidenceBundle,
    NetworkFailuresEvidence, PerformanceMetricsEvidence, ScreenshotEvidence, StorageStateEvidence,
};

use crate::audit;
use crate::models::{now_ms, FailureInfo};
use crate::observability::SentinelMetrics;
use crate::session::PageSession;
use crate::signals::SignalLog;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const MANIFEST_FILE: &str = "evidence.json";
const SCREENSHOT_FILE: &str = "failure-screenshot.png";
const DOM_SNAPSHOT_FILE: &str = "dom-snapshot.html";
const CONSOLE_ERRORS_FILE: &str = "console-errors.json";
const NETWORK_FAILURES_FILE: &str = "network-failures.json";
const PERFORMANCE_FILE: &str = "performance-metrics.json";
const STORAGE_STATE_FILE: &str = "storage-state.json";
const ACCESSIBILITY_FILE: &str = "accessibility-tree.json";

const ERROR_MANIFEST_FILE: &str = "error-evidence.json";
const ERROR_SCREENSHOT_FILE: &str = "error-screenshot.png";

/// Maximum length of the sanitized test-name part of a bundle id.
const MAX_NAME_LEN: usize = 80;

/// Collects forensic bundles into timestamped directories under a base
/// directory. Attach it to a session early so console and network signals
/// observed during the run are available when a failure arrives.
pub struct EvidenceCollector {
    base_dir: PathBuf,
    signals: SignalLog,
    metrics: SentinelMetrics,
}

impl EvidenceCollector {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            signals: SignalLog::default(),
            metrics: SentinelMetrics::new(),
        }
    }

    /// Share an existing signal log, e.g. with a `PageHealthScorer` watching
    /// the same session.
    pub fn with_signals(mut self, signals: SignalLog) -> Self {
        self.signals = signals;
        self
    }

    pub fn signals(&self) -> &SignalLog {
        &self.signals
    }

    /// Start draining the session's event stream into the signal log.
    pub fn attach(&self, session: &dyn PageSession) -> JoinHandle<()> {
        self.signals.attach(session)
    }

    /// Capture a full bundle for a failed test. Every sub-capture runs
    /// concurrently and degrades to a `captured: false` record on error;
    /// the manifest is written regardless of how many categories succeeded.
    pub async fn collect(
        &self,
        session: &dyn PageSession,
        failure: &FailureInfo,
    ) -> Result<EvidenceBundle> {
        let captured_at_ms = now_ms();
        let id = bundle_id(&failure.name);
        let dir = self.base_dir.join(&id);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating evidence dir {}", dir.display()))?;

        let (screenshot, dom_snapshot, console_errors, network_failures, performance, storage_state, accessibility) = tokio::join!(
            self.capture_screenshot(session, &dir),
            self.capture_dom_snapshot(session, &dir),
            self.capture_console_errors(&dir),
            self.capture_network_failures(&dir),
            self.capture_performance(session, &dir),
            self.capture_storage_state(session, &dir),
            self.capture_accessibility(session, &dir),
        );

        let bundle = EvidenceBundle {
            id,
            failure: failure.clone(),
            url: session.url(),
            captured_at_ms,
            dir: dir.clone(),
            screenshot,
            dom_snapshot,
            console_errors,
            network_failures,
            performance,
            storage_state,
            accessibility,
        };

        let manifest = dir.join(MANIFEST_FILE);
        let json = serde_json::to_vec_pretty(&bundle).context("serializing evidence manifest")?;
        fs::write(&manifest, json)
            .await
            .with_context(|| format!("writing {}", manifest.display()))?;

        self.metrics.inc_evidence_bundles();
        info!(
            bundle = %bundle.id,
            captured = bundle.captured_count(),
            dir = %dir.display(),
            "Evidence bundle written"
        );
        Ok(bundle)
    }

    /// Lightweight capture for unexpected errors outside a test failure:
    /// a JSON record plus a best-effort screenshot in its own directory.
    pub async fn capture_error(&self, session: &dyn PageSession, error: &str) -> Result<PathBuf> {
        let dir = self
            .base_dir
            .join(format!("error-{}-{:08x}", now_ms(), rand::random::<u32>()));
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating error dir {}", dir.display()))?;

        let record = serde_json::json!({
            "error": error,
            "url": session.url(),
            "timestamp_ms": now_ms(),
        });
        fs::write(
            dir.join(ERROR_MANIFEST_FILE),
            serde_json::to_vec_pretty(&record)?,
        )
        .await
        .context("writing error record")?;

        match session.capture_screenshot().await {
            Ok(bytes) => {
                if let Err(e) = fs::write(dir.join(ERROR_SCREENSHOT_FILE), bytes).await {
                    warn!(error = %e, "Failed to write error screenshot");
                }
            }
            Err(e) => warn!(error = %e, "Failed to capture error screenshot"),
        }

        Ok(dir)
    }

    async fn capture_screenshot(&self, session: &dyn PageSession, dir: &Path) -> ScreenshotEvidence {
        let result: Result<ScreenshotEvidence> = async {
            let bytes = session.capture_screenshot().await?;
            let path = dir.join(SCREENSHOT_FILE);
            fs::write(&path, &bytes).await?;
            Ok(ScreenshotEvidence {
                captured: true,
                path: Some(path),
                error: None,
            })
        }
        .await;
        result.unwrap_or_else(|e| self.capture_failed("screenshot", e, ScreenshotEvidence::failed))
    }

    async fn capture_dom_snapshot(
        &self,
        session: &dyn PageSession,
        dir: &Path,
    ) -> DomSnapshotEvidence {
        let result: Result<DomSnapshotEvidence> = async {
            let html = session.dom_html().await?;
            let path = dir.join(DOM_SNAPSHOT_FILE);
            fs::write(&path, &html).await?;
            Ok(DomSnapshotEvidence {
                captured: true,
                path: Some(path),
                size_bytes: Some(html.len()),
                error: None,
            })
        }
        .await;
        result.unwrap_or_else(|e| self.capture_failed("dom_snapshot", e, DomSnapshotEvidence::failed))
    }

    async fn capture_console_errors(&self, dir: &Path) -> ConsoleErrorsEvidence {
        let entries = self.signals.console_errors().await;
        let result: Result<ConsoleErrorsEvidence> = async {
            let path = dir.join(CONSOLE_ERRORS_FILE);
            fs::write(&path, serde_json::to_vec_pretty(&entries)?).await?;
            Ok(ConsoleErrorsEvidence {
                captured: true,
                count: entries.len(),
                entries: entries.clone(),
                path: Some(path),
                error: None,
            })
        }
        .await;
        result
            .unwrap_or_else(|e| self.capture_failed("console_errors", e, ConsoleErrorsEvidence::failed))
    }

    async fn capture_network_failures(&self, dir: &Path) -> NetworkFailuresEvidence {
        let entries = self.signals.network_failures().await;
        let result: Result<NetworkFailuresEvidence> = async {
            let path = dir.join(NETWORK_FAILURES_FILE);
            fs::write(&path, serde_json::to_vec_pretty(&entries)?).await?;
            Ok(NetworkFailuresEvidence {
                captured: true,
                count: entries.len(),
                entries: entries.clone(),
                path: Some(path),
                error: None,
            })
        }
        .await;
        result.unwrap_or_else(|e| {
            self.capture_failed("network_failures", e, NetworkFailuresEvidence::failed)
        })
    }

    async fn capture_performance(
        &self,
        session: &dyn PageSession,
        dir: &Path,
    ) -> PerformanceMetricsEvidence {
        let result: Result<PerformanceMetricsEvidence> = async {
            let metrics = session.performance_metrics().await?;
            let path = dir.join(PERFORMANCE_FILE);
            fs::write(&path, serde_json::to_vec_pretty(&metrics)?).await?;
            Ok(PerformanceMetricsEvidence {
                captured: true,
                metrics: Some(metrics),
                path: Some(path),
                error: None,
            })
        }
        .await;
        result.unwrap_or_else(|e| {
            self.capture_failed("performance", e, PerformanceMetricsEvidence::failed)
        })
    }

    async fn capture_storage_state(
        &self,
        session: &dyn PageSession,
        dir: &Path,
    ) -> StorageStateEvidence {
        let result: Result<StorageStateEvidence> = async {
            let state = session.storage_state().await?;
            let path = dir.join(STORAGE_STATE_FILE);
            fs::write(&path, serde_json::to_vec_pretty(&state)?).await?;
            Ok(StorageStateEvidence {
                captured: true,
                path: Some(path),
                error: None,
            })
        }
        .await;
        result.unwrap_or_else(|e| self.capture_failed("storage_state", e, StorageStateEvidence::failed))
    }

    async fn capture_accessibility(
        &self,
        session: &dyn PageSession,
        dir: &Path,
    ) -> AccessibilityEvidence {
        let result: Result<AccessibilityEvidence> = async {
            let html = session.dom_html().await?;
            let issues = audit::audit_dom(&html);
            let path = dir.join(ACCESSIBILITY_FILE);
            fs::write(&path, serde_json::to_vec_pretty(&issues)?).await?;
            Ok(AccessibilityEvidence {
                captured: true,
                issues,
                path: Some(path),
                error: None,
            })
        }
        .await;
        result.unwrap_or_else(|e| self.capture_failed("accessibility", e, AccessibilityEvidence::failed))
    }

    fn capture_failed<T>(
        &self,
        category: &str,
        error: anyhow::Error,
        failed: impl FnOnce(String) -> T,
    ) -> T {
        self.metrics.inc_capture_errors();
        warn!(category, error = %error, "Evidence capture failed");
        failed(error.to_string())
    }
}

/// Build a filesystem-safe bundle id from the failure timestamp and test
/// name: lowercase, non-alphanumerics collapsed to single dashes, truncated.
fn bundle_id(test_name: &str) -> String {
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S%.3fZ");
    format!("{timestamp}-{}", sanitize_name(test_name))
}

fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
        if out.len() >= MAX_NAME_LEN {
            break;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PerformanceMetrics;
    use crate::session::PageEvent;
    use async_trait::async_trait;
    use tokio::sync::broadcast;

    struct MockSession {
        url: String,
        tx: broadcast::Sender<PageEvent>,
        fail_screenshot: bool,
        html: String,
    }

    impl MockSession {
        fn new() -> Self {
            let (tx, _) = broadcast::channel(64);
            Self {
                url: "https://app.test/checkout".to_string(),
                tx,
                fail_screenshot: false,
                html: "<html><body><h1>Checkout</h1></body></html>".to_string(),
            }
        }
    }

    #[async_trait]
    impl PageSession for MockSession {
        fn url(&self) -> String {
            self.url.clone()
        }

        fn events(&self) -> broadcast::Receiver<PageEvent> {
            self.tx.subscribe()
        }

        async fn capture_screenshot(&self) -> anyhow::Result<Vec<u8>> {
            if self.fail_screenshot {
                anyhow::bail!("page crashed before screenshot");
            }
            Ok(vec![0x89, b'P', b'N', b'G'])
        }

        async fn dom_html(&self) -> anyhow::Result<String> {
            Ok(self.html.clone())
        }

        async fn performance_metrics(&self) -> anyhow::Result<PerformanceMetrics> {
            Ok(PerformanceMetrics {
                first_contentful_paint_ms: Some(812.0),
                ..Default::default()
            })
        }

        async fn storage_state(&self) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::json!({ "localStorage": { "cart": "3 items" } }))
        }
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Login Test #3 (retry!)"), "login-test-3-retry");
        assert_eq!(sanitize_name("---"), "");
        let long = "x".repeat(200);
        assert!(sanitize_name(&long).len() <= MAX_NAME_LEN);
    }

    #[tokio::test]
    async fn test_collect_writes_all_files_and_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let collector = EvidenceCollector::new(tmp.path());
        let session = MockSession::new();
        let failure = FailureInfo::new("checkout flow", "Timeout 30000ms exceeded");

        let bundle = collector.collect(&session, &failure).await.unwrap();

        assert_eq!(bundle.captured_count(), 7);
        assert!(bundle.id.ends_with("checkout-flow"));
        for file in [
            MANIFEST_FILE,
            SCREENSHOT_FILE,
            DOM_SNAPSHOT_FILE,
            CONSOLE_ERRORS_FILE,
            NETWORK_FAILURES_FILE,
            PERFORMANCE_FILE,
            STORAGE_STATE_FILE,
            ACCESSIBILITY_FILE,
        ] {
            assert!(bundle.dir.join(file).exists(), "missing {file}");
        }
    }

    #[tokio::test]
    async fn test_collect_survives_screenshot_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let collector = EvidenceCollector::new(tmp.path());
        let mut session = MockSession::new();
        session.fail_screenshot = true;
        let failure = FailureInfo::new("login", "element not found");

        let bundle = collector.collect(&session, &failure).await.unwrap();

        assert!(!bundle.screenshot.captured);
        assert!(bundle.screenshot.error.is_some());
        assert_eq!(bundle.captured_count(), 6);
        // Manifest still records the partial bundle.
        let manifest = std::fs::read_to_string(bundle.dir.join(MANIFEST_FILE)).unwrap();
        let parsed: EvidenceBundle = serde_json::from_str(&manifest).unwrap();
        assert!(!parsed.screenshot.captured);
        assert!(parsed.dom_snapshot.captured);
    }

    #[tokio::test]
    async fn test_collect_includes_observed_signals() {
        let tmp = tempfile::tempdir().unwrap();
        let collector = EvidenceCollector::new(tmp.path());
        let session = MockSession::new();
        let handle = collector.attach(&session);

        session
            .tx
            .send(PageEvent::Console {
                level: crate::models::ConsoleLevel::Error,
                text: "TypeError: cart is undefined".to_string(),
                location: None,
                timestamp_ms: now_ms(),
            })
            .unwrap();
        session
            .tx
            .send(PageEvent::Response {
                url: "https://api.test/cart".to_string(),
                status: 500,
                status_text: "Internal Server Error".to_string(),
                timestamp_ms: now_ms(),
            })
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let failure = FailureInfo::new("cart total", "expected 3, got 0");
        let bundle = collector.collect(&session, &failure).await.unwrap();
        handle.abort();

        assert_eq!(bundle.console_errors.count, 1);
        assert_eq!(bundle.network_failures.count, 1);
        assert_eq!(bundle.network_failures.entries[0].status, Some(500));
    }

    #[tokio::test]
    async fn test_capture_error_writes_record_and_screenshot() {
        let tmp = tempfile::tempdir().unwrap();
        let collector = EvidenceCollector::new(tmp.path());
        let session = MockSession::new();

        let dir = collector
            .capture_error(&session, "browser disconnected")
            .await
            .unwrap();

        let record: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.join(ERROR_MANIFEST_FILE)).unwrap()).unwrap();
        assert_eq!(record["error"], "browser disconnected");
        assert!(dir.join(ERROR_SCREENSHOT_FILE).exists());
    }
}
