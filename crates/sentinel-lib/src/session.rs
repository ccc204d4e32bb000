//! Page session boundary
//!
//! The sentinel consumes, but does not implement, a browser page session.
//! The driver adapter implements [`PageSession`] and forwards live page
//! events over a broadcast channel. Test code uses a mock implementation.

use crate::models::{ConsoleLevel, PerformanceMetrics};
use anyhow::Result;
use tokio::sync::broadcast;

pub use async_trait::async_trait;

/// A live signal emitted by the page session.
#[derive(Debug, Clone)]
pub enum PageEvent {
    /// A console message of any level.
    Console {
        level: ConsoleLevel,
        text: String,
        location: Option<String>,
        timestamp_ms: i64,
    },
    /// An uncaught exception on the page.
    PageError { message: String, timestamp_ms: i64 },
    /// An HTTP response; the sentinel records those with status >= 400.
    Response {
        url: String,
        status: u16,
        status_text: String,
        timestamp_ms: i64,
    },
    /// A request that failed at the network level (aborted, blocked, DNS).
    RequestFailed {
        url: String,
        reason: String,
        timestamp_ms: i64,
    },
}

/// Boundary trait over the browser-automation driver's page handle.
///
/// Capture methods are best-effort: implementations return an error when the
/// page has crashed or the session is gone, and the caller degrades.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Current page URL.
    fn url(&self) -> String;

    /// Subscribe to the live event stream for this page.
    fn events(&self) -> broadcast::Receiver<PageEvent>;

    /// Capture a full-page screenshot as PNG bytes.
    async fn capture_screenshot(&self) -> Result<Vec<u8>>;

    /// Serialize the DOM with stylesheet rules inlined and scripts stripped.
    async fn dom_html(&self) -> Result<String>;

    /// Navigation, paint and memory timings for the current page.
    async fn performance_metrics(&self) -> Result<PerformanceMetrics>;

    /// Cookie and local/session storage state as JSON.
    async fn storage_state(&self) -> Result<serde_json::Value>;
}
