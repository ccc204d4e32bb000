//! Shared signal capture from the page event stream
//!
//! Both the page health scorer and the evidence collector consume the same
//! console/network observations. [`SignalLog`] owns the accumulation: an
//! ordered, append-only log of failure signals with no deduplication.

use crate::models::{ConsoleError, ConsoleLevel, NetworkFailure};
use crate::session::{PageEvent, PageSession};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

/// One recorded failure signal.
#[derive(Debug, Clone)]
pub enum Observation {
    Console(ConsoleError),
    Network(NetworkFailure),
}

impl Observation {
    pub fn timestamp_ms(&self) -> i64 {
        match self {
            Observation::Console(e) => e.timestamp_ms,
            Observation::Network(f) => f.timestamp_ms,
        }
    }
}

/// Ordered log of console/network failure signals for one attached page.
#[derive(Debug, Clone, Default)]
pub struct SignalLog {
    observations: Arc<RwLock<Vec<Observation>>>,
}

impl SignalLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the session's event stream into this log until the session
    /// closes. Returns the handle of the spawned listener task.
    pub fn attach(&self, session: &dyn PageSession) -> JoinHandle<()> {
        let mut rx = session.events();
        let observations = Arc::clone(&self.observations);
        let url = session.url();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Some(obs) = Self::observation_from(event) {
                            observations.write().await.push(obs);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        debug!(url = %url, missed, "Signal listener lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Map a page event to a recorded observation, filtering non-signals.
    fn observation_from(event: PageEvent) -> Option<Observation> {
        match event {
            PageEvent::Console {
                level,
                text,
                location,
                timestamp_ms,
            } if level.is_signal() => Some(Observation::Console(ConsoleError {
                level,
                text,
                location,
                timestamp_ms,
            })),
            PageEvent::Console { .. } => None,
            PageEvent::PageError {
                message,
                timestamp_ms,
            } => Some(Observation::Console(ConsoleError {
                level: ConsoleLevel::Error,
                text: message,
                location: None,
                timestamp_ms,
            })),
            PageEvent::Response {
                url,
                status,
                status_text,
                timestamp_ms,
            } if status >= 400 => Some(Observation::Network(NetworkFailure {
                url,
                status: Some(status),
                status_text: Some(status_text),
                failure_reason: None,
                timestamp_ms,
            })),
            PageEvent::Response { .. } => None,
            PageEvent::RequestFailed {
                url,
                reason,
                timestamp_ms,
            } => Some(Observation::Network(NetworkFailure {
                url,
                status: None,
                status_text: None,
                failure_reason: Some(reason),
                timestamp_ms,
            })),
        }
    }

    /// Record an observation directly. Test and adapter escape hatch.
    pub async fn push(&self, observation: Observation) {
        self.observations.write().await.push(observation);
    }

    /// All console errors observed so far, in arrival order.
    pub async fn console_errors(&self) -> Vec<ConsoleError> {
        self.observations
            .read()
            .await
            .iter()
            .filter_map(|o| match o {
                Observation::Console(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    /// All network failures observed so far, in arrival order.
    pub async fn network_failures(&self) -> Vec<NetworkFailure> {
        self.observations
            .read()
            .await
            .iter()
            .filter_map(|o| match o {
                Observation::Network(f) => Some(f.clone()),
                _ => None,
            })
            .collect()
    }

    /// Console errors observed at or after `since_ms`.
    pub async fn recent_console_errors(&self, since_ms: i64) -> Vec<ConsoleError> {
        self.console_errors()
            .await
            .into_iter()
            .filter(|e| e.timestamp_ms >= since_ms)
            .collect()
    }

    /// Network failures observed at or after `since_ms`.
    pub async fn recent_network_failures(&self, since_ms: i64) -> Vec<NetworkFailure> {
        self.network_failures()
            .await
            .into_iter()
            .filter(|f| f.timestamp_ms >= since_ms)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.observations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.observations.read().await.is_empty()
    }

    /// Clear the log so one attached instance can score successive pages.
    pub async fn reset(&self) {
        self.observations.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::now_ms;

    fn console_event(level: ConsoleLevel, text: &str) -> PageEvent {
        PageEvent::Console {
            level,
            text: text.to_string(),
            location: None,
            timestamp_ms: now_ms(),
        }
    }

    #[tokio::test]
    async fn test_signal_filtering() {
        assert!(SignalLog::observation_from(console_event(ConsoleLevel::Log, "noise")).is_none());
        assert!(SignalLog::observation_from(console_event(ConsoleLevel::Info, "noise")).is_none());
        assert!(
            SignalLog::observation_from(console_event(ConsoleLevel::Error, "boom")).is_some()
        );
        assert!(
            SignalLog::observation_from(console_event(ConsoleLevel::Warning, "careful")).is_some()
        );
    }

    #[tokio::test]
    async fn test_response_status_filtering() {
        let ok = PageEvent::Response {
            url: "https://app.test/api".to_string(),
            status: 200,
            status_text: "OK".to_string(),
            timestamp_ms: now_ms(),
        };
        assert!(SignalLog::observation_from(ok).is_none());

        let failed = PageEvent::Response {
            url: "https://app.test/api".to_string(),
            status: 500,
            status_text: "Internal Server Error".to_string(),
            timestamp_ms: now_ms(),
        };
        match SignalLog::observation_from(failed) {
            Some(Observation::Network(f)) => assert_eq!(f.status, Some(500)),
            other => panic!("expected network observation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_page_error_recorded_as_console_error() {
        let event = PageEvent::PageError {
            message: "Uncaught TypeError: x is undefined".to_string(),
            timestamp_ms: now_ms(),
        };
        match SignalLog::observation_from(event) {
            Some(Observation::Console(e)) => {
                assert_eq!(e.level, ConsoleLevel::Error);
                assert!(e.text.contains("TypeError"));
            }
            other => panic!("expected console observation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_recency_filter_and_reset() {
        let log = SignalLog::new();
        let now = now_ms();

        log.push(Observation::Console(ConsoleError {
            level: ConsoleLevel::Error,
            text: "old".to_string(),
            location: None,
            timestamp_ms: now - 60_000,
        }))
        .await;
        log.push(Observation::Console(ConsoleError {
            level: ConsoleLevel::Error,
            text: "fresh".to_string(),
            location: None,
            timestamp_ms: now,
        }))
        .await;

        let recent = log.recent_console_errors(now - 5_000).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].text, "fresh");
        assert_eq!(log.console_errors().await.len(), 2);

        log.reset().await;
        assert!(log.is_empty().await);
    }
}
