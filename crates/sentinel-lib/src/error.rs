//! Typed errors for the resource guard

use thiserror::Error;

/// Errors surfaced by guarded operations.
#[derive(Debug, Error)]
pub enum GuardError {
    /// The timer won the race against the wrapped operation. The operation's
    /// side effects are not cancelled; the guard only stops waiting.
    #[error("operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The circuit breaker is open and no further attempts are admitted.
    #[error("circuit breaker open, refusing operation '{operation}'")]
    CircuitOpen { operation: String },

    /// All retry attempts were exhausted; carries the final attempt's error.
    #[error("operation '{operation}' failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// The wrapped operation failed inside a timeout without retries.
    #[error("operation '{operation}' failed: {source}")]
    Operation {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    /// Pre-flight host resource check failed.
    #[error("environment check failed: {0}")]
    Environment(String),
}
