//! Circuit breaker state machine
//!
//! Three states: `Closed` (normal), `Open` (failures reached the threshold,
//! all attempts refused), `HalfOpen` (cooldown elapsed, one probe admitted).
//! The breaker cycles for the lifetime of the guard; there is no terminal
//! state here.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Default failure threshold before the breaker opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default cooldown before an open breaker admits a probe.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker shared by every operation under one guard.
#[derive(Debug)]
pub struct CircuitBreaker {
    failures: u32,
    threshold: u32,
    cooldown: Duration,
    state: BreakerState,
    last_failure: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            failures: 0,
            threshold,
            cooldown,
            state: BreakerState::Closed,
            last_failure: None,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Whether further operations are admitted.
    pub fn can_proceed(&self) -> bool {
        self.state != BreakerState::Open
    }

    /// Record a failure. Once the counter reaches the threshold the breaker
    /// opens; a failure in `HalfOpen` re-opens immediately.
    pub fn record_failure(&mut self) {
        self.failures += 1;
        self.last_failure = Some(Instant::now());

        let should_open = match self.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => self.failures >= self.threshold,
            BreakerState::Open => false,
        };

        if should_open {
            warn!(
                failures = self.failures,
                threshold = self.threshold,
                "Circuit breaker opened"
            );
            self.state = BreakerState::Open;
        }
    }

    /// Record a success: reset the failure counter and close a half-open
    /// breaker.
    pub fn record_success(&mut self) {
        self.failures = 0;
        if self.state == BreakerState::HalfOpen {
            info!("Circuit breaker closed after successful probe");
            self.state = BreakerState::Closed;
        }
    }

    /// Transition `Open -> HalfOpen` once the cooldown has elapsed since the
    /// last failure. Called by the guard's background monitor.
    pub fn check_cooldown(&mut self) {
        if self.state != BreakerState::Open {
            return;
        }
        let elapsed = match self.last_failure {
            Some(t) => t.elapsed(),
            None => return,
        };
        if elapsed >= self.cooldown {
            info!(
                cooldown_secs = self.cooldown.as_secs(),
                "Circuit breaker cooldown elapsed, admitting probe"
            );
            self.state = BreakerState::HalfOpen;
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN)
    }
}
