//! Resource guard: timeout/retry/circuit-breaker supervisor
//!
//! Bounds the cost of running arbitrary asynchronous test actions and tells
//! the host when global limits are exceeded. The guard is an explicitly
//! constructed service object: it holds no global state, registers no signal
//! handlers, and never exits the process itself. Emergency conditions are
//! broadcast to the host, which owns process lifecycle.

mod breaker;
mod limits;
mod monitor;

pub use breaker::{BreakerState, CircuitBreaker, DEFAULT_COOLDOWN, DEFAULT_FAILURE_THRESHOLD};
pub use limits::{LimitCheck, MemoryProbe, ResourceLimits, ResourceStats};

use crate::error::GuardError;
use crate::observability::SentinelMetrics;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Backoff ceiling between retry attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Background monitor tick.
const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(5);

/// Consecutive memory warnings tolerated before an emergency.
const MEMORY_WARNING_LIMIT: u32 = 3;

/// Why the guard declared an emergency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmergencyReason {
    /// Wall-clock runtime exceeded the configured ceiling.
    RunTimeExceeded { elapsed_secs: u64, limit_secs: u64 },
    /// Process memory stayed above the ceiling for consecutive checks.
    MemoryExceeded { rss_mb: u64, limit_mb: u64 },
    /// The circuit breaker opened; the host should stop scheduling tests.
    CircuitBreakerTripped { failures: u32 },
}

impl std::fmt::Display for EmergencyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmergencyReason::RunTimeExceeded {
                elapsed_secs,
                limit_secs,
            } => write!(f, "run time {elapsed_secs}s exceeded limit {limit_secs}s"),
            EmergencyReason::MemoryExceeded { rss_mb, limit_mb } => {
                write!(f, "memory {rss_mb}MB exceeded limit {limit_mb}MB")
            }
            EmergencyReason::CircuitBreakerTripped { failures } => {
                write!(f, "circuit breaker tripped after {failures} failures")
            }
        }
    }
}

/// Explicit shutdown signal shared between the guard and its host.
///
/// The host constructs one, passes it to the guard, and wires its own signal
/// handling to `trigger`. The guard triggers it only on hard resource
/// breaches.
#[derive(Debug, Clone)]
pub struct ShutdownController {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Supervisor wrapping every test action in timeouts, retries and a shared
/// circuit breaker, with hard ceilings on wall-clock runtime and memory.
pub struct ResourceGuard {
    limits: ResourceLimits,
    stats: Mutex<ResourceStats>,
    breaker: Mutex<CircuitBreaker>,
    probe: MemoryProbe,
    started_at: Instant,
    monitor_interval: Duration,
    shutdown: ShutdownController,
    terminated: AtomicBool,
    emergency_tx: broadcast::Sender<EmergencyReason>,
    metrics: SentinelMetrics,
}

impl ResourceGuard {
    pub fn new(limits: ResourceLimits, shutdown: ShutdownController) -> Self {
        let (emergency_tx, _rx) = broadcast::channel(16);
        let breaker = CircuitBreaker::new(limits.failure_threshold, limits.breaker_cooldown);
        Self {
            limits,
            stats: Mutex::new(ResourceStats::default()),
            breaker: Mutex::new(breaker),
            probe: MemoryProbe::new(),
            started_at: Instant::now(),
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            shutdown,
            terminated: AtomicBool::new(false),
            emergency_tx,
            metrics: SentinelMetrics::new(),
        }
    }

    /// Replace the memory probe (for testing).
    pub fn with_probe(mut self, probe: MemoryProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Override the monitor tick (for testing).
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    /// Subscribe to emergency notifications. The host decides whether an
    /// emergency ends the process.
    pub fn subscribe_emergency(&self) -> broadcast::Receiver<EmergencyReason> {
        self.emergency_tx.subscribe()
    }

    /// Race `operation` against a timer. On expiry the guard stops waiting;
    /// the operation's side effects are not cancelled and the caller is
    /// responsible for detaching from a session that keeps running.
    pub async fn with_timeout<T, F>(
        &self,
        operation: F,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<T, GuardError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let limit = timeout.unwrap_or(self.limits.default_timeout);
        let start = Instant::now();

        let result = match tokio::time::timeout(limit, operation).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(GuardError::Operation {
                operation: name.to_string(),
                source: e,
            }),
            Err(_) => {
                warn!(
                    operation = %name,
                    timeout_ms = limit.as_millis() as u64,
                    "Operation timed out"
                );
                Err(GuardError::Timeout {
                    operation: name.to_string(),
                    timeout_ms: limit.as_millis() as u64,
                })
            }
        };

        self.metrics
            .observe_operation_latency(start.elapsed().as_secs_f64());
        result
    }

    /// Invoke `operation` up to `max_retries` times with exponential backoff
    /// between attempts. Retries run strictly sequentially. On exhausting all
    /// attempts, records a circuit-breaker failure and returns the last error.
    pub async fn with_retry<T, Fut, F>(
        &self,
        mut operation: F,
        name: &str,
        max_retries: Option<u32>,
    ) -> Result<T, GuardError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if !self.can_proceed().await {
            return Err(GuardError::CircuitOpen {
                operation: name.to_string(),
            });
        }

        let max_attempts = max_retries.unwrap_or(self.limits.max_retries).max(1);
        self.stats.lock().await.tests_run += 1;

        let mut last_error = None;
        for attempt in 1..=max_attempts {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            operation = %name,
                            attempt,
                            "Operation recovered after retry"
                        );
                    }
                    self.record_breaker_success().await;
                    return Ok(value);
                }
                Err(e) => {
                    warn!(
                        operation = %name,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Operation attempt failed"
                    );
                    last_error = Some(e);

                    if attempt < max_attempts {
                        self.stats.lock().await.retries_used += 1;
                        self.metrics.inc_retries();

                        let delay = backoff_delay(attempt);
                        debug!(
                            operation = %name,
                            delay_ms = delay.as_millis() as u64,
                            "Backing off before retry"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        self.record_breaker_failure().await;
        Err(GuardError::RetriesExhausted {
            operation: name.to_string(),
            attempts: max_attempts,
            source: last_error.unwrap_or_else(|| anyhow::anyhow!("operation never attempted")),
        })
    }

    /// False whenever the circuit breaker is open.
    pub async fn can_proceed(&self) -> bool {
        self.breaker.lock().await.can_proceed()
    }

    /// Record a breaker failure. A trip is broadcast as an emergency; the
    /// breaker itself keeps cycling so a cooled-down probe can close it.
    pub async fn record_breaker_failure(&self) {
        let tripped = {
            let mut breaker = self.breaker.lock().await;
            let was_open = breaker.state() == BreakerState::Open;
            breaker.record_failure();
            let now_open = breaker.state() == BreakerState::Open;
            (!was_open && now_open).then(|| breaker.failures())
        };

        if let Some(failures) = tripped {
            self.metrics.inc_breaker_trips();
            self.metrics.set_breaker_state(BreakerState::Open);
            self.log_final_stats().await;
            let _ = self
                .emergency_tx
                .send(EmergencyReason::CircuitBreakerTripped { failures });
        }
    }

    /// Record a breaker success: resets the failure counter and closes a
    /// half-open breaker.
    pub async fn record_breaker_success(&self) {
        let mut breaker = self.breaker.lock().await;
        breaker.record_success();
        self.metrics.set_breaker_state(breaker.state());
    }

    /// Current breaker state snapshot.
    pub async fn breaker_state(&self) -> BreakerState {
        self.breaker.lock().await.state()
    }

    /// Whether another self-repair attempt fits the healing budget.
    pub async fn can_attempt_healing(&self) -> bool {
        self.stats.lock().await.healing_attempts < self.limits.max_healing_attempts
    }

    pub async fn record_healing_attempt(&self) {
        let mut stats = self.stats.lock().await;
        stats.healing_attempts += 1;
        debug!(
            healing_attempts = stats.healing_attempts,
            limit = self.limits.max_healing_attempts,
            "Healing attempt recorded"
        );
    }

    /// Snapshot of usage counters.
    pub async fn stats(&self) -> ResourceStats {
        self.stats.lock().await.clone()
    }

    /// Named boolean snapshot over every limit, for health-check polling.
    /// The retry budget is a global allowance of ten times the per-operation
    /// budget.
    pub async fn is_within_limits(&self) -> LimitCheck {
        let stats = self.stats.lock().await.clone();
        let rss_mb = self.probe.process_rss_mb().await;

        LimitCheck {
            within_run_time: self.started_at.elapsed() < self.limits.max_run_time,
            within_memory: rss_mb <= self.limits.max_memory_mb,
            within_retry_budget: stats.retries_used < u64::from(self.limits.max_retries) * 10,
            within_healing_budget: stats.healing_attempts < self.limits.max_healing_attempts,
            breaker_closed: self.can_proceed().await,
        }
    }

    /// Pre-flight check of host resources. Fails fast when available memory
    /// is below the configured floor; passes when the host does not expose
    /// the probe (avoids false negatives in constrained CI).
    pub async fn validate_environment(&self) -> Result<(), GuardError> {
        match self.probe.available_memory_mb().await {
            Some(mb) if mb < self.limits.min_available_memory_mb => {
                Err(GuardError::Environment(format!(
                    "available memory {mb}MB below {}MB floor",
                    self.limits.min_available_memory_mb
                )))
            }
            Some(mb) => {
                debug!(available_mb = mb, "Environment validated");
                Ok(())
            }
            None => {
                warn!("Cannot read available memory, skipping pre-flight check");
                Ok(())
            }
        }
    }

    /// Graceful shutdown: log final statistics and stop the monitor.
    pub async fn shutdown(&self) {
        self.log_final_stats().await;
        self.shutdown.trigger();
    }

    /// Terminal transition for hard resource breaches: logs final stats,
    /// broadcasts the reason and triggers the shutdown signal. Idempotent.
    /// The host process exits; the library never does.
    pub(crate) async fn emergency_shutdown(&self, reason: EmergencyReason) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        error!(reason = %reason, "Emergency shutdown");
        self.log_final_stats().await;
        let _ = self.emergency_tx.send(reason);
        self.shutdown.trigger();
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Structured final-statistics block, emitted on shutdown and emergency.
    pub async fn log_final_stats(&self) {
        let stats = self.stats.lock().await.clone();
        let breaker = self.breaker.lock().await;
        info!(
            event = "final_stats",
            tests_run = stats.tests_run,
            retries_used = stats.retries_used,
            healing_attempts = stats.healing_attempts,
            resource_warnings = stats.resource_warnings,
            elapsed_secs = self.started_at.elapsed().as_secs(),
            breaker_state = ?breaker.state(),
            breaker_failures = breaker.failures(),
            "Guard final statistics"
        );
    }

    pub(crate) fn probe(&self) -> &MemoryProbe {
        &self.probe
    }

    pub(crate) fn started_at(&self) -> Instant {
        self.started_at
    }

    pub(crate) fn monitor_interval(&self) -> Duration {
        self.monitor_interval
    }

    pub(crate) async fn check_breaker_cooldown(&self) {
        let mut breaker = self.breaker.lock().await;
        breaker.check_cooldown();
        self.metrics.set_breaker_state(breaker.state());
    }

    pub(crate) async fn record_resource_warning(&self) -> u32 {
        let mut stats = self.stats.lock().await;
        stats.resource_warnings += 1;
        self.metrics.inc_resource_warnings();
        stats.resource_warnings
    }

    pub(crate) const fn memory_warning_limit() -> u32 {
        MEMORY_WARNING_LIMIT
    }
}

/// Exponential backoff: `min(1000 * 2^(attempt-1), 10000)` milliseconds.
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    let millis = 1000u64.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(20));
    Duration::from_millis(millis).min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn test_guard(limits: ResourceLimits) -> ResourceGuard {
        ResourceGuard::new(limits, ShutdownController::new())
    }

    #[test]
    fn test_backoff_is_monotonic_and_capped() {
        assert_eq!(backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(3), Duration::from_millis(4000));
        assert_eq!(backoff_delay(4), Duration::from_millis(8000));
        assert_eq!(backoff_delay(5), Duration::from_millis(10_000));
        assert_eq!(backoff_delay(12), Duration::from_millis(10_000));

        for attempt in 1..10 {
            assert!(backoff_delay(attempt + 1) >= backoff_delay(attempt));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_exhausts_attempts() {
        let guard = test_guard(ResourceLimits::default());
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = guard
            .with_retry(
                || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Err(anyhow::anyhow!("always fails")) }
                },
                "doomed",
                Some(3),
            )
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        match result {
            Err(GuardError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }

        // Two backoff sleeps for three attempts: retries_used counts them.
        assert_eq!(guard.stats().await.retries_used, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_recovers() {
        let guard = test_guard(ResourceLimits::default());
        let attempts = AtomicU32::new(0);

        let result = guard
            .with_retry(
                || {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Err(anyhow::anyhow!("transient"))
                        } else {
                            Ok(42)
                        }
                    }
                },
                "flaky",
                Some(3),
            )
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        // Success resets the breaker failure counter.
        assert_eq!(guard.breaker_state().await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let guard = test_guard(ResourceLimits::default());

        let result: Result<(), _> = guard
            .with_timeout(
                async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                },
                "slow-click",
                Some(Duration::from_millis(10)),
            )
            .await;

        match result {
            Err(GuardError::Timeout {
                operation,
                timeout_ms,
            }) => {
                assert_eq!(operation, "slow-click");
                assert_eq!(timeout_ms, 10);
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let guard = test_guard(ResourceLimits::default());
        let result = guard
            .with_timeout(async { Ok("done") }, "fast", None)
            .await;
        assert_eq!(result.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_breaker_trip_blocks_and_notifies() {
        let guard = test_guard(ResourceLimits::default());
        let mut emergencies = guard.subscribe_emergency();

        for _ in 0..5 {
            guard.record_breaker_failure().await;
        }

        assert!(!guard.can_proceed().await);
        assert_eq!(guard.breaker_state().await, BreakerState::Open);

        match emergencies.try_recv() {
            Ok(EmergencyReason::CircuitBreakerTripped { failures }) => assert_eq!(failures, 5),
            other => panic!("expected trip notification, got {other:?}"),
        }

        // Open breaker refuses new retry operations outright.
        let result: Result<(), _> = guard
            .with_retry(|| async { Ok(()) }, "blocked", None)
            .await;
        assert!(matches!(result, Err(GuardError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn test_breaker_cycle_open_half_open_closed() {
        let limits = ResourceLimits {
            failure_threshold: 5,
            breaker_cooldown: Duration::from_millis(0),
            ..Default::default()
        };
        let guard = test_guard(limits);

        for _ in 0..5 {
            guard.record_breaker_failure().await;
        }
        assert!(!guard.can_proceed().await);

        guard.check_breaker_cooldown().await;
        assert_eq!(guard.breaker_state().await, BreakerState::HalfOpen);

        guard.record_breaker_success().await;
        assert_eq!(guard.breaker_state().await, BreakerState::Closed);
        assert!(guard.can_proceed().await);
    }

    #[tokio::test]
    async fn test_healing_budget() {
        let guard = test_guard(ResourceLimits::default());

        assert!(guard.can_attempt_healing().await);
        guard.record_healing_attempt().await;
        assert!(guard.can_attempt_healing().await);
        guard.record_healing_attempt().await;
        assert!(!guard.can_attempt_healing().await);
    }

    #[tokio::test]
    async fn test_is_within_limits_fresh_guard() {
        let guard = test_guard(ResourceLimits::default());
        let check = guard.is_within_limits().await;
        assert!(check.all_ok());
    }

    #[tokio::test]
    async fn test_validate_environment_floor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("meminfo"), "MemAvailable:  16384 kB\n").unwrap();

        let guard = test_guard(ResourceLimits::default())
            .with_probe(MemoryProbe::with_proc_path(dir.path()));

        // 16 MB available is below the 32 MB floor.
        let result = guard.validate_environment().await;
        assert!(matches!(result, Err(GuardError::Environment(_))));
    }

    #[tokio::test]
    async fn test_validate_environment_unreadable_passes() {
        let dir = tempfile::tempdir().unwrap();
        let guard = test_guard(ResourceLimits::default())
            .with_probe(MemoryProbe::with_proc_path(dir.path()));
        assert!(guard.validate_environment().await.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_triggers_controller() {
        let shutdown = ShutdownController::new();
        let guard = ResourceGuard::new(ResourceLimits::default(), shutdown.clone());

        assert!(!shutdown.is_triggered());
        guard.shutdown().await;
        assert!(shutdown.is_triggered());
    }
}
