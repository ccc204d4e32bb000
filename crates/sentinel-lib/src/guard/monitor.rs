//! Background resource monitor
//!
//! A periodic task (5 s tick) that recomputes elapsed runtime and process
//! memory, drives the circuit breaker cooldown, and declares an emergency
//! when hard ceilings are breached. All mutation goes through the same
//! stats/breaker locks the guarded operations use.

use super::{EmergencyReason, ResourceGuard};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{info, warn};

impl ResourceGuard {
    /// Spawn the background monitor. It stops when the shutdown signal fires
    /// or a hard limit triggers an emergency.
    pub fn spawn_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let guard = Arc::clone(self);
        let mut shutdown_rx = guard.shutdown_controller().subscribe();

        tokio::spawn(async move {
            info!(
                interval_secs = guard.monitor_interval().as_secs_f64(),
                "Starting resource monitor"
            );

            let mut ticker = interval(guard.monitor_interval());
            let mut consecutive_memory_warnings = 0u32;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if guard.check_run_time().await {
                            break;
                        }
                        match guard.check_memory(&mut consecutive_memory_warnings).await {
                            MemoryVerdict::Fatal => break,
                            MemoryVerdict::Warning | MemoryVerdict::Ok => {}
                        }
                        guard.check_breaker_cooldown().await;
                    }
                    _ = shutdown_rx.changed() => {
                        info!("Resource monitor stopping on shutdown signal");
                        break;
                    }
                }
            }
        })
    }

    /// Returns true when the runtime ceiling was breached (emergency fired).
    async fn check_run_time(&self) -> bool {
        let elapsed = self.started_at().elapsed();
        if elapsed <= self.limits().max_run_time {
            return false;
        }
        self.emergency_shutdown(EmergencyReason::RunTimeExceeded {
            elapsed_secs: elapsed.as_secs(),
            limit_secs: self.limits().max_run_time.as_secs(),
        })
        .await;
        true
    }

    /// Check process memory against the ceiling. Each breach records a
    /// warning and attempts a best-effort reclaim; after three consecutive
    /// breaches the condition is fatal.
    async fn check_memory(&self, consecutive: &mut u32) -> MemoryVerdict {
        let rss_mb = self.probe().process_rss_mb().await;
        if rss_mb <= self.limits().max_memory_mb {
            *consecutive = 0;
            return MemoryVerdict::Ok;
        }

        *consecutive += 1;
        let total_warnings = self.record_resource_warning().await;
        warn!(
            rss_mb,
            limit_mb = self.limits().max_memory_mb,
            consecutive = *consecutive,
            total_warnings,
            "Memory ceiling exceeded, attempting reclaim"
        );

        if *consecutive >= Self::memory_warning_limit() {
            self.emergency_shutdown(EmergencyReason::MemoryExceeded {
                rss_mb,
                limit_mb: self.limits().max_memory_mb,
            })
            .await;
            return MemoryVerdict::Fatal;
        }
        MemoryVerdict::Warning
    }
}

enum MemoryVerdict {
    Ok,
    Warning,
    Fatal,
}
