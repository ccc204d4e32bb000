//! Resource limits, usage counters and host memory probes
//!
//! Limits are immutable configuration for one guard instance. Stats are
//! mutable counters reset only at guard construction. Memory probes read the
//! proc filesystem and degrade to zero where it is unavailable.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

use super::breaker::{DEFAULT_COOLDOWN, DEFAULT_FAILURE_THRESHOLD};

/// Immutable resource ceilings for one guard instance.
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Wall-clock ceiling for the whole run.
    pub max_run_time: Duration,
    /// Process RSS ceiling in megabytes.
    pub max_memory_mb: u64,
    /// Default retry budget for `with_retry`.
    pub max_retries: u32,
    /// Cap on self-repair attempts, independent of retries.
    pub max_healing_attempts: u32,
    /// Default per-operation timeout for `with_timeout`.
    pub default_timeout: Duration,
    /// Circuit breaker failure threshold.
    pub failure_threshold: u32,
    /// Circuit breaker cooldown before probing.
    pub breaker_cooldown: Duration,
    /// Minimal available host memory for `validate_environment`. Deliberately
    /// low to avoid false negatives in constrained CI.
    pub min_available_memory_mb: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_run_time: Duration::from_secs(30 * 60),
            max_memory_mb: 2048,
            max_retries: 3,
            max_healing_attempts: 2,
            default_timeout: Duration::from_secs(30),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            breaker_cooldown: DEFAULT_COOLDOWN,
            min_available_memory_mb: 32,
        }
    }
}

/// Mutable usage counters for one guard instance.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceStats {
    pub tests_run: u64,
    pub retries_used: u64,
    pub healing_attempts: u32,
    pub resource_warnings: u32,
}

/// Named boolean snapshot over every limit, for health-check style polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitCheck {
    pub within_run_time: bool,
    pub within_memory: bool,
    pub within_retry_budget: bool,
    pub within_healing_budget: bool,
    pub breaker_closed: bool,
}

impl LimitCheck {
    pub fn all_ok(&self) -> bool {
        self.within_run_time
            && self.within_memory
            && self.within_retry_budget
            && self.within_healing_budget
            && self.breaker_closed
    }
}

/// Memory probe over the proc filesystem.
#[derive(Debug, Clone)]
pub struct MemoryProbe {
    proc_path: PathBuf,
}

impl MemoryProbe {
    pub fn new() -> Self {
        Self {
            proc_path: PathBuf::from("/proc"),
        }
    }

    /// Probe with a custom proc path (for testing).
    pub fn with_proc_path(proc_path: impl Into<PathBuf>) -> Self {
        Self {
            proc_path: proc_path.into(),
        }
    }

    /// Current process resident set size in MB. Zero when unreadable
    /// (non-Linux hosts).
    pub async fn process_rss_mb(&self) -> u64 {
        match fs::read_to_string(self.proc_path.join("self/status")).await {
            Ok(content) => Self::parse_status_kb(&content, "VmRSS:") / 1024,
            Err(_) => 0,
        }
    }

    /// Available host memory in MB. None when unreadable.
    pub async fn available_memory_mb(&self) -> Option<u64> {
        let content = fs::read_to_string(self.proc_path.join("meminfo")).await.ok()?;
        let kb = Self::parse_status_kb(&content, "MemAvailable:");
        if kb == 0 {
            None
        } else {
            Some(kb / 1024)
        }
    }

    /// Parse a `<key>  <value> kB` line out of a proc status-style file.
    pub fn parse_status_kb(content: &str, key: &str) -> u64 {
        for line in content.lines() {
            if let Some(rest) = line.strip_prefix(key) {
                let parts: Vec<&str> = rest.split_whitespace().collect();
                if let Some(value) = parts.first() {
                    return value.parse().unwrap_or(0);
                }
            }
        }
        0
    }
}

impl Default for MemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}
