//! Sentinel configuration

use anyhow::Result;
use serde::Deserialize;
use sentinel_lib::ResourceLimits;
use std::time::Duration;
use tracing::warn;

/// Sentinel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SentinelConfig {
    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Base directory for evidence bundles
    #[serde(default = "default_evidence_dir")]
    pub evidence_dir: String,

    /// Wall-clock ceiling for the whole run, in seconds
    #[serde(default = "default_max_run_time_secs")]
    pub max_run_time_secs: u64,

    /// Process RSS ceiling in megabytes
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: u64,

    /// Retry budget per guarded operation
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Self-repair attempt budget
    #[serde(default = "default_max_healing_attempts")]
    pub max_healing_attempts: u32,

    /// Default per-operation timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Background resource check interval in seconds
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
}

fn default_api_port() -> u16 {
    8080
}

fn default_evidence_dir() -> String {
    "./evidence".to_string()
}

fn default_max_run_time_secs() -> u64 {
    30 * 60
}

fn default_max_memory_mb() -> u64 {
    2048
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_healing_attempts() -> u32 {
    2
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_monitor_interval_secs() -> u64 {
    5
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            evidence_dir: default_evidence_dir(),
            max_run_time_secs: default_max_run_time_secs(),
            max_memory_mb: default_max_memory_mb(),
            max_retries: default_max_retries(),
            max_healing_attempts: default_max_healing_attempts(),
            default_timeout_ms: default_timeout_ms(),
            monitor_interval_secs: default_monitor_interval_secs(),
        }
    }
}

impl SentinelConfig {
    /// Load configuration from the environment (`SENTINEL_*` variables).
    /// Malformed values fall back to defaults with a warning.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("SENTINEL"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|e| {
            warn!(error = %e, "Invalid SENTINEL_* configuration, using defaults");
            Self::default()
        }))
    }

    /// Resource ceilings derived from this configuration.
    pub fn limits(&self) -> ResourceLimits {
        ResourceLimits {
            max_run_time: Duration::from_secs(self.max_run_time_secs),
            max_memory_mb: self.max_memory_mb,
            max_retries: self.max_retries,
            max_healing_attempts: self.max_healing_attempts,
            default_timeout: Duration::from_millis(self.default_timeout_ms),
            ..ResourceLimits::default()
        }
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
}
