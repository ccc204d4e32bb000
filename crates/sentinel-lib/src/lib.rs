//! Sentinel library for supervised UI test execution
//!
//! This crate provides the core functionality for:
//! - Resource-guarded operation execution (timeouts, retries, circuit breaker)
//! - Runtime and memory ceilings with background monitoring
//! - Page health scoring from console, network, performance and
//!   accessibility signals
//! - Forensic evidence collection on test failure
//! - Heuristic failure classification

pub mod audit;
pub mod classify;
pub mod error;
pub mod evidence;
pub mod guard;
pub mod health;
pub mod models;
pub mod observability;
pub mod session;
pub mod signals;

pub use classify::{Classification, FailureClassifier, FailureType, FullClassification};
pub use error::GuardError;
pub use evidence::{EvidenceBundle, EvidenceCollector};
pub use guard::{EmergencyReason, ResourceGuard, ResourceLimits, ShutdownController};
pub use health::{PageHealthReport, PageHealthScorer};
pub use models::*;
pub use observability::SentinelMetrics;
pub use session::{PageEvent, PageSession};
pub use signals::SignalLog;
