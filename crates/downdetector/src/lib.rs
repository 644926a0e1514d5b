//! Downdetector - health monitoring engine
//!
//! Periodically probes registered HTTP services, records their latency and
//! status history, and notifies the service's group when reachability changes.

pub mod config;
pub mod error;
pub mod monitoring;
pub mod stats;
pub mod storage;

// Re-export main types
pub use config::EngineConfig;
pub use error::{ConfigError, EngineError, NotifyError, StorageError};
pub use monitoring::{Engine, RunPhase, RunReport, Scheduler, ServiceOutcome};
pub use storage::models::{PingRecord, Service, ServiceId, ServiceStatus};
pub use storage::{MemoryStore, MetricsStore, ServiceRegistry, SortOrder};

/// Lower bound for the probing interval, in seconds
pub const MIN_INTERVAL_SECS: u64 = 10;

/// Upper bound for the probing interval, in seconds
pub const MAX_INTERVAL_SECS: u64 = 3600;

/// Interval used until the operator configures another one
pub const DEFAULT_INTERVAL_SECS: u64 = 300;

/// Per-probe timeout, also the sentinel latency of failed probes
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5000;
