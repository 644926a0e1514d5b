use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::{DEFAULT_INTERVAL_SECS, DEFAULT_PROBE_TIMEOUT_MS, MAX_INTERVAL_SECS, MIN_INTERVAL_SECS};

/// Tunables of the monitoring engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between two scheduled runs
    pub interval_seconds: u64,

    /// Per-probe timeout in milliseconds
    pub probe_timeout_ms: u64,

    /// Upper bound of probes in flight during one run
    pub max_concurrent_probes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_INTERVAL_SECS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            max_concurrent_probes: 16,
        }
    }
}

impl EngineConfig {
    /// Check every field against its allowed range
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_interval(self.interval_seconds)?;
        if self.probe_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.max_concurrent_probes == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Reject intervals outside [`MIN_INTERVAL_SECS`, `MAX_INTERVAL_SECS`]
pub fn validate_interval(seconds: u64) -> Result<(), ConfigError> {
    if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&seconds) {
        return Err(ConfigError::IntervalOutOfRange {
            got: seconds,
            min: MIN_INTERVAL_SECS,
            max: MAX_INTERVAL_SECS,
        });
    }
    Ok(())
}
