use std::fmt;

use serde::{Deserialize, Serialize};

use crate::storage::models::ServiceStatus;

/// Why a probe did not complete normally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum ProbeFailure {
    /// No response within the probe timeout
    Timeout,
    /// Connection, DNS, TLS or malformed URL
    Network(String),
}

/// Outcome of one probe
///
/// `status` is never `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub status: ServiceStatus,
    pub latency_ms: u64,
    /// HTTP status code, if a response arrived
    pub status_code: Option<u16>,
    pub failure: Option<ProbeFailure>,
}

impl ProbeResult {
    /// A response arrived; only 200 counts as online
    pub fn responded(status_code: u16, latency_ms: u64) -> Self {
        let status = if status_code == 200 { ServiceStatus::Online } else { ServiceStatus::Down };
        Self { status, latency_ms, status_code: Some(status_code), failure: None }
    }

    /// No usable response; `sentinel_ms` stands in for the latency
    pub fn failed(failure: ProbeFailure, sentinel_ms: u64) -> Self {
        Self {
            status: ServiceStatus::Down,
            latency_ms: sentinel_ms,
            status_code: None,
            failure: Some(failure),
        }
    }
}

/// Stage of the run currently holding the run lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Idle,
    Fetching,
    Probing,
    Recording,
    Notifying,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::Fetching => "fetching",
            RunPhase::Probing => "probing",
            RunPhase::Recording => "recording",
            RunPhase::Notifying => "notifying",
        };
        f.write_str(name)
    }
}
