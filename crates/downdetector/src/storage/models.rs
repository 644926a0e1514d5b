use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Registry-assigned identifier of a service
pub type ServiceId = i64;

/// Reachability of a service as last classified by a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Online,
    Down,
    /// Never probed yet
    Unknown,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Online => "online",
            ServiceStatus::Down => "down",
            ServiceStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(ServiceStatus::Online),
            "down" => Ok(ServiceStatus::Down),
            "unknown" => Ok(ServiceStatus::Unknown),
            other => Err(StorageError::Corrupt(format!("unknown service status '{}'", other))),
        }
    }
}

/// A registered endpoint under health monitoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub owner_id: String,
    /// Notification group; `None` or `Some(0)` means ungrouped
    pub guild_id: Option<u64>,
    pub name: String,
    pub url: String,
    pub status: ServiceStatus,
    pub created_at: DateTime<Utc>,
}

impl Service {
    /// Group the service notifies, if any
    pub fn group(&self) -> Option<u64> {
        self.guild_id.filter(|id| *id != 0)
    }
}

/// Immutable observation of one probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRecord {
    pub service_id: ServiceId,
    pub owner_id: String,
    /// Name at observation time, kept even if the service is renamed or deleted
    pub service_name: String,
    pub status: ServiceStatus,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl PingRecord {
    /// Snapshot a service together with a probe observation
    pub fn observe(
        service: &Service,
        status: ServiceStatus,
        latency_ms: u64,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            service_id: service.id,
            owner_id: service.owner_id.clone(),
            service_name: service.name.clone(),
            status,
            latency_ms,
            created_at: observed_at,
        }
    }
}
