//! Derived read API over a window of ping history.
//!
//! Nothing here is stored: every figure is computed from the records the
//! metrics store returns.

use serde::Serialize;

use crate::error::StorageError;
use crate::storage::models::{PingRecord, ServiceId, ServiceStatus};
use crate::storage::{MetricsStore, SortOrder};

/// Latency figures over a window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencySummary {
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    /// Records that contributed to the figures
    pub samples: usize,
}

/// Uptime and latency of one service over its most recent pings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowStats {
    pub service_id: ServiceId,
    pub samples: usize,
    /// `None` when the window is empty
    pub uptime_percent: Option<f64>,
    pub latency: Option<LatencySummary>,
}

/// `100 * online / total`, `None` for an empty window
pub fn uptime_percent(pings: &[PingRecord]) -> Option<f64> {
    if pings.is_empty() {
        return None;
    }
    let online = pings.iter().filter(|p| p.status == ServiceStatus::Online).count();
    Some(100.0 * online as f64 / pings.len() as f64)
}

/// Average, min and max latency
///
/// With `exclude_sentinel`, records carrying exactly that latency (failed
/// probes) are left out.
pub fn latency_summary(pings: &[PingRecord], exclude_sentinel: Option<u64>) -> Option<LatencySummary> {
    let latencies: Vec<u64> = pings
        .iter()
        .map(|p| p.latency_ms)
        .filter(|latency| exclude_sentinel != Some(*latency))
        .collect();

    let min_ms = *latencies.iter().min()?;
    let max_ms = *latencies.iter().max()?;
    let total: u64 = latencies.iter().sum();

    Some(LatencySummary {
        avg_ms: total as f64 / latencies.len() as f64,
        min_ms,
        max_ms,
        samples: latencies.len(),
    })
}

/// Load the latest `limit` pings of a service and summarise them
pub async fn window_stats(
    store: &dyn MetricsStore,
    id: ServiceId,
    limit: usize,
    exclude_sentinel: Option<u64>,
) -> Result<WindowStats, StorageError> {
    let pings = store.list_pings(id, limit, SortOrder::Descending).await?;
    Ok(WindowStats {
        service_id: id,
        samples: pings.len(),
        uptime_percent: uptime_percent(&pings),
        latency: latency_summary(&pings, exclude_sentinel),
    })
}
