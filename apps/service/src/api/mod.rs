//! HTTP control surface of the daemon

use std::sync::Arc;

use downdetector::{MetricsStore, Scheduler};

mod error;
mod routes;

pub use error::ApiError;
pub use routes::routes;

/// Shared state handed to every handler
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub metrics: Arc<dyn MetricsStore>,
    /// Sentinel latency of failed probes, excluded from stats on request
    pub probe_timeout_ms: u64,
}
