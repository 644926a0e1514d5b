use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::storage::MetricsStore;
use crate::storage::models::{PingRecord, Service, ServiceStatus};

/// Persists observations and keeps each service's current status in sync
pub struct MetricsRecorder {
    store: Arc<dyn MetricsStore>,
}

impl MetricsRecorder {
    pub fn new(store: Arc<dyn MetricsStore>) -> Self {
        Self { store }
    }

    /// Append a ping record, then move the service to `status`
    ///
    /// The status update is only attempted once the record that justifies it
    /// has been written.
    pub async fn record(
        &self,
        service: &Service,
        status: ServiceStatus,
        latency_ms: u64,
        observed_at: DateTime<Utc>,
    ) -> Result<PingRecord, StorageError> {
        let record = PingRecord::observe(service, status, latency_ms, observed_at);

        self.store.append_ping(&record).await?;
        self.store.update_status(service.id, status).await?;

        Ok(record)
    }
}
