use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::NotifyError;
use crate::storage::models::{Service, ServiceStatus};

/// A detected status change worth announcing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionEvent {
    pub service: Service,
    pub previous: ServiceStatus,
    pub current: ServiceStatus,
    pub latency_ms: u64,
    pub observed_at: DateTime<Utc>,
}

impl TransitionEvent {
    /// Human-readable announcement
    pub fn message(&self) -> String {
        let emoji = if self.current == ServiceStatus::Online { "🟢" } else { "🔴" };
        format!(
            "{} **{}** is now **{}** ({} → {}, {} ms)",
            emoji,
            self.service.name,
            self.current.as_str().to_uppercase(),
            self.previous,
            self.current,
            self.latency_ms
        )
    }
}

/// One place a message can be delivered to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Destination {
    pub id: String,
    pub label: String,
}

/// Delivery mechanism behind the notifier
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Candidate destinations for a service, in the order they should be tried
    async fn destinations(&self, service: &Service) -> Result<Vec<Destination>, NotifyError>;

    /// Hand a message to one destination
    async fn deliver(&self, destination: &Destination, message: &str) -> Result<(), NotifyError>;
}

/// Delivers each event to the first destination that accepts it
pub struct Notifier {
    transport: Arc<dyn NotificationTransport>,
}

impl Notifier {
    pub fn new(transport: Arc<dyn NotificationTransport>) -> Self {
        Self { transport }
    }

    /// Try destinations in order and stop at the first success
    ///
    /// Returns the destination that took the message. Nothing is retried.
    pub async fn notify(&self, event: &TransitionEvent) -> Result<Destination, NotifyError> {
        let candidates = self.transport.destinations(&event.service).await?;
        if candidates.is_empty() {
            return Err(NotifyError::NoDestination);
        }

        let message = event.message();
        for destination in &candidates {
            match self.transport.deliver(destination, &message).await {
                Ok(()) => {
                    debug!("Notified {} about {}", destination.label, event.service.name);
                    return Ok(destination.clone());
                }
                Err(e) => {
                    debug!("Destination {} rejected notification: {}", destination.label, e);
                }
            }
        }

        Err(NotifyError::AllDestinationsRejected { attempted: candidates.len() })
    }
}

/// Transport that writes announcements to the log
///
/// Used when no chat integration is configured.
#[derive(Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    async fn destinations(&self, _service: &Service) -> Result<Vec<Destination>, NotifyError> {
        Ok(vec![Destination { id: "log".to_string(), label: "log".to_string() }])
    }

    async fn deliver(&self, _destination: &Destination, message: &str) -> Result<(), NotifyError> {
        info!("{}", message);
        Ok(())
    }
}

/// Log a failed notification; delivery failures never fail a run
pub(crate) fn log_notify_failure(service: &Service, error: &NotifyError) {
    match error {
        NotifyError::NoDestination => {
            debug!("No notification destination for service {}", service.name)
        }
        other => warn!("Notification for service {} dropped: {}", service.name, other),
    }
}
