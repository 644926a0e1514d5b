use thiserror::Error;

use crate::storage::models::ServiceId;

/// Boxed error coming out of a storage or transport backend
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure of the registry or metrics store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(#[source] BoxError),

    #[error("stored record is malformed: {0}")]
    Corrupt(String),

    #[error("a service named '{name}' already exists for owner {owner_id}")]
    Conflict { owner_id: String, name: String },
}

impl StorageError {
    /// Wrap any backend error as an availability failure
    pub fn unavailable(err: impl Into<BoxError>) -> Self {
        Self::Unavailable(err.into())
    }
}

/// Rejected configuration value
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("interval must be between {min} and {max} seconds, got {got}")]
    IntervalOutOfRange { got: u64, min: u64, max: u64 },

    #[error("probe timeout must be greater than zero")]
    ZeroTimeout,

    #[error("at least one concurrent probe must be allowed")]
    ZeroConcurrency,
}

/// Notification could not be handed to any destination
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("service has no notification destination")]
    NoDestination,

    #[error("none of the {attempted} destinations accepted the message")]
    AllDestinationsRejected { attempted: usize },

    #[error("failed to list destinations: {0}")]
    Lookup(#[source] BoxError),

    #[error("delivery failed: {0}")]
    Delivery(#[source] BoxError),
}

/// Errors surfaced synchronously to engine callers
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("service {0} not found")]
    NotFound(ServiceId),

    #[error("caller {caller} does not own service {service_id}")]
    Unauthorized { caller: String, service_id: ServiceId },

    #[error("run aborted: {0}")]
    RunAborted(String),
}
