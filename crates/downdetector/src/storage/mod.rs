/// Storage contracts consumed by the engine
///
/// The engine only sees these two traits; the technology behind them
/// (in-memory map, libsql, a remote REST store) is up to the caller.
pub mod memory;
pub mod models;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::StorageError;
use models::{PingRecord, Service, ServiceId, ServiceStatus};

/// Ordering of a ping history window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Oldest first
    Ascending,
    /// Newest first
    #[default]
    Descending,
}

/// Read access to the set of monitored services
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Get every registered service
    async fn list_services(&self) -> Result<Vec<Service>, StorageError>;

    /// Get one service, `None` if the id is unknown
    async fn get_service(&self, id: ServiceId) -> Result<Option<Service>, StorageError>;
}

/// Ping history and current status persistence
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Append an immutable ping record
    async fn append_ping(&self, record: &PingRecord) -> Result<(), StorageError>;

    /// Overwrite the current status of a service
    async fn update_status(&self, id: ServiceId, status: ServiceStatus) -> Result<(), StorageError>;

    /// Get the `limit` most recent records of a service, sorted by `order`
    async fn list_pings(
        &self,
        id: ServiceId,
        limit: usize,
        order: SortOrder,
    ) -> Result<Vec<PingRecord>, StorageError>;
}
