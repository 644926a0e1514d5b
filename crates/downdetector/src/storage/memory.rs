use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::models::{PingRecord, Service, ServiceId, ServiceStatus};
use super::{MetricsStore, ServiceRegistry, SortOrder};
use crate::error::StorageError;

#[derive(Debug, Default)]
struct Inner {
    next_id: ServiceId,
    services: BTreeMap<ServiceId, Service>,
    pings: Vec<PingRecord>,
}

/// In-memory registry and metrics store
///
/// Services are listed in id order. Useful for tests and for running the
/// engine without a database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new service with `unknown` status
    pub async fn create_service(
        &self,
        owner_id: &str,
        guild_id: Option<u64>,
        name: &str,
        url: &str,
    ) -> Result<Service, StorageError> {
        let mut inner = self.inner.write().await;

        if inner.services.values().any(|s| s.owner_id == owner_id && s.name == name) {
            return Err(StorageError::Conflict {
                owner_id: owner_id.to_string(),
                name: name.to_string(),
            });
        }

        inner.next_id += 1;
        let service = Service {
            id: inner.next_id,
            owner_id: owner_id.to_string(),
            guild_id,
            name: name.to_string(),
            url: url.to_string(),
            status: ServiceStatus::Unknown,
            created_at: Utc::now(),
        };
        inner.services.insert(service.id, service.clone());
        Ok(service)
    }

    /// Remove a service; its ping history is kept
    pub async fn delete_service(&self, id: ServiceId) -> bool {
        self.inner.write().await.services.remove(&id).is_some()
    }

    /// Every ping ever appended, in append order
    pub async fn all_pings(&self) -> Vec<PingRecord> {
        self.inner.read().await.pings.clone()
    }
}

#[async_trait]
impl ServiceRegistry for MemoryStore {
    async fn list_services(&self) -> Result<Vec<Service>, StorageError> {
        Ok(self.inner.read().await.services.values().cloned().collect())
    }

    async fn get_service(&self, id: ServiceId) -> Result<Option<Service>, StorageError> {
        Ok(self.inner.read().await.services.get(&id).cloned())
    }
}

#[async_trait]
impl MetricsStore for MemoryStore {
    async fn append_ping(&self, record: &PingRecord) -> Result<(), StorageError> {
        self.inner.write().await.pings.push(record.clone());
        Ok(())
    }

    async fn update_status(&self, id: ServiceId, status: ServiceStatus) -> Result<(), StorageError> {
        // A service deleted mid-run simply has nothing left to update
        if let Some(service) = self.inner.write().await.services.get_mut(&id) {
            service.status = status;
        }
        Ok(())
    }

    async fn list_pings(
        &self,
        id: ServiceId,
        limit: usize,
        order: SortOrder,
    ) -> Result<Vec<PingRecord>, StorageError> {
        let inner = self.inner.read().await;

        // Append order is also created_at order for a single service
        let mut window: Vec<PingRecord> = inner
            .pings
            .iter()
            .rev()
            .filter(|p| p.service_id == id)
            .take(limit)
            .cloned()
            .collect();

        if order == SortOrder::Ascending {
            window.reverse();
        }
        Ok(window)
    }
}
