use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use deadpool::managed::Object;
use libsql::{Row, params};

use downdetector::{
    MetricsStore, PingRecord, Service, ServiceId, ServiceRegistry, ServiceStatus, SortOrder,
    StorageError,
};

use crate::pool::{LibsqlManager, LibsqlPool};

const SERVICE_COLUMNS: &str = "id, owner_id, guild_id, name, url, status, created_at";

/// libsql implementation of the service registry and metrics store
pub struct LibsqlStore {
    pool: LibsqlPool,
}

impl LibsqlStore {
    /// Create a new store from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<Object<LibsqlManager>, StorageError> {
        self.pool.get().await.map_err(StorageError::unavailable)
    }

    /// Register a service; it starts as `unknown`
    pub async fn create_service(
        &self,
        owner_id: &str,
        guild_id: Option<u64>,
        name: &str,
        url: &str,
    ) -> Result<Service, StorageError> {
        let conn = self.get_conn().await?;

        let mut rows = conn
            .query(
                "SELECT 1 FROM services WHERE owner_id = ? AND name = ?",
                params![owner_id, name],
            )
            .await
            .map_err(StorageError::unavailable)?;
        if rows.next().await.map_err(StorageError::unavailable)?.is_some() {
            return Err(StorageError::Conflict { owner_id: owner_id.to_string(), name: name.to_string() });
        }

        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO services (owner_id, guild_id, name, url, status, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                owner_id,
                guild_id.map(|g| g as i64),
                name,
                url,
                ServiceStatus::Unknown.as_str(),
                created_at.timestamp_millis()
            ],
        )
        .await
        .map_err(StorageError::unavailable)?;

        Ok(Service {
            id: conn.last_insert_rowid(),
            owner_id: owner_id.to_string(),
            guild_id,
            name: name.to_string(),
            url: url.to_string(),
            status: ServiceStatus::Unknown,
            created_at: from_millis(created_at.timestamp_millis()),
        })
    }

    /// Delete an owner's service by name, keeping its history
    pub async fn delete_service(&self, owner_id: &str, name: &str) -> Result<bool, StorageError> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute("DELETE FROM services WHERE owner_id = ? AND name = ?", params![owner_id, name])
            .await
            .map_err(StorageError::unavailable)?;
        Ok(deleted > 0)
    }

    /// Services registered by one owner
    pub async fn list_services_for_owner(&self, owner_id: &str) -> Result<Vec<Service>, StorageError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {} FROM services WHERE owner_id = ? ORDER BY id", SERVICE_COLUMNS),
                params![owner_id],
            )
            .await
            .map_err(StorageError::unavailable)?;

        let mut services = Vec::new();
        while let Some(row) = rows.next().await.map_err(StorageError::unavailable)? {
            services.push(service_from_row(&row)?);
        }
        Ok(services)
    }

    /// Delete ping records older than `cutoff`, returning how many went
    pub async fn prune_pings_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let conn = self.get_conn().await?;
        conn.execute(
            "DELETE FROM ping_history WHERE created_at < ?",
            params![cutoff.timestamp_millis()],
        )
        .await
        .map_err(StorageError::unavailable)
    }
}

#[async_trait]
impl ServiceRegistry for LibsqlStore {
    async fn list_services(&self) -> Result<Vec<Service>, StorageError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(&format!("SELECT {} FROM services ORDER BY id", SERVICE_COLUMNS), ())
            .await
            .map_err(StorageError::unavailable)?;

        let mut services = Vec::new();
        while let Some(row) = rows.next().await.map_err(StorageError::unavailable)? {
            services.push(service_from_row(&row)?);
        }
        Ok(services)
    }

    async fn get_service(&self, id: ServiceId) -> Result<Option<Service>, StorageError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(&format!("SELECT {} FROM services WHERE id = ?", SERVICE_COLUMNS), params![id])
            .await
            .map_err(StorageError::unavailable)?;

        match rows.next().await.map_err(StorageError::unavailable)? {
            Some(row) => Ok(Some(service_from_row(&row)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl MetricsStore for LibsqlStore {
    async fn append_ping(&self, record: &PingRecord) -> Result<(), StorageError> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO ping_history (service_id, owner_id, service_name, status, latency_ms, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                record.service_id,
                record.owner_id.clone(),
                record.service_name.clone(),
                record.status.as_str(),
                record.latency_ms as i64,
                record.created_at.timestamp_millis()
            ],
        )
        .await
        .map_err(StorageError::unavailable)?;
        Ok(())
    }

    async fn update_status(&self, id: ServiceId, status: ServiceStatus) -> Result<(), StorageError> {
        let conn = self.get_conn().await?;
        conn.execute("UPDATE services SET status = ? WHERE id = ?", params![status.as_str(), id])
            .await
            .map_err(StorageError::unavailable)?;
        Ok(())
    }

    async fn list_pings(
        &self,
        id: ServiceId,
        limit: usize,
        order: SortOrder,
    ) -> Result<Vec<PingRecord>, StorageError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT service_id, owner_id, service_name, status, latency_ms, created_at FROM ping_history WHERE service_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
                params![id, limit as i64],
            )
            .await
            .map_err(StorageError::unavailable)?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await.map_err(StorageError::unavailable)? {
            let status: String = row.get(3).map_err(StorageError::unavailable)?;
            records.push(PingRecord {
                service_id: row.get(0).map_err(StorageError::unavailable)?,
                owner_id: row.get(1).map_err(StorageError::unavailable)?,
                service_name: row.get(2).map_err(StorageError::unavailable)?,
                status: status.parse()?,
                latency_ms: row.get::<i64>(4).map_err(StorageError::unavailable)?.max(0) as u64,
                created_at: from_millis(row.get(5).map_err(StorageError::unavailable)?),
            });
        }

        if order == SortOrder::Ascending {
            records.reverse();
        }
        Ok(records)
    }
}

fn service_from_row(row: &Row) -> Result<Service, StorageError> {
    let status: String = row.get(5).map_err(StorageError::unavailable)?;
    Ok(Service {
        id: row.get(0).map_err(StorageError::unavailable)?,
        owner_id: row.get(1).map_err(StorageError::unavailable)?,
        guild_id: row.get::<Option<i64>>(2).map_err(StorageError::unavailable)?.map(|g| g as u64),
        name: row.get(3).map_err(StorageError::unavailable)?,
        url: row.get(4).map_err(StorageError::unavailable)?,
        status: status.parse()?,
        created_at: from_millis(row.get(6).map_err(StorageError::unavailable)?),
    })
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}
