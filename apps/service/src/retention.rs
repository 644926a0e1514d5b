//! Automatic retention and cleanup of ping history.
//!
//! The engine never deletes records; this background task prunes history
//! older than the configured number of days, once an hour.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::database::LibsqlStore;

const CLEANUP_PERIOD: Duration = Duration::from_secs(3600);

/// How long ping records are kept
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Days to keep ping history, 0 disables pruning
    pub ping_history_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { ping_history_days: 30 }
    }
}

impl RetentionPolicy {
    /// Get retention duration, `None` when pruning is disabled
    fn retention(&self) -> Option<chrono::Duration> {
        (self.ping_history_days > 0).then(|| chrono::Duration::days(self.ping_history_days as i64))
    }
}

/// Cleanup manager for expired ping history
pub struct RetentionCleanup {
    store: Arc<LibsqlStore>,
    policy: RetentionPolicy,
}

impl RetentionCleanup {
    /// Create a new retention cleanup manager
    pub fn new(store: Arc<LibsqlStore>, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    /// Delete every ping older than the retention window
    pub async fn cleanup_expired_pings(&self) -> Result<u64> {
        let Some(retention) = self.policy.retention() else {
            debug!("Ping history retention disabled");
            return Ok(0);
        };

        let cutoff = Utc::now() - retention;
        let deleted = self.store.prune_pings_before(cutoff).await?;
        info!("Retention cleanup completed: {} ping records deleted", deleted);
        Ok(deleted)
    }

    /// Start background cleanup task (runs every hour)
    pub fn start_periodic_cleanup(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_PERIOD);

            loop {
                interval.tick().await;

                if let Err(e) = self.cleanup_expired_pings().await {
                    warn!("Periodic ping history cleanup failed: {}", e);
                }
            }
        })
    }
}
