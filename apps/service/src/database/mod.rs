/// Database layer
///
/// libsql-backed implementation of the engine's registry and metrics store,
/// plus the registry management operations used by the CLI.
pub mod migrations;
pub mod repository;

pub use repository::LibsqlStore;

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
