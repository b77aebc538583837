//! SQLite persistence for finalized coordinator rounds.

pub mod connection;
pub mod migrations;
pub mod snapshot_repository;

pub use connection::{create_pool, create_test_pool, ConnectionError, PoolConfig};
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use snapshot_repository::SqliteSnapshotRepository;

use chrono::{DateTime, Utc};

use crate::domain::errors::{DomainError, DomainResult};

/// Parse an RFC3339 datetime string from a SQLite row field.
pub fn parse_datetime(s: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map_err(|e| DomainError::SerializationError(e.to_string()))
        .map(|dt| dt.with_timezone(&Utc))
}

/// Open the database at `database_url` and bring its schema up to date.
pub async fn open_snapshot_repository(database_url: &str) -> anyhow::Result<SqliteSnapshotRepository> {
    let pool = create_pool(database_url, None).await?;
    Migrator::new(pool.clone())
        .run(&all_embedded_migrations())
        .await?;
    Ok(SqliteSnapshotRepository::new(pool))
}
