//! SQLite implementation of the SnapshotRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::parse_datetime;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{RemoteSnapshot, RoundSummary};
use crate::domain::ports::SnapshotRepository;
use crate::services::snapshotter::{decode_document, encode_document};

#[derive(Clone)]
pub struct SqliteSnapshotRepository {
    pool: SqlitePool,
}

impl SqliteSnapshotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of persisted rounds.
    pub async fn count(&self) -> DomainResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM round_snapshots")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

#[async_trait]
impl SnapshotRepository for SqliteSnapshotRepository {
    async fn save(&self, snapshot: &RemoteSnapshot) -> DomainResult<()> {
        let document_json = String::from_utf8(encode_document(&snapshot.document)?)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let round_number = i64::try_from(snapshot.summary.round_number)
            .map_err(|e| DomainError::DatabaseError(format!("round number out of range: {e}")))?;

        sqlx::query(
            r#"INSERT OR IGNORE INTO round_snapshots (round_number, contributor_count, finalized_at, document_json)
               VALUES (?, ?, ?, ?)"#,
        )
        .bind(round_number)
        .bind(i64::from(snapshot.summary.contributor_count))
        .bind(snapshot.summary.finalized_at.to_rfc3339())
        .bind(&document_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest(&self) -> DomainResult<Option<RemoteSnapshot>> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            "SELECT round_number, contributor_count, finalized_at, document_json FROM round_snapshots ORDER BY round_number DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    round_number: i64,
    contributor_count: i64,
    finalized_at: String,
    document_json: String,
}

impl TryFrom<SnapshotRow> for RemoteSnapshot {
    type Error = DomainError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        let out_of_range =
            |field: &str| DomainError::DatabaseError(format!("{field} out of range in round_snapshots"));
        Ok(Self {
            summary: RoundSummary {
                round_number: u64::try_from(row.round_number)
                    .map_err(|_| out_of_range("round_number"))?,
                contributor_count: u32::try_from(row.contributor_count)
                    .map_err(|_| out_of_range("contributor_count"))?,
                finalized_at: parse_datetime(&row.finalized_at)?,
            },
            document: decode_document(row.document_json.as_bytes())?,
        })
    }
}
