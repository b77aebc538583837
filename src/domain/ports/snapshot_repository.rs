use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::RemoteSnapshot;

/// Repository trait for durable storage of finalized snapshots
///
/// The coordinator writes one snapshot per finalized round and reads the
/// latest one back on restart.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Persist a finalized snapshot
    ///
    /// Saving the same round twice keeps the first write.
    async fn save(&self, snapshot: &RemoteSnapshot) -> DomainResult<()>;

    /// Latest finalized snapshot, if any round has been persisted
    async fn latest(&self) -> DomainResult<Option<RemoteSnapshot>>;
}
