//! Pull-merge-push transport over a shared versioned repository.
//!
//! The repository holds the global aggregate as three files written together
//! in one commit: `tactics.json`, `behaviors.json` and `metadata.json`. A
//! push that loses a race against another contributor restarts the whole
//! cycle from a fresh pull; nothing is ever force-pushed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use super::retry::RetryPolicy;
use crate::domain::errors::DomainError;
use crate::domain::models::{
    AggregateDocument, RemoteSnapshot, RoundSummary, StatFamily, TransportKind,
};
use crate::domain::ports::{
    PublishOutcome, RepositoryBackend, SyncTransport, TransportError, UploadReceipt,
};
use crate::services::merge::merge_documents;
use crate::services::snapshotter::{decode_entries, encode_entries};

pub const TACTICS_FILE: &str = "tactics.json";
pub const BEHAVIORS_FILE: &str = "behaviors.json";
pub const METADATA_FILE: &str = "metadata.json";

/// Contents of `metadata.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    pub last_update: DateTime<Utc>,
    /// Incremented by every push; used as the snapshot's round number.
    pub revision: u64,
    pub tactics_count: usize,
    pub behaviors_count: usize,
    /// Sum of attempts across both families.
    pub data_points: u64,
    /// Number of contributions folded into the files.
    #[serde(default)]
    pub contributions: u32,
}

impl RepositoryMetadata {
    fn describe(document: &AggregateDocument, revision: u64) -> Self {
        Self {
            last_update: document.produced_at,
            revision,
            tactics_count: document.tactics.len(),
            behaviors_count: document.behaviors.len(),
            data_points: document.total_attempts(),
            contributions: document.contributor_count,
        }
    }
}

/// [`SyncTransport`] over a [`RepositoryBackend`].
pub struct RepositoryTransport {
    backend: Arc<dyn RepositoryBackend>,
    retry_policy: RetryPolicy,
    /// One checkout, one cycle at a time.
    cycle_lock: Mutex<()>,
}

impl RepositoryTransport {
    pub fn new(backend: Arc<dyn RepositoryBackend>, retry_policy: RetryPolicy) -> Self {
        Self {
            backend,
            retry_policy,
            cycle_lock: Mutex::new(()),
        }
    }

    async fn pull(&self) -> Result<(), TransportError> {
        self.backend.ensure_checkout().await?;
        self.backend.sync_to_remote().await
    }

    /// Read the global aggregate from the checkout.
    async fn read_remote(&self) -> Result<Option<RemoteSnapshot>, TransportError> {
        let tactics = self.backend.read_file(TACTICS_FILE).await?;
        let behaviors = self.backend.read_file(BEHAVIORS_FILE).await?;
        let metadata = self.backend.read_file(METADATA_FILE).await?;

        let Some(metadata) = metadata else {
            if tactics.is_some() || behaviors.is_some() {
                return Err(TransportError::Malformed(format!(
                    "{METADATA_FILE} missing next to statistics files"
                )));
            }
            return Ok(None);
        };
        let metadata: RepositoryMetadata =
            serde_json::from_slice(&metadata).map_err(|e| malformed(METADATA_FILE, e))?;

        let mut document = AggregateDocument::empty(metadata.last_update);
        for (family, bytes, file) in [
            (StatFamily::Tactics, tactics, TACTICS_FILE),
            (StatFamily::Behaviors, behaviors, BEHAVIORS_FILE),
        ] {
            if let Some(bytes) = bytes {
                *document.family_mut(family) =
                    decode_entries(&bytes).map_err(|e| malformed(file, e))?;
            }
        }
        document.contributor_count = metadata.contributions;

        Ok(Some(RemoteSnapshot {
            summary: RoundSummary {
                round_number: metadata.revision,
                contributor_count: metadata.contributions,
                finalized_at: metadata.last_update,
            },
            document,
        }))
    }

    /// One pull-merge-push attempt.
    async fn push_cycle(
        &self,
        contribution: &AggregateDocument,
    ) -> Result<UploadReceipt, TransportError> {
        self.pull().await?;
        let remote = self.read_remote().await?;
        let previous_revision = remote.as_ref().map_or(0, |s| s.summary.round_number);

        let mut merged = match &remote {
            Some(remote) => merge_documents(&remote.document, contribution)
                .map_err(|e| TransportError::Malformed(e.to_string()))?,
            None => contribution.clone(),
        };
        merged.produced_at = Utc::now();
        let revision = previous_revision + 1;
        let metadata = RepositoryMetadata::describe(&merged, revision);

        let files = vec![
            (TACTICS_FILE.to_string(), encode(encode_entries(&merged.tactics))?),
            (BEHAVIORS_FILE.to_string(), encode(encode_entries(&merged.behaviors))?),
            (
                METADATA_FILE.to_string(),
                serde_json::to_vec_pretty(&metadata).map_err(|e| malformed(METADATA_FILE, e))?,
            ),
        ];
        self.backend.write_files(&files).await?;

        let message = format!(
            "Update shared statistics to revision {revision} (+{} data points)",
            contribution.total_attempts()
        );
        let revision = match self.backend.publish(&message).await? {
            PublishOutcome::Pushed => revision,
            PublishOutcome::NothingToCommit => previous_revision,
        };
        info!(
            revision,
            data_points = metadata.data_points,
            "pushed shared statistics"
        );

        Ok(UploadReceipt {
            round_number: revision,
            merged: Some(RemoteSnapshot {
                summary: RoundSummary {
                    round_number: revision,
                    contributor_count: metadata.contributions,
                    finalized_at: metadata.last_update,
                },
                document: merged,
            }),
        })
    }
}

fn malformed(file: &str, err: impl std::fmt::Display) -> TransportError {
    TransportError::Malformed(format!("{file}: {err}"))
}

fn encode(result: Result<Vec<u8>, DomainError>) -> Result<Vec<u8>, TransportError> {
    result.map_err(|e| TransportError::Io(e.to_string()))
}

#[async_trait]
impl SyncTransport for RepositoryTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Repository
    }

    #[instrument(skip(self, _contributor_token, contribution), fields(data_points = contribution.total_attempts()))]
    async fn push(
        &self,
        _contributor_token: &str,
        contribution: &AggregateDocument,
    ) -> Result<UploadReceipt, TransportError> {
        let _cycle = self.cycle_lock.lock().await;
        self.retry_policy
            .execute(move || self.push_cycle(contribution))
            .await
    }

    #[instrument(skip(self))]
    async fn fetch(&self) -> Result<Option<RemoteSnapshot>, TransportError> {
        let _cycle = self.cycle_lock.lock().await;
        self.retry_policy
            .execute_when(
                |err| !err.is_conflict() && err.is_transient(),
                move || async move {
                    self.pull().await?;
                    let snapshot = self.read_remote().await?;
                    debug!(
                        revision = ?snapshot.as_ref().map(|s| s.summary.round_number),
                        "read shared statistics"
                    );
                    Ok::<_, TransportError>(snapshot)
                },
            )
            .await
    }
}
