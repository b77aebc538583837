//! Contributor-side synchronization.
//!
//! Wraps a [`SyncTransport`] with the gating rules every transport shares:
//! per-direction intervals, a minimum batch size, a bounded call time and
//! failure backoff. All time comes from the injected [`Clock`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::models::{SyncSchedule, SyncState};
use crate::domain::ports::{Clock, SyncTransport, TransportError};
use crate::services::outcome_recorder::{OutcomeRecorder, SnapshotApplication};
use crate::services::snapshotter;

/// Why a sync call returned without doing any I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Synchronization is switched off for this contributor.
    Disabled,
    /// The (backed-off) interval has not elapsed yet.
    NotDue,
    /// Too few new outcomes to be worth uploading.
    BelowMinimum { pending: u64, required: u64 },
    /// Nothing was recorded since the last upload.
    NothingPending,
}

/// Result of an upload attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Skipped(SkipReason),
    Uploaded { round_number: u64, data_points: u64 },
}

/// Result of a download attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Skipped(SkipReason),
    /// A newer global snapshot became the local baseline.
    Applied { round_number: u64 },
    /// The remote snapshot was not newer than what we already have.
    Stale { round_number: u64 },
    /// The shared store has no finalized snapshot yet.
    Unavailable,
    /// The remote document could not be decoded; local state was kept.
    Malformed { reason: String },
}

/// Gated upload/download driver for one contributor.
pub struct ContributorSync {
    transport: Arc<dyn SyncTransport>,
    recorder: Arc<OutcomeRecorder>,
    clock: Arc<dyn Clock>,
    schedule: SyncSchedule,
    call_timeout: Duration,
    contributor_token: String,
    state: Mutex<SyncState>,
}

impl ContributorSync {
    /// Create a driver with a fresh random contributor token.
    pub fn new(
        transport: Arc<dyn SyncTransport>,
        recorder: Arc<OutcomeRecorder>,
        clock: Arc<dyn Clock>,
        schedule: SyncSchedule,
        call_timeout: Duration,
        enabled: bool,
    ) -> Self {
        Self {
            transport,
            recorder,
            clock,
            schedule,
            call_timeout,
            contributor_token: Uuid::new_v4().to_string(),
            state: Mutex::new(SyncState::new(enabled)),
        }
    }

    /// Use a fixed contributor token instead of a random one.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.contributor_token = token.into();
        self
    }

    pub fn recorder(&self) -> &Arc<OutcomeRecorder> {
        &self.recorder
    }

    pub fn schedule(&self) -> &SyncSchedule {
        &self.schedule
    }

    /// Copy of the current sync bookkeeping.
    pub async fn sync_state(&self) -> SyncState {
        self.state.lock().await.clone()
    }

    pub async fn set_enabled(&self, enabled: bool) {
        self.state.lock().await.enabled = enabled;
    }

    /// Upload the pending batch if the interval and minimum allow it.
    #[instrument(skip(self), fields(transport = self.transport.kind().as_str()))]
    pub async fn upload(&self) -> Result<UploadOutcome, TransportError> {
        let mut state = self.state.lock().await;
        if !state.enabled {
            return Ok(UploadOutcome::Skipped(SkipReason::Disabled));
        }
        let now = self.clock.now();
        if !state.upload_due(&self.schedule, now) {
            return Ok(UploadOutcome::Skipped(SkipReason::NotDue));
        }
        let pending = self.recorder.pending_count();
        if pending < self.schedule.min_contributions {
            debug!(
                pending,
                required = self.schedule.min_contributions,
                "not enough new outcomes to upload"
            );
            return Ok(UploadOutcome::Skipped(SkipReason::BelowMinimum {
                pending,
                required: self.schedule.min_contributions,
            }));
        }
        self.push_pending(&mut state).await
    }

    /// Upload whatever is pending, ignoring the interval and the minimum.
    ///
    /// Used for the final push when a contributor shuts down.
    #[instrument(skip(self), fields(transport = self.transport.kind().as_str()))]
    pub async fn flush(&self) -> Result<UploadOutcome, TransportError> {
        let mut state = self.state.lock().await;
        if !state.enabled {
            return Ok(UploadOutcome::Skipped(SkipReason::Disabled));
        }
        if self.recorder.pending_count() == 0 {
            return Ok(UploadOutcome::Skipped(SkipReason::NothingPending));
        }
        self.push_pending(&mut state).await
    }

    async fn push_pending(&self, state: &mut SyncState) -> Result<UploadOutcome, TransportError> {
        let now = self.clock.now();
        let Some(batch) = snapshotter::contribution(&self.recorder, now) else {
            return Ok(UploadOutcome::Skipped(SkipReason::NothingPending));
        };
        state.last_upload_at = Some(now);

        let data_points = batch.total_attempts();
        let result = self
            .bounded(self.transport.push(&self.contributor_token, &batch))
            .await;

        match result {
            Ok(receipt) => {
                self.recorder.commit_upload(&batch, &receipt);
                state.record_success();
                info!(
                    round_number = receipt.round_number,
                    data_points, "uploaded contribution"
                );
                Ok(UploadOutcome::Uploaded {
                    round_number: receipt.round_number,
                    data_points,
                })
            }
            Err(err) => {
                state.record_failure(err.to_string());
                warn!(
                    error = %err,
                    consecutive_failures = state.consecutive_failures,
                    backoff_factor = state.backoff_factor(&self.schedule),
                    "upload failed, keeping batch pending"
                );
                Err(err)
            }
        }
    }

    /// Pull the latest global snapshot if the download interval allows it.
    #[instrument(skip(self), fields(transport = self.transport.kind().as_str()))]
    pub async fn download(&self) -> Result<DownloadOutcome, TransportError> {
        let mut state = self.state.lock().await;
        if !state.enabled {
            return Ok(DownloadOutcome::Skipped(SkipReason::Disabled));
        }
        let now = self.clock.now();
        if !state.download_due(&self.schedule, now) {
            return Ok(DownloadOutcome::Skipped(SkipReason::NotDue));
        }
        state.last_download_at = Some(now);

        match self.bounded(self.transport.fetch()).await {
            Ok(None) => {
                state.record_success();
                debug!("no global snapshot available yet");
                Ok(DownloadOutcome::Unavailable)
            }
            Ok(Some(snapshot)) => {
                state.record_success();
                Ok(match snapshotter::absorb(&self.recorder, snapshot) {
                    SnapshotApplication::Applied { round_number } => {
                        DownloadOutcome::Applied { round_number }
                    }
                    SnapshotApplication::Stale { round_number, .. } => {
                        DownloadOutcome::Stale { round_number }
                    }
                })
            }
            Err(TransportError::Malformed(reason)) => {
                warn!(reason = %reason, "ignoring malformed global snapshot");
                Ok(DownloadOutcome::Malformed { reason })
            }
            Err(err) => {
                state.record_failure(err.to_string());
                warn!(
                    error = %err,
                    consecutive_failures = state.consecutive_failures,
                    "download failed, keeping local statistics"
                );
                Err(err)
            }
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| TransportError::Timeout(self.call_timeout))?
    }
}
