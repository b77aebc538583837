//! Per-contributor outcome accumulation.
//!
//! The recorder keeps three layers of statistics:
//!
//! - `pending`: outcomes recorded since the last successful upload.
//! - `awaiting`: uploaded batches not yet confirmed by a global snapshot.
//! - `baseline`: the most recent global snapshot applied locally.
//!
//! Reads see the merge of all three. A batch leaves `pending` only when an
//! upload succeeds, and leaves `awaiting` only when a snapshot that includes
//! its round is applied, so no outcome is counted twice and none is lost.

use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::error;

use crate::domain::models::{
    AggregateDocument, AggregateEntry, RemoteSnapshot, StatFamily, TacticKey, NEUTRAL_SUCCESS_RATE,
};
use crate::domain::ports::UploadReceipt;
use crate::services::merge::{merge, merge_all};

/// A contribution that was uploaded but is not yet part of a snapshot.
#[derive(Debug, Clone)]
struct AwaitingBatch {
    round_number: u64,
    document: AggregateDocument,
}

#[derive(Debug)]
struct RecorderState {
    pending: AggregateDocument,
    awaiting: Vec<AwaitingBatch>,
    baseline: Option<RemoteSnapshot>,
    contributed_data_points: u64,
    snapshots_applied: u64,
}

/// Result of applying a global snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotApplication {
    /// The snapshot became the new baseline.
    Applied { round_number: u64 },
    /// The snapshot was not newer than the current baseline.
    Stale { round_number: u64, baseline_round: u64 },
}

/// Operator-facing counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderStatistics {
    /// Distinct tactic buckets in the local view.
    pub tactics_count: usize,
    /// Distinct behavior buckets in the local view.
    pub behaviors_count: usize,
    /// Outcomes recorded since the last successful upload.
    pub pending_outcomes: u64,
    /// Uploaded batches not yet confirmed by a snapshot.
    pub awaiting_batches: usize,
    /// Outcomes uploaded over the recorder's lifetime.
    pub contributed_data_points: u64,
    /// Attempts contained in the current baseline.
    pub downloaded_data_points: u64,
    /// Snapshots applied over the recorder's lifetime.
    pub snapshots_applied: u64,
    /// Round number of the current baseline.
    pub baseline_round: Option<u64>,
}

/// Thread-safe accumulator of outcome statistics for one contributor.
#[derive(Debug)]
pub struct OutcomeRecorder {
    state: Mutex<RecorderState>,
}

impl Default for OutcomeRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl OutcomeRecorder {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RecorderState {
                pending: AggregateDocument::empty(Utc::now()),
                awaiting: Vec::new(),
                baseline: None,
                contributed_data_points: 0,
                snapshots_applied: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        // Every mutation leaves the state consistent, so a poisoned lock is
        // still safe to use.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one tactic outcome.
    pub fn record_outcome(&self, key: TacticKey, success: bool) {
        self.record(StatFamily::Tactics, key, success);
    }

    /// Record one behavior outcome.
    pub fn record_behavior(&self, key: TacticKey, success: bool) {
        self.record(StatFamily::Behaviors, key, success);
    }

    fn record(&self, family: StatFamily, key: TacticKey, success: bool) {
        let mut state = self.lock();
        let entries = state.pending.family_mut(family);
        let current = entries
            .remove(&key)
            .unwrap_or_else(|| AggregateEntry::empty(key.clone()));
        entries.insert(key, current.with_outcome(success));
    }

    /// Success rate for a tactic in the local view, 0.5 when unknown.
    pub fn success_rate(&self, key: &TacticKey) -> f64 {
        self.entry(StatFamily::Tactics, key)
            .map_or(NEUTRAL_SUCCESS_RATE, |entry| entry.success_rate())
    }

    /// Success rate for a behavior in the local view, 0.5 when unknown.
    pub fn behavior_success_rate(&self, key: &TacticKey) -> f64 {
        self.entry(StatFamily::Behaviors, key)
            .map_or(NEUTRAL_SUCCESS_RATE, |entry| entry.success_rate())
    }

    /// The merged local entry for a key, if any layer knows it.
    pub fn entry(&self, family: StatFamily, key: &TacticKey) -> Option<AggregateEntry> {
        let state = self.lock();
        let found = state
            .layers()
            .filter_map(|doc| doc.family(family).get(key))
            .try_fold(None::<AggregateEntry>, |acc, entry| match acc {
                None => Ok(Some(entry.clone())),
                Some(acc) => merge(&acc, entry).map(Some),
            });
        found.unwrap_or_else(|err| {
            error!(key = %key, error = %err, "inconsistent recorder layers");
            None
        })
    }

    /// All tactic entries of one category, ordered by key.
    pub fn tactics_for_category(&self, category: &str) -> Vec<AggregateEntry> {
        self.view()
            .tactics
            .into_values()
            .filter(|entry| entry.key().category() == category)
            .collect()
    }

    /// The full local view: baseline, then awaiting batches, then pending.
    pub fn view(&self) -> AggregateDocument {
        let state = self.lock();
        state.view()
    }

    /// Outcomes recorded since the last successful upload.
    pub fn pending_count(&self) -> u64 {
        self.lock().pending.total_attempts()
    }

    /// Copy of the pending delta, stamped for upload.
    ///
    /// Nothing is removed here. The caller passes the same batch to
    /// [`Self::commit_upload`] once the upload succeeded.
    pub fn take_batch(&self, now: DateTime<Utc>) -> AggregateDocument {
        let state = self.lock();
        let mut batch = state.pending.clone();
        batch.produced_at = now;
        batch.contributor_count = 1;
        batch
    }

    /// Retire an uploaded batch from `pending`.
    ///
    /// Outcomes recorded while the upload was in flight stay pending. If the
    /// transport already knows the merged global document it becomes the new
    /// baseline; otherwise the batch waits for the snapshot of its round.
    pub fn commit_upload(&self, batch: &AggregateDocument, receipt: &UploadReceipt) {
        let mut state = self.lock();
        for family in StatFamily::ALL {
            let pending = state.pending.family_mut(family);
            for (key, sent) in batch.family(family) {
                if let Some(current) = pending.get(key) {
                    let rest = current.minus(sent);
                    if rest.is_empty() {
                        pending.remove(key);
                    } else {
                        pending.insert(key.clone(), rest);
                    }
                }
            }
        }
        state.contributed_data_points = state
            .contributed_data_points
            .saturating_add(batch.total_attempts());

        let adopted = match &receipt.merged {
            Some(snapshot) => matches!(
                state.apply(snapshot.clone()),
                SnapshotApplication::Applied { .. }
            ),
            None => false,
        };
        if !adopted {
            state.awaiting.push(AwaitingBatch {
                round_number: receipt.round_number,
                document: batch.clone(),
            });
        }
    }

    /// Adopt a global snapshot as the new baseline if it is newer.
    pub fn apply_snapshot(&self, snapshot: RemoteSnapshot) -> SnapshotApplication {
        self.lock().apply(snapshot)
    }

    /// Round number of the current baseline.
    pub fn baseline_round(&self) -> Option<u64> {
        self.lock().baseline_round()
    }

    pub fn statistics(&self) -> RecorderStatistics {
        let state = self.lock();
        let view = state.view();
        RecorderStatistics {
            tactics_count: view.tactics.len(),
            behaviors_count: view.behaviors.len(),
            pending_outcomes: state.pending.total_attempts(),
            awaiting_batches: state.awaiting.len(),
            contributed_data_points: state.contributed_data_points,
            downloaded_data_points: state
                .baseline
                .as_ref()
                .map_or(0, |snapshot| snapshot.document.total_attempts()),
            snapshots_applied: state.snapshots_applied,
            baseline_round: state.baseline_round(),
        }
    }
}

impl RecorderState {
    fn baseline_round(&self) -> Option<u64> {
        self.baseline
            .as_ref()
            .map(|snapshot| snapshot.summary.round_number)
    }

    fn layers(&self) -> impl Iterator<Item = &AggregateDocument> {
        self.baseline
            .iter()
            .map(|snapshot| &snapshot.document)
            .chain(self.awaiting.iter().map(|batch| &batch.document))
            .chain(std::iter::once(&self.pending))
    }

    fn view(&self) -> AggregateDocument {
        let base = AggregateDocument::empty(self.pending.produced_at);
        merge_all(&base, self.layers()).unwrap_or_else(|err| {
            error!(error = %err, "inconsistent recorder layers");
            self.pending.clone()
        })
    }

    fn apply(&mut self, snapshot: RemoteSnapshot) -> SnapshotApplication {
        let round_number = snapshot.summary.round_number;
        if let Some(baseline_round) = self.baseline_round() {
            if round_number <= baseline_round {
                return SnapshotApplication::Stale {
                    round_number,
                    baseline_round,
                };
            }
        }
        self.awaiting
            .retain(|batch| batch.round_number > round_number);
        self.baseline = Some(snapshot);
        self.snapshots_applied = self.snapshots_applied.saturating_add(1);
        SnapshotApplication::Applied { round_number }
    }
}
