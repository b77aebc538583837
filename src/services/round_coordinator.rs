//! Round coordinator.
//!
//! The single authority that turns contributions into finalized global
//! snapshots. All round state sits behind one async mutex; persistence and
//! flight recording happen after the lock is released.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AggregateDocument, CoordinatorConfig, RemoteSnapshot, Round, RoundSummary,
};
use crate::domain::ports::{Clock, FlightRecorder, NullFlightRecorder, SnapshotRepository};
use crate::services::merge::merge_documents;

/// Round closing rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundPolicy {
    /// Distinct contributors that close a round early.
    pub contributor_threshold: usize,
    /// Longest a non-empty round stays open.
    pub round_deadline: Duration,
}

impl Default for RoundPolicy {
    fn default() -> Self {
        Self {
            contributor_threshold: 10,
            round_deadline: Duration::minutes(10),
        }
    }
}

impl From<&CoordinatorConfig> for RoundPolicy {
    fn from(config: &CoordinatorConfig) -> Self {
        Self {
            contributor_threshold: config.contributor_threshold,
            round_deadline: config.round_deadline(),
        }
    }
}

/// Answer to an accepted contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionReceipt {
    /// Round the contribution was merged into.
    pub round_number: u64,
    /// True if this contribution closed the round.
    pub round_closed: bool,
}

/// Public coordinator counters. Contains no contributor identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStats {
    pub current_round: u64,
    pub current_round_started_at: DateTime<Utc>,
    pub current_round_contributions: u32,
    pub latest_finalized_round: Option<u64>,
    pub latest_finalized_at: Option<DateTime<Utc>>,
    pub tactics_count: usize,
    pub behaviors_count: usize,
    pub total_attempts: u64,
}

struct CoordinatorState {
    round: Round,
    latest: Option<RemoteSnapshot>,
}

/// Single-writer round state machine.
pub struct RoundCoordinator {
    policy: RoundPolicy,
    clock: Arc<dyn Clock>,
    state: Mutex<CoordinatorState>,
    repository: Option<Arc<dyn SnapshotRepository>>,
    flight_recorder: Arc<dyn FlightRecorder>,
}

impl RoundCoordinator {
    /// Start at round 1 with no history.
    pub fn new(policy: RoundPolicy, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            policy,
            clock,
            state: Mutex::new(CoordinatorState {
                round: Round::open(1, now),
                latest: None,
            }),
            repository: None,
            flight_recorder: Arc::new(NullFlightRecorder),
        }
    }

    /// Persist every finalized snapshot to `repository`.
    pub fn with_repository(mut self, repository: Arc<dyn SnapshotRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Report every finalized round to `flight_recorder`.
    pub fn with_flight_recorder(mut self, flight_recorder: Arc<dyn FlightRecorder>) -> Self {
        self.flight_recorder = flight_recorder;
        self
    }

    /// Resume from the latest persisted snapshot, if any.
    ///
    /// Numbering continues after the restored round; the open round starts
    /// empty.
    pub async fn restore(self) -> DomainResult<Self> {
        let Some(repository) = &self.repository else {
            return Ok(self);
        };
        let Some(latest) = repository.latest().await? else {
            return Ok(self);
        };
        info!(
            round_number = latest.summary.round_number,
            data_points = latest.document.total_attempts(),
            "restored coordinator from persisted snapshot"
        );
        {
            let mut state = self.state.lock().await;
            state.round = Round::open(latest.summary.round_number + 1, self.clock.now());
            state.latest = Some(latest);
        }
        Ok(self)
    }

    pub fn policy(&self) -> &RoundPolicy {
        &self.policy
    }

    /// Merge a contribution into the open round.
    ///
    /// Closes the round immediately once it has heard from
    /// `contributor_threshold` distinct contributors.
    #[instrument(skip(self, contributor_token, document), fields(data_points = document.total_attempts()))]
    pub async fn contribute(
        &self,
        contributor_token: &str,
        document: &AggregateDocument,
    ) -> DomainResult<ContributionReceipt> {
        let (receipt, finalized) = {
            let mut state = self.state.lock().await;
            let round_number = state.round.round_number();
            let distinct = state.round.absorb(contributor_token, document)?;
            debug!(round_number, distinct_contributors = distinct, "accepted contribution");

            let finalized = if distinct >= self.policy.contributor_threshold {
                Some(self.finalize_locked(&mut state)?)
            } else {
                None
            };
            (
                ContributionReceipt {
                    round_number,
                    round_closed: finalized.is_some(),
                },
                finalized,
            )
        };

        if let Some(snapshot) = finalized {
            self.publish(&snapshot).await;
        }
        Ok(receipt)
    }

    /// Close the open round if its deadline has passed.
    ///
    /// Returns `Ok(None)` while the deadline is still ahead. An expired round
    /// without contributions is never finalized or published. It keeps its
    /// round number and its deadline restarts from now. Safe to call at any
    /// rate.
    pub async fn tick(&self) -> DomainResult<Option<RoundSummary>> {
        let finalized = {
            let mut state = self.state.lock().await;
            let now = self.clock.now();
            if now - state.round.started_at() < self.policy.round_deadline {
                return Ok(None);
            }
            if state.round.contribution_count() == 0 {
                debug!(
                    round_number = state.round.round_number(),
                    "deadline passed on empty round, restarting it"
                );
                state.round.restart(now);
                return Ok(None);
            }
            info!(
                round_number = state.round.round_number(),
                "round deadline reached"
            );
            self.finalize_locked(&mut state)?
        };

        self.publish(&finalized).await;
        Ok(Some(finalized.summary))
    }

    /// Close the open round now. Returns `None` if it holds no contributions.
    pub async fn finalize(&self) -> DomainResult<Option<RoundSummary>> {
        let finalized = {
            let mut state = self.state.lock().await;
            if state.round.contribution_count() == 0 {
                return Ok(None);
            }
            self.finalize_locked(&mut state)?
        };

        self.publish(&finalized).await;
        Ok(Some(finalized.summary))
    }

    /// The latest finalized global snapshot. Never the open round.
    pub async fn snapshot(&self) -> Option<RemoteSnapshot> {
        self.state.lock().await.latest.clone()
    }

    pub async fn stats(&self) -> CoordinatorStats {
        let state = self.state.lock().await;
        let latest = state.latest.as_ref();
        CoordinatorStats {
            current_round: state.round.round_number(),
            current_round_started_at: state.round.started_at(),
            current_round_contributions: state.round.contribution_count(),
            latest_finalized_round: latest.map(|s| s.summary.round_number),
            latest_finalized_at: latest.map(|s| s.summary.finalized_at),
            tactics_count: latest.map_or(0, |s| s.document.tactics.len()),
            behaviors_count: latest.map_or(0, |s| s.document.behaviors.len()),
            total_attempts: latest.map_or(0, |s| s.document.total_attempts()),
        }
    }

    /// Freeze the open round, fold it into the global snapshot and open the
    /// next one. Caller holds the state lock.
    fn finalize_locked(&self, state: &mut CoordinatorState) -> DomainResult<RemoteSnapshot> {
        let now = self.clock.now();
        let (summary, aggregate) = state.round.finalize(now)?;

        let mut document = match &state.latest {
            Some(previous) => merge_documents(&previous.document, &aggregate)?,
            None => aggregate,
        };
        document.produced_at = now;

        let snapshot = RemoteSnapshot { summary, document };
        state.latest = Some(snapshot.clone());
        state.round = Round::open(snapshot.summary.round_number + 1, now);

        info!(
            round_number = snapshot.summary.round_number,
            contributor_count = snapshot.summary.contributor_count,
            data_points = snapshot.document.total_attempts(),
            "round finalized"
        );
        Ok(snapshot)
    }

    async fn publish(&self, snapshot: &RemoteSnapshot) {
        if let Some(repository) = &self.repository {
            if let Err(err) = repository.save(snapshot).await {
                error!(
                    round_number = snapshot.summary.round_number,
                    error = %err,
                    "failed to persist finalized snapshot"
                );
            }
        }
        if let Err(err) = self.flight_recorder.record_round(&snapshot.summary).await {
            warn!(
                round_number = snapshot.summary.round_number,
                error = %err,
                "flight recorder rejected round summary"
            );
        }
    }
}
