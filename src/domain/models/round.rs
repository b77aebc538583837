//! Coordinator rounds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::aggregate::AggregateDocument;
use crate::domain::errors::{DomainError, DomainResult};
use crate::services::merge::merge_documents;

/// Lifecycle state of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    /// Accepting contributions.
    Open,
    /// Frozen; terminal.
    Finalized,
}

impl RoundState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Finalized => "finalized",
        }
    }
}

/// Public facts about a finalized round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round_number: u64,
    pub contributor_count: u32,
    pub finalized_at: DateTime<Utc>,
}

/// A finalized global snapshot together with the round that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    pub summary: RoundSummary,
    pub document: AggregateDocument,
}

/// One bounded accumulation window on the coordinator.
#[derive(Debug, Clone)]
pub struct Round {
    round_number: u64,
    started_at: DateTime<Utc>,
    aggregate: AggregateDocument,
    contributor_ids_seen: HashSet<String>,
    contribution_count: u32,
    state: RoundState,
}

impl Round {
    /// Open a new, empty round.
    pub fn open(round_number: u64, started_at: DateTime<Utc>) -> Self {
        Self {
            round_number,
            started_at,
            aggregate: AggregateDocument::empty(started_at),
            contributor_ids_seen: HashSet::new(),
            contribution_count: 0,
            state: RoundState::Open,
        }
    }

    pub fn round_number(&self) -> u64 {
        self.round_number
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == RoundState::Open
    }

    /// Number of distinct contributor tokens seen this round.
    pub fn distinct_contributors(&self) -> usize {
        self.contributor_ids_seen.len()
    }

    /// Number of accepted contributions, including repeats from one token.
    pub fn contribution_count(&self) -> u32 {
        self.contribution_count
    }

    pub fn aggregate(&self) -> &AggregateDocument {
        &self.aggregate
    }

    /// Merge a contribution into the round.
    ///
    /// Returns the number of distinct contributors after accepting it.
    pub fn absorb(&mut self, contributor_token: &str, doc: &AggregateDocument) -> DomainResult<usize> {
        if !self.is_open() {
            return Err(self.transition_error(RoundState::Open));
        }
        let mut merged = merge_documents(&self.aggregate, doc)?;
        merged.contributor_count = self.aggregate.contributor_count.saturating_add(1);
        self.aggregate = merged;
        self.contribution_count = self.contribution_count.saturating_add(1);
        self.contributor_ids_seen.insert(contributor_token.to_string());
        Ok(self.contributor_ids_seen.len())
    }

    /// Move the round to its terminal state, surrendering its aggregate.
    ///
    /// Contributor tokens are dropped here and never leave the round.
    pub fn finalize(&mut self, now: DateTime<Utc>) -> DomainResult<(RoundSummary, AggregateDocument)> {
        if !self.is_open() {
            return Err(self.transition_error(RoundState::Finalized));
        }
        self.state = RoundState::Finalized;
        let contributor_count = u32::try_from(self.contributor_ids_seen.len()).unwrap_or(u32::MAX);
        self.contributor_ids_seen.clear();

        let summary = RoundSummary {
            round_number: self.round_number,
            contributor_count,
            finalized_at: now,
        };
        let mut aggregate = std::mem::replace(&mut self.aggregate, AggregateDocument::empty(now));
        aggregate.produced_at = now;
        Ok((summary, aggregate))
    }

    /// Reset the start time of a round that is still open and empty.
    pub(crate) fn restart(&mut self, now: DateTime<Utc>) {
        if self.is_open() && self.contribution_count == 0 {
            self.started_at = now;
            self.aggregate.produced_at = now;
        }
    }

    fn transition_error(&self, to: RoundState) -> DomainError {
        DomainError::InvalidStateTransition {
            round_number: self.round_number,
            from: self.state.as_str().to_string(),
            to: to.as_str().to_string(),
        }
    }
}
