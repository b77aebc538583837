//! Flight recorder port.
//!
//! A write-only trail of finalized rounds for operators. Nothing in the
//! protocol ever reads it back, and a failure to write never affects a round.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::models::RoundSummary;

/// Sink for one record per finalized round.
#[async_trait]
pub trait FlightRecorder: Send + Sync {
    async fn record_round(&self, summary: &RoundSummary) -> Result<()>;
}

/// A flight recorder that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFlightRecorder;

#[async_trait]
impl FlightRecorder for NullFlightRecorder {
    async fn record_round(&self, _summary: &RoundSummary) -> Result<()> {
        Ok(())
    }
}
