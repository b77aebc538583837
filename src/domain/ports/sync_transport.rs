//! Sync transport port - the capability contributors use to exchange
//! aggregates with a shared coordinator or store.

use async_trait::async_trait;

use super::errors::TransportError;
use crate::domain::models::{AggregateDocument, RemoteSnapshot, TransportKind};

/// What a successful push tells the contributor.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReceipt {
    /// Round (or repository revision) the contribution landed in.
    pub round_number: u64,
    /// The resulting global document, when the transport already has it.
    ///
    /// A repository push produces the merged global document itself, so the
    /// contributor can adopt it immediately. A coordinator only publishes the
    /// merge once the round finalizes, so this is `None` there.
    pub merged: Option<RemoteSnapshot>,
}

/// Trait for the mechanism that moves aggregates between a contributor and
/// the shared store.
///
/// Implementations perform the I/O only. Interval gating, minimum
/// contribution checks, timeouts and backoff are applied uniformly by
/// `ContributorSync` on top of any implementation.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Which kind of transport this is; selects the default schedule.
    fn kind(&self) -> TransportKind;

    /// Push a contribution document.
    async fn push(
        &self,
        contributor_token: &str,
        contribution: &AggregateDocument,
    ) -> Result<UploadReceipt, TransportError>;

    /// Fetch the latest global snapshot; `None` when nothing has been
    /// published yet.
    async fn fetch(&self) -> Result<Option<RemoteSnapshot>, TransportError>;
}
