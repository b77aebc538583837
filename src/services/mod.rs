//! Service layer: the protocol logic on top of the domain model.

pub mod contributor_sync;
pub mod merge;
pub mod outcome_recorder;
pub mod round_coordinator;
pub mod round_ticker;
pub mod snapshotter;
pub mod sync_daemon;

pub use contributor_sync::{ContributorSync, DownloadOutcome, SkipReason, UploadOutcome};
pub use merge::{merge, merge_all, merge_documents, merge_entries};
pub use outcome_recorder::{OutcomeRecorder, RecorderStatistics, SnapshotApplication};
pub use round_coordinator::{
    ContributionReceipt, CoordinatorStats, RoundCoordinator, RoundPolicy,
};
pub use round_ticker::{RoundTicker, RoundTickerEvent, RoundTickerHandle};
pub use sync_daemon::{
    SyncDaemon, SyncDaemonConfig, SyncDaemonEvent, SyncDaemonHandle, SyncDaemonStatus,
    SyncDirection,
};
