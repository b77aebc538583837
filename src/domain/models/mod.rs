pub mod aggregate;
pub mod config;
pub mod round;
pub mod sync_state;

pub use aggregate::{
    AggregateDocument, AggregateEntry, EntryMap, StatFamily, TacticKey, NEUTRAL_SUCCESS_RATE,
};
pub use config::{Config, CoordinatorConfig, LoggingConfig, RetryConfig, SyncConfig};
pub use round::{RemoteSnapshot, Round, RoundState, RoundSummary};
pub use sync_state::{SyncSchedule, SyncState, TransportKind};
