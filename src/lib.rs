//! fedsync - federated tactic statistics
//!
//! Contributors record the outcome of every tactic and behavior they try,
//! periodically share the accumulated counts, and fold the global aggregate
//! back into their local view. Only aggregate counts ever leave a
//! contributor.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): statistic value types, rounds, port traits
//! - **Service Layer** (`services`): recorder, merge engine, contributor sync,
//!   round coordinator and their daemons
//! - **Infrastructure Layer** (`infrastructure`): transports, configuration,
//!   logging, flight log
//! - **Adapters** (`adapters`): coordinator HTTP server, SQLite persistence
//! - **CLI Layer** (`cli`): the `fedsync` binary's commands
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fedsync::{ContributorSync, OutcomeRecorder, SystemClock, TacticKey};
//! use fedsync::infrastructure::transport::DirectTransport;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let recorder = Arc::new(OutcomeRecorder::new());
//! recorder.record_outcome(TacticKey::new("flank", "melee")?, true);
//!
//! let transport = DirectTransport::new(
//!     "http://127.0.0.1:9300/api/v1/knowledge",
//!     std::time::Duration::from_secs(30),
//! )?;
//! let sync = ContributorSync::new(
//!     Arc::new(transport),
//!     Arc::clone(&recorder),
//!     Arc::new(SystemClock),
//!     fedsync::domain::models::TransportKind::Direct.default_schedule(),
//!     std::time::Duration::from_secs(30),
//!     true,
//! );
//! sync.upload().await?;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    AggregateDocument, AggregateEntry, Config, RemoteSnapshot, RoundSummary, StatFamily,
    TacticKey, TransportKind,
};
pub use domain::ports::{Clock, SyncTransport, SystemClock, TransportError};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    ContributorSync, OutcomeRecorder, RoundCoordinator, RoundPolicy, SyncDaemon,
    SyncDaemonConfig,
};
