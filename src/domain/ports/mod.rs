//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the interfaces that infrastructure adapters implement:
//! - SyncTransport: moving aggregates between a contributor and a shared store
//! - RepositoryBackend: the versioned store behind the repository transport
//! - SnapshotRepository: durable storage of finalized rounds
//! - FlightRecorder: write-only trail of finalized rounds
//! - Clock: injectable wall-clock time

pub mod clock;
pub mod errors;
pub mod flight_recorder;
pub mod repository_backend;
pub mod snapshot_repository;
pub mod sync_transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::TransportError;
pub use flight_recorder::{FlightRecorder, NullFlightRecorder};
pub use repository_backend::{PublishOutcome, RepositoryBackend};
pub use snapshot_repository::SnapshotRepository;
pub use sync_transport::{SyncTransport, UploadReceipt};
