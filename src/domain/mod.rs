//! Domain layer for the fedsync aggregation protocol
//!
//! This module contains the statistic value types, round and sync state
//! models, and the port traits infrastructure adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
