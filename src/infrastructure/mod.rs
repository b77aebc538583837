//! Infrastructure layer module
//!
//! Implementations of the domain ports and process-wide plumbing:
//! - Sync transports (direct HTTP, shared git repository)
//! - Configuration loading
//! - Logging
//! - Round flight log
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod config;
pub mod flight_log;
pub mod logging;
pub mod transport;
