//! Command implementations.

pub mod coordinator;
pub mod pull;
pub mod status;
