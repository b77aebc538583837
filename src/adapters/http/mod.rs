//! HTTP surface of the round coordinator.

pub mod coordinator_server;

pub use coordinator_server::{CoordinatorHttpConfig, CoordinatorServer};
