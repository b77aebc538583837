//! Adapters binding the services to the outside world.

pub mod http;
pub mod sqlite;
