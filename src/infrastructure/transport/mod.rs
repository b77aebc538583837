//! Sync transport implementations.
//!
//! - [`DirectTransport`]: HTTP against the round coordinator
//! - [`RepositoryTransport`]: pull-merge-push over a shared git repository

pub mod direct;
pub mod git_backend;
pub mod repository;
pub mod retry;
pub mod wire;

pub use direct::DirectTransport;
pub use git_backend::GitCliBackend;
pub use repository::{RepositoryMetadata, RepositoryTransport};
pub use retry::RetryPolicy;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::domain::models::{Config, TransportKind};
use crate::domain::ports::SyncTransport;

/// Build the transport selected by `config.sync.transport`.
pub fn build_transport(config: &Config) -> Result<Arc<dyn SyncTransport>> {
    let retry_policy = RetryPolicy::from_config(&config.retry);
    let transport: Arc<dyn SyncTransport> = match config.sync.transport {
        TransportKind::Direct => Arc::new(
            DirectTransport::new(&config.sync.endpoint, config.sync.call_timeout())?
                .with_retry_policy(retry_policy),
        ),
        TransportKind::Repository => {
            let backend = GitCliBackend::new(
                &config.sync.repository_url,
                &config.sync.checkout_path,
                &config.sync.branch,
            )
            .context("Invalid repository transport settings")?;
            Arc::new(RepositoryTransport::new(Arc::new(backend), retry_policy))
        }
    };
    Ok(transport)
}
