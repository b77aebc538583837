//! Repository backend port - the versioned blob store behind the
//! repository transport.

use async_trait::async_trait;

use super::errors::TransportError;

/// Result of publishing local changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A commit was created and pushed.
    Pushed,
    /// The written files matched the remote; nothing was pushed.
    NothingToCommit,
}

/// Trait for a versioned store with last-writer-wins per file and
/// reject-on-conflict pushes.
#[async_trait]
pub trait RepositoryBackend: Send + Sync {
    /// Make sure a local checkout exists, creating it on first use.
    async fn ensure_checkout(&self) -> Result<(), TransportError>;

    /// Bring the local checkout to exactly the remote head, discarding any
    /// unpublished local commits.
    async fn sync_to_remote(&self) -> Result<(), TransportError>;

    /// Read a file from the checkout; `None` if it does not exist.
    async fn read_file(&self, name: &str) -> Result<Option<Vec<u8>>, TransportError>;

    /// Write a set of files into the checkout.
    async fn write_files(&self, files: &[(String, Vec<u8>)]) -> Result<(), TransportError>;

    /// Commit everything written and push it.
    ///
    /// A push refused because the remote moved must surface as
    /// [`TransportError::Conflict`]; it is never forced.
    async fn publish(&self, message: &str) -> Result<PublishOutcome, TransportError>;
}
