use thiserror::Error;

/// Errors a sync transport can report
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection refused, DNS failure, reset connection
    #[error("Network error: {0}")]
    Network(String),

    /// The call exceeded its time bound
    #[error("Transport call timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The remote asked us to slow down (HTTP 429)
    #[error("Rate limited by remote")]
    RateLimited,

    /// The remote failed on its side (HTTP 5xx)
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The remote refused the request (HTTP 4xx other than 429)
    #[error("Rejected by remote ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// A concurrent writer moved the shared store first
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// An external command (git) exited unsuccessfully
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// Local filesystem or process I/O failed
    #[error("I/O error: {0}")]
    Io(String),

    /// The remote document could not be decoded
    #[error("Malformed remote document: {0}")]
    Malformed(String),
}

impl TransportError {
    /// Returns true if retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::Timeout(_)
                | Self::RateLimited
                | Self::Server { .. }
                | Self::Conflict(_)
                | Self::CommandFailed(_)
                | Self::Io(_)
        )
    }

    /// Returns true if a concurrent writer caused this failure
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns true if the remote content, not the channel, is at fault
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(std::time::Duration::ZERO)
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(TransportError::Network("reset".to_string()).is_transient());
        assert!(TransportError::Timeout(std::time::Duration::from_secs(1)).is_transient());
        assert!(TransportError::RateLimited.is_transient());
        assert!(TransportError::Conflict("non-fast-forward".to_string()).is_transient());
        assert!(TransportError::Server {
            status: 503,
            message: "busy".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_non_transient_errors() {
        assert!(!TransportError::Malformed("bad json".to_string()).is_transient());
        assert!(!TransportError::Rejected {
            status: 400,
            message: "missing token".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_error_classification_exclusivity() {
        let conflict = TransportError::Conflict("rejected".to_string());
        assert!(conflict.is_conflict());
        assert!(!conflict.is_malformed());

        let malformed = TransportError::Malformed("truncated".to_string());
        assert!(malformed.is_malformed());
        assert!(!malformed.is_conflict());
    }
}
