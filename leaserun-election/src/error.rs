//! Error types for leader election

use std::io;

/// Errors reported by a [`ResourceLock`](crate::ResourceLock) backend
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// No election record has been written yet
    #[error("Election record not found")]
    NotFound,

    /// Failed to read or write the lock file
    #[error("Lock file error: {0}")]
    Io(#[source] io::Error),

    /// The stored record could not be encoded or decoded
    #[error("Election record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other backend failure
    #[error("Store error: {0}")]
    Store(String),

    /// The operation observed cancellation before completing
    #[error("Lock operation cancelled")]
    Cancelled,
}

impl LockError {
    /// True when the store simply has no record yet.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Errors that can end an election run or prevent one from starting
#[derive(Debug, thiserror::Error)]
pub enum ElectionError {
    /// The election configuration is unusable
    #[error("Invalid election config: {0}")]
    Config(String),

    /// The run was cancelled by its caller
    #[error("Election cancelled")]
    Cancelled,

    /// A lock backend could not be set up
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Result type for election operations
pub type Result<T> = std::result::Result<T, ElectionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_lock_error_display() {
        let err = LockError::NotFound;
        assert_eq!(format!("{}", err), "Election record not found");

        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err = LockError::Io(io_err);
        assert!(format!("{}", err).contains("Lock file error"));
    }

    #[test]
    fn test_lock_error_source() {
        let err = LockError::NotFound;
        assert!(err.source().is_none());

        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err = LockError::Io(io_err);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_is_not_found() {
        assert!(LockError::NotFound.is_not_found());
        assert!(!LockError::Cancelled.is_not_found());
        assert!(!LockError::Store("boom".to_string()).is_not_found());
    }

    #[test]
    fn test_election_error_wraps_lock_error() {
        let err: ElectionError = LockError::Store("unreachable".to_string()).into();
        assert_eq!(format!("{}", err), "Store error: unreachable");

        let err = ElectionError::Config("identity must not be empty".to_string());
        assert!(format!("{}", err).contains("Invalid election config"));
    }
}
