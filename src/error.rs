//! Error taxonomy for write operations

use thiserror::Error;

/// Result alias used by repositories and write services
pub type WriteResult<T> = Result<T, WriteError>;

/// Errors raised while running write operations against the store
#[derive(Debug, Error)]
pub enum WriteError {
    /// The initial link to the store could not be established
    #[error("Database connection failed: {0:#}")]
    Connection(anyhow::Error),

    /// A lookup inside a unit of work found no matching record
    #[error("Precondition not met: {0}")]
    PreconditionNotMet(String),

    /// Any other failure reported by the store
    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    /// A concurrently spawned write panicked or was cancelled
    #[error("Write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<sqlx::Error> for WriteError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.into())
    }
}

impl WriteError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionNotMet(message.into())
    }

    /// Whether this error aborted a unit because a lookup came back empty
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::PreconditionNotMet(_))
    }

    /// Whether this error came from the store itself
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_context_chain_is_displayed() {
        let inner: Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"));
        let err: WriteError = inner.context("Failed to create user").unwrap_err().into();

        let msg = err.to_string();
        assert!(msg.starts_with("Storage error: Failed to create user"));
        assert!(msg.contains("disk gone"));
        assert!(err.is_storage());
    }

    #[test]
    fn test_sqlx_error_is_storage() {
        let err: WriteError = sqlx::Error::RowNotFound.into();
        assert!(err.is_storage());
        assert!(!err.is_precondition());
    }

    #[test]
    fn test_precondition_constructor() {
        let err = WriteError::precondition("no published post");
        assert!(err.is_precondition());
        assert_eq!(err.to_string(), "Precondition not met: no published post");
    }
}
