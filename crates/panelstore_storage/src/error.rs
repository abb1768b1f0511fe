//! Error types for storage operations.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend has no live connection.
    #[error("backend is not connected")]
    NotConnected,

    /// Establishing or using the connection failed.
    #[error("connection failure: {0}")]
    Connection(String),

    /// A command was issued against a key holding a different data type.
    #[error("wrong type for key {key}: operation against a key holding the wrong kind of value")]
    WrongType {
        /// The offending key.
        key: String,
    },

    /// The backend rejected a command.
    #[error("backend error: {0}")]
    Backend(String),

    /// The backend answered with a reply that does not fit the command.
    #[error("unexpected reply to {command}")]
    UnexpectedReply {
        /// Name of the command whose reply could not be interpreted.
        command: &'static str,
    },
}

impl StorageError {
    /// Creates a wrong type error.
    pub fn wrong_type(key: impl Into<String>) -> Self {
        Self::WrongType { key: key.into() }
    }

    /// Returns true if the error means the backend could not be reached.
    #[must_use]
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Connection(_))
    }
}
