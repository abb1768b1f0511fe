//! Error types for panelstore core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in panelstore core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error, including connection failures.
    #[error("storage error: {0}")]
    Storage(#[from] panelstore_storage::StorageError),

    /// Invalid key size. Fatal at startup.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },

    /// Configuration could not be loaded.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// A lookup was attempted on a field that is not declared as indexed.
    #[error("field {field} is not indexed on table {table}")]
    FieldNotIndexed {
        /// Table that was queried.
        table: String,
        /// Field that was queried.
        field: String,
    },

    /// Decryption failed on a column that does not tolerate failures.
    #[error("decryption failed for {table}.{field} of entity {id}")]
    DecryptionFailed {
        /// Table of the record.
        table: String,
        /// Field that could not be decrypted.
        field: String,
        /// Entity id of the record.
        id: String,
    },
}

impl CoreError {
    /// Creates an invalid key size error.
    pub fn invalid_key_size(actual: usize, expected: usize) -> Self {
        Self::InvalidKeySize { expected, actual }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a field not indexed error.
    pub fn field_not_indexed(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self::FieldNotIndexed {
            table: table.into(),
            field: field.into(),
        }
    }

    /// Creates a decryption failed error.
    pub fn decryption_failed(
        table: impl Into<String>,
        field: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self::DecryptionFailed {
            table: table.into(),
            field: field.into(),
            id: id.into(),
        }
    }

    /// Returns true for configuration errors that should abort startup.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidKeySize { .. } | Self::InvalidConfig { .. })
    }

    /// Returns true if the backend could not be reached.
    #[must_use]
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_connection_failure())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use panelstore_storage::StorageError;

    #[test]
    fn classifies_configuration_errors() {
        assert!(CoreError::invalid_key_size(16, 32).is_configuration());
        assert!(CoreError::invalid_config("bad").is_configuration());
        assert!(!CoreError::field_not_indexed("profiles", "bio").is_configuration());
    }

    #[test]
    fn classifies_connection_failures() {
        let err: CoreError = StorageError::NotConnected.into();
        assert!(err.is_connection_failure());
        let err: CoreError = StorageError::Backend("oops".into()).into();
        assert!(!err.is_connection_failure());
    }

    #[test]
    fn messages_name_the_field() {
        let err = CoreError::field_not_indexed("profiles", "bio");
        assert_eq!(err.to_string(), "field bio is not indexed on table profiles");
    }
}
