//! Storage error types for the contract storage abstraction layer.

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested element was not found.
    #[error("No element found: {kind}/{identifier}")]
    NoElement {
        /// What kind of element was looked up (contract, session, ...).
        kind: String,
        /// The id or slug that was looked up.
        identifier: String,
    },

    /// A query exceeded the statement timeout.
    #[error("Database timeout: {message}")]
    DatabaseTimeout {
        /// Description of the timed-out operation.
        message: String,
    },

    /// The database rejected a regular expression at plan time.
    #[error("Invalid regular expression: {pattern}")]
    InvalidRegularExpression {
        /// The offending pattern.
        pattern: String,
    },

    /// The caller requested more rows than the hard query limit.
    #[error("Invalid limit: {message}")]
    InvalidLimit {
        /// Description of the violated bound.
        message: String,
    },

    /// An error occurred during a transaction.
    #[error("Transaction error: {message}")]
    TransactionError {
        /// Description of the transaction error.
        message: String,
    },

    /// Failed to connect to the storage backend.
    #[error("Connection error: {message}")]
    ConnectionError {
        /// Description of the connection error.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NoElement` error.
    #[must_use]
    pub fn no_element(kind: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::NoElement {
            kind: kind.into(),
            identifier: identifier.into(),
        }
    }

    /// Creates a new `DatabaseTimeout` error.
    #[must_use]
    pub fn database_timeout(message: impl Into<String>) -> Self {
        Self::DatabaseTimeout {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRegularExpression` error.
    #[must_use]
    pub fn invalid_regular_expression(pattern: impl Into<String>) -> Self {
        Self::InvalidRegularExpression {
            pattern: pattern.into(),
        }
    }

    /// Creates a new `InvalidLimit` error.
    #[must_use]
    pub fn invalid_limit(message: impl Into<String>) -> Self {
        Self::InvalidLimit {
            message: message.into(),
        }
    }

    /// Creates a new `TransactionError`.
    #[must_use]
    pub fn transaction_error(message: impl Into<String>) -> Self {
        Self::TransactionError {
            message: message.into(),
        }
    }

    /// Creates a new `ConnectionError`.
    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<pactdb_core::CoreError> for StorageError {
    fn from(err: pactdb_core::CoreError) -> Self {
        match err {
            pactdb_core::CoreError::NoElement { kind, identifier } => {
                Self::NoElement { kind, identifier }
            }
            other => Self::Internal {
                message: other.to_string(),
            },
        }
    }
}
