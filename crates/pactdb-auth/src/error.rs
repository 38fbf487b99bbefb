//! Authorization error types.

use thiserror::Error;

/// Errors surfaced while composing a session's permission mask.
///
/// Session problems are reported without leaking internal state: the caller
/// learns that the session is unusable, not why the lookup failed.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("No element found: {kind}/{identifier}")]
    NoElement { kind: String, identifier: String },

    #[error(transparent)]
    Storage(#[from] pactdb_storage::StorageError),
}

impl AuthError {
    /// Creates a new `InvalidSession` error.
    #[must_use]
    pub fn invalid_session(id: impl Into<String>) -> Self {
        Self::InvalidSession(id.into())
    }

    /// Creates a new `SessionExpired` error.
    #[must_use]
    pub fn session_expired(id: impl Into<String>) -> Self {
        Self::SessionExpired(id.into())
    }

    /// Creates a new `NoElement` error.
    #[must_use]
    pub fn no_element(kind: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::NoElement {
            kind: kind.into(),
            identifier: identifier.into(),
        }
    }
}

/// Result type alias for authorization operations.
pub type Result<T> = std::result::Result<T, AuthError>;
