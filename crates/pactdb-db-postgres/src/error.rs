//! Error types for the PostgreSQL storage backend.
//!
//! Driver errors are classified by their structured SQLSTATE code where
//! available (`57014` query cancelled by statement timeout, `2201B` invalid
//! regular expression); the documented fallback matches on the driver's
//! message text, which some intermediate poolers rewrite.

use pactdb_auth::AuthError;
use pactdb_query::QueryBuilderError;
use pactdb_storage::StorageError;

/// SQLSTATE: query cancelled (raised by `statement_timeout`).
const SQLSTATE_QUERY_CANCELED: &str = "57014";
/// SQLSTATE: invalid regular expression.
const SQLSTATE_INVALID_REGEX: &str = "2201B";
/// SQLSTATE codes swallowed during bootstrap (unique violation,
/// duplicate table).
const IGNORABLE_INIT_CODES: &[&str] = &["23505", "42P07"];

/// Errors specific to the PostgreSQL storage backend.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::error::Error),

    /// Storage-level error (timeouts, limits, missing elements).
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Schema compilation error.
    #[error(transparent)]
    Query(#[from] QueryBuilderError),

    /// Session or permission error.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;

/// Classify a driver error into the storage taxonomy.
pub fn map_db_error(err: sqlx_core::error::Error) -> StorageError {
    if let sqlx_core::error::Error::Database(db_err) = &err {
        let message = db_err.message().to_string();
        match db_err.code().as_deref() {
            Some(SQLSTATE_QUERY_CANCELED) => {
                return StorageError::database_timeout(message);
            }
            Some(SQLSTATE_INVALID_REGEX) => {
                return StorageError::invalid_regular_expression(message);
            }
            _ => {
                // Fallback on message text for drivers that drop the code.
                if message.contains("statement timeout") {
                    return StorageError::database_timeout(message);
                }
                if let Some(rest) = message.strip_prefix("invalid regular expression:") {
                    return StorageError::invalid_regular_expression(rest.trim());
                }
            }
        }
        return StorageError::internal(message);
    }
    match err {
        sqlx_core::error::Error::RowNotFound => StorageError::no_element("row", "query"),
        sqlx_core::error::Error::PoolTimedOut => {
            StorageError::connection_error("connection pool timed out")
        }
        other => StorageError::connection_error(other.to_string()),
    }
}

/// Whether an error may be swallowed during bootstrap: concurrent starters
/// racing on `CREATE TABLE`/`CREATE INDEX` hit unique-violation and
/// duplicate-table errors that mean the work is already done.
pub fn is_ignorable_init_error(err: &sqlx_core::error::Error) -> bool {
    if let sqlx_core::error::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return IGNORABLE_INIT_CODES.contains(&code.as_ref());
        }
    }
    false
}
