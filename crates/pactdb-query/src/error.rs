//! Errors raised during query compilation.

use thiserror::Error;

/// Errors that can occur while compiling a schema to SQL.
///
/// All variants are raised synchronously during compilation and are fatal to
/// the current call. `path` fields carry a JSON-pointer-style location into
/// the offending schema.
#[derive(Debug, Error)]
pub enum QueryBuilderError {
    #[error("Invalid schema at {path}: {message}")]
    InvalidSchema { path: String, message: String },

    #[error("Invalid regular expression at {path}: {pattern}")]
    InvalidRegularExpression { path: String, pattern: String },

    #[error("Invalid limit: {message}")]
    InvalidLimit { message: String },
}

impl QueryBuilderError {
    /// Creates a new `InvalidSchema` error.
    #[must_use]
    pub fn invalid_schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRegularExpression` error.
    #[must_use]
    pub fn invalid_regular_expression(path: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::InvalidRegularExpression {
            path: path.into(),
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
}

/// Result type alias for compilation.
pub type Result<T> = std::result::Result<T, QueryBuilderError>;
