use thiserror::Error;

/// Core error types for PactDB operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid slug: {0}")]
    InvalidSlug(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("No element found: {kind} {identifier}")]
    NoElement { kind: String, identifier: String },

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("UUID error: {0}")]
    UuidError(#[from] uuid::Error),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),
}

impl CoreError {
    /// Create a new InvalidSlug error
    pub fn invalid_slug(slug: impl Into<String>) -> Self {
        Self::InvalidSlug(slug.into())
    }

    /// Create a new InvalidVersion error
    pub fn invalid_version(version: impl Into<String>) -> Self {
        Self::InvalidVersion(version.into())
    }

    /// Create a new NoElement error
    pub fn no_element(kind: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::NoElement {
            kind: kind.into(),
            identifier: identifier.into(),
        }
    }

    /// Check if this error is a client error (caller supplied bad input)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSlug(_)
                | Self::InvalidVersion(_)
                | Self::NoElement { .. }
                | Self::JsonError(_)
        )
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::invalid_version("1.x.0");
        assert!(err.to_string().contains("Invalid version"));

        let err = CoreError::no_element("contract", "user-admin");
        assert!(err.to_string().contains("user-admin"));
    }

    #[test]
    fn test_client_error_classification() {
        assert!(CoreError::invalid_slug("Bad Slug").is_client_error());
        assert!(CoreError::no_element("session", "x").is_client_error());
    }
}
