//! Error types for Deskwire

/// Result type alias using Deskwire's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Deskwire operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input rejected before any write happened
    #[error("validation error: {0}")]
    Validation(String),

    /// A ticket or notice id that does not exist
    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helpers_and_messages() {
        assert!(matches!(Error::validation("empty title"), Error::Validation(_)));
        assert_eq!(Error::not_found("notice 3").to_string(), "not found: notice 3");
    }
}
