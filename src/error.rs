//! Error kinds surfaced by the generation pipeline.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// Schema absent, malformed, or unreadable.
    #[error("Schema error: {0}")]
    Schema(String),
    /// Provider absent, malformed response, or call failure/timeout.
    #[error("Provider error: {0}")]
    Provider(String),
    /// Extraction or pipeline failure not attributable to schema or provider.
    #[error("Generation error: {0}")]
    Generation(String),
    /// Raised only by callers that turn a failed verdict into an error.
    #[error("Validation error: {}", .0.join("; "))]
    Validation(Vec<String>),
}

impl Error {
    pub fn schema(message: impl Into<String>) -> Self {
        Error::Schema(message.into())
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Error::Provider(message.into())
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Error::Generation(message.into())
    }

    /// Short name of the error kind, used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Schema(_) => "SchemaError",
            Error::Provider(_) => "ProviderError",
            Error::Generation(_) => "GenerationError",
            Error::Validation(_) => "ValidationError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_keeps_message() {
        let e = Error::provider("connection refused");
        assert_eq!(e.to_string(), "Provider error: connection refused");
        assert_eq!(e.kind(), "ProviderError");
    }

    #[test]
    fn test_validation_joins_errors() {
        let e = Error::Validation(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(e.to_string(), "Validation error: a; b");
    }
}
