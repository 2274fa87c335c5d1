//! Error types for the service model crate
//!
//! Repository calls return [`RepositoryResult`](crate::repository::RepositoryResult);
//! configuration loading and the glue around it use [`Result`], whose [`Error`]
//! wraps repository errors alongside configuration, I/O and JSON failures.

use crate::repository::RepositoryError;

/// Result type alias for crate-level operations
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Repository error with operation context
    #[error("{0}")]
    Repository(#[from] RepositoryError),

    /// A model name with no `[models.<name>]` section
    #[error("Model not configured: {0}")]
    ModelNotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

impl Error {
    /// The underlying repository error, if any
    pub fn as_repository(&self) -> Option<&RepositoryError> {
        match self {
            Error::Repository(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryErrorKind;

    #[test]
    fn test_repository_error_converts() {
        let err: Error = RepositoryError::invalid_predicate_shape("between expects [low, high]").into();
        assert_eq!(
            err.as_repository().map(|e| e.kind),
            Some(RepositoryErrorKind::InvalidPredicateShape)
        );
        assert!(err.to_string().contains("between expects [low, high]"));
    }

    #[test]
    fn test_model_not_found_display() {
        let err = Error::ModelNotFound("comments".to_string());
        assert_eq!(err.to_string(), "Model not configured: comments");
        assert!(err.as_repository().is_none());
    }

    #[test]
    fn test_json_error_converts() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));
    }
}
