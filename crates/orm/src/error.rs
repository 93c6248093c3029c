//! Error types for the batch loading layer
//!
//! The batch loader is a thin memoization layer over a [`Store`](crate::store::Store):
//! it raises configuration and schema errors of its own and passes every
//! store failure through untouched.

use std::fmt;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// ORM error type alias
pub type OrmError = ModelError;

/// ORM result type alias
pub type OrmResult<T> = ModelResult<T>;

/// Error types for ORM operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Database connection or query error raised by a store
    Database(String),
    /// Record not found in the store
    NotFound(String),
    /// Relationship loading failed
    Relationship(String),
    /// Serialization/deserialization error
    Serialization(String),
    /// Schema error (invalid relation declaration)
    Schema(String),
    /// Query building error
    Query(String),
    /// Configuration error
    Configuration(String),
}

impl ModelError {
    /// Returns true for errors raised by the batch loader's own configuration
    pub fn is_configuration(&self) -> bool {
        matches!(self, ModelError::Configuration(_) | ModelError::Schema(_))
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Database(msg) => write!(f, "Database error: {}", msg),
            ModelError::NotFound(table) => write!(f, "Record not found in table '{}'", table),
            ModelError::Relationship(msg) => write!(f, "Relationship error: {}", msg),
            ModelError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            ModelError::Schema(msg) => write!(f, "Schema error: {}", msg),
            ModelError::Query(msg) => write!(f, "Query error: {}", msg),
            ModelError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ModelError {}

// Convert from serde_json errors
impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModelError::Configuration("unknown relation 'tags'".to_string());
        assert_eq!(err.to_string(), "Configuration error: unknown relation 'tags'");

        let err = ModelError::NotFound("users".to_string());
        assert_eq!(err.to_string(), "Record not found in table 'users'");
    }

    #[test]
    fn test_configuration_classification() {
        assert!(ModelError::Configuration("x".into()).is_configuration());
        assert!(ModelError::Schema("x".into()).is_configuration());
        assert!(!ModelError::Database("x".into()).is_configuration());
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: ModelError = parse.unwrap_err().into();
        assert!(matches!(err, ModelError::Serialization(_)));
    }
}
