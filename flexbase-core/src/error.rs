// flexbase-core/src/error.rs
use thiserror::Error;

/// Errors returned by the document store and query engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlexError {
    #[error("table does not exist: {0}")]
    TableNotFound(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("duplicate document id: {0}")]
    DuplicateId(f64),

    #[error("invalid document id: {0}")]
    InvalidId(String),

    #[error("index with field path and type [{0}] does not exist")]
    InvalidIndexKey(String),

    #[error("invalid query: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("index pipeline is closed")]
    PipelineClosed,

    #[error("failed to start index pipeline: {0}")]
    PipelineStart(String),
}

impl From<serde_json::Error> for FlexError {
    fn from(err: serde_json::Error) -> Self {
        FlexError::Serialization(err.to_string())
    }
}

impl FlexError {
    /// True for the "something is absent" family of errors
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FlexError::TableNotFound(_) | FlexError::DocumentNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FlexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            FlexError::TableNotFound("users".to_string()).to_string(),
            "table does not exist: users"
        );
        assert_eq!(
            FlexError::InvalidIndexKey("age_string".to_string()).to_string(),
            "index with field path and type [age_string] does not exist"
        );
    }

    #[test]
    fn test_serde_error_conversion() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let flex: FlexError = err.into();
        assert!(matches!(flex, FlexError::Serialization(_)));
    }

    #[test]
    fn test_is_not_found() {
        assert!(FlexError::DocumentNotFound("1".into()).is_not_found());
        assert!(!FlexError::DuplicateId(1.0).is_not_found());
    }
}
