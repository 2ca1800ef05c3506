use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("message for topic '{topic}' failed schema validation: {}", errors.join("; "))]
pub struct SchemaValidationError {
    pub topic: String,
    pub errors: Vec<String>,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error(transparent)]
    SchemaValidation(#[from] SchemaValidationError),

    #[error("Message bus unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BusError {
    pub fn is_schema_violation(&self) -> bool {
        matches!(self, BusError::SchemaValidation(_))
    }
}

impl From<rdkafka::error::KafkaError> for BusError {
    fn from(e: rdkafka::error::KafkaError) -> Self {
        BusError::Unavailable(e.to_string())
    }
}

/// A consumer's business logic rejected a message.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Handler failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_lists_every_violation() {
        let err = SchemaValidationError {
            topic: "comment.created".to_string(),
            errors: vec!["missing required field 'content'".to_string(), "x".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "message for topic 'comment.created' failed schema validation: missing required field 'content'; x"
        );
    }

    #[test]
    fn schema_violation_is_not_transient() {
        let err: BusError = SchemaValidationError {
            topic: "t".to_string(),
            errors: vec![],
        }
        .into();
        assert!(err.is_schema_violation());
        assert!(!BusError::Unavailable("down".to_string()).is_schema_violation());
    }
}
