use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DLQ_SUFFIX: &str = ".dlq";

pub fn dlq_topic(topic: &str) -> String {
    format!("{topic}{DLQ_SUFFIX}")
}

pub fn is_dlq_topic(topic: &str) -> bool {
    topic.ends_with(DLQ_SUFFIX)
}

/// What lands on `<topic>.dlq`: the original message plus why it failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub original_topic: String,
    pub original_message: Value,
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
}

impl DeadLetter {
    pub fn new(
        original_topic: impl Into<String>,
        original_message: Value,
        error: impl Into<String>,
        retry_count: u32,
    ) -> Self {
        Self {
            original_topic: original_topic.into(),
            original_message,
            error: error.into(),
            validation_errors: Vec::new(),
            timestamp: Utc::now(),
            retry_count,
        }
    }

    /// Dead letter for a message that had already been dead-lettered
    /// `previous_retries` times.
    pub fn for_failure(
        original_topic: impl Into<String>,
        original_message: Value,
        error: impl Into<String>,
        previous_retries: u32,
    ) -> Self {
        Self::new(
            original_topic,
            original_message,
            error,
            previous_retries.saturating_add(1),
        )
    }

    pub fn with_validation_errors(mut self, errors: Vec<String>) -> Self {
        self.validation_errors = errors;
        self
    }

    pub fn topic(&self) -> String {
        dlq_topic(&self.original_topic)
    }
}

/// Retry count carried in an `x-retry-count` header value, if any.
pub fn retry_count_header(value: Option<&str>) -> u32 {
    value
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(0)
}

/// Retry count carried by a message body (`retryCount`), if any.
pub fn retry_count_of(message: &Value) -> u32 {
    message
        .get("retryCount")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}
