use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// A staged side-effect waiting for (or done with) publication.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEvent {
    pub id: i64,
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub event_type: String,
    pub payload: Value,
    pub occurred_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub retries: i32,
    pub max_retries: i32,
    pub error_message: Option<String>,
    pub trace_id: Option<String>,
}

impl OutboxEvent {
    pub fn is_eligible(&self) -> bool {
        self.processed_at.is_none() && self.published_at.is_none() && !self.is_exhausted()
    }

    pub fn is_exhausted(&self) -> bool {
        self.retries >= self.max_retries
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOutboxEvent {
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub event_type: String,
    pub payload: Value,
    pub trace_id: Option<String>,
    pub max_retries: Option<i32>,
}

impl NewOutboxEvent {
    pub fn new(
        aggregate_id: impl Into<String>,
        aggregate_type: impl Into<String>,
        event_type: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            aggregate_type: aggregate_type.into(),
            event_type: event_type.into(),
            payload,
            trace_id: None,
            max_retries: None,
        }
    }

    pub fn with_trace_id(mut self, trace_id: Option<String>) -> Self {
        self.trace_id = trace_id;
        self
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Result of recording a failed publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptRecord {
    pub retries: i32,
    pub max_retries: i32,
}

impl AttemptRecord {
    pub fn exhausted(&self) -> bool {
        self.retries >= self.max_retries
    }
}

/// Rows a publisher replica holds exclusively until `lease` runs out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    pub claimer: String,
    pub batch_size: i64,
    pub lease: Duration,
}
