//! The wire format shared by every producer and consumer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Payload fields tried, in order, when a publish call does not name a key.
const NATURAL_KEY_FIELDS: &[&str] = &[
    "entity_id",
    "aggregate_id",
    "id",
    "post_id",
    "content_id",
    "user_id",
    "comment_id",
];

/// One event on the bus: `{eventId, eventType, occurredAt, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: Value,
}

impl EventEnvelope {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            occurred_at: Utc::now(),
            payload,
        }
    }

    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = at;
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }
}

/// Picks the partition key a message carries naturally, so events for the
/// same entity land on the same partition.
pub fn natural_key(message: &Value) -> Option<String> {
    let object = message.as_object()?;
    NATURAL_KEY_FIELDS
        .iter()
        .find_map(|field| match object.get(*field)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}
