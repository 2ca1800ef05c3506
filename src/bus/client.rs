use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use super::consumer::ConsumerHandle;
use super::dead_letter::DeadLetter;
use super::error::BusError;
use super::schema::SchemaRegistry;
use super::transport::{OutboundRecord, Transport};
use super::{
    CONTENT_TYPE_JSON, HEADER_CONTENT_TYPE, HEADER_RETRY_COUNT, HEADER_TIMESTAMP, HEADER_TRACE_ID,
};
use crate::domain::envelope::{natural_key, EventEnvelope};

/// Handle to the message bus, shared by every component that publishes or
/// consumes. Cloning is cheap and shares the underlying transport.
pub struct MessageBus<T> {
    transport: Arc<T>,
    schemas: Arc<SchemaRegistry>,
}

impl<T> Clone for MessageBus<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            schemas: Arc::clone(&self.schemas),
        }
    }
}

impl<T: Transport> MessageBus<T> {
    pub fn new(transport: T, schemas: SchemaRegistry) -> Self {
        Self {
            transport: Arc::new(transport),
            schemas: Arc::new(schemas),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Validates `message` against the topic schema, wraps it in an
    /// [`EventEnvelope`] and sends it keyed by `key`, or by the message's
    /// natural id when no key is given. No retries happen here.
    pub async fn publish(
        &self,
        topic: &str,
        message: &Value,
        key: Option<&str>,
    ) -> Result<EventEnvelope, BusError> {
        self.publish_traced(topic, message, key, None).await
    }

    /// [`publish`](Self::publish) with a caller-supplied trace id; one is
    /// generated when absent.
    pub async fn publish_traced(
        &self,
        topic: &str,
        message: &Value,
        key: Option<&str>,
        trace_id: Option<&str>,
    ) -> Result<EventEnvelope, BusError> {
        self.publish_envelope(topic, EventEnvelope::new(topic, message.clone()), key, trace_id)
            .await
    }

    /// Publishes a prepared envelope as is. Use it when `occurredAt` must be
    /// the time the fact happened rather than the time of this send, e.g.
    /// when draining the outbox.
    pub async fn publish_envelope(
        &self,
        topic: &str,
        envelope: EventEnvelope,
        key: Option<&str>,
        trace_id: Option<&str>,
    ) -> Result<EventEnvelope, BusError> {
        if let Err(e) = self.schemas.validate(topic, &envelope.payload) {
            log::warn!("Refusing to publish to '{}': {}", topic, e);
            return Err(e.into());
        }

        let key = key
            .map(str::to_owned)
            .or_else(|| natural_key(&envelope.payload))
            .unwrap_or_else(|| envelope.event_id.to_string());
        let headers = message_headers(trace_id, None);
        let payload = envelope.to_bytes()?;

        self.transport
            .send(OutboundRecord {
                topic,
                key: &key,
                headers: &headers,
                payload: &payload,
            })
            .await?;

        log::debug!(
            "Published {} to '{}' (key {})",
            envelope.event_id,
            topic,
            key
        );
        Ok(envelope)
    }

    /// Sends a dead letter to `<original topic>.dlq`. Dead-letter topics have
    /// no schema and carry the [`DeadLetter`] body without an envelope.
    pub async fn send_dead_letter(
        &self,
        letter: &DeadLetter,
        key: Option<&str>,
        trace_id: Option<&str>,
    ) -> Result<(), BusError> {
        let topic = letter.topic();
        let key = key
            .map(str::to_owned)
            .or_else(|| natural_key(&letter.original_message))
            .unwrap_or_else(|| letter.original_topic.clone());
        let headers = message_headers(trace_id, Some(letter.retry_count));
        let payload = serde_json::to_vec(letter)?;

        self.transport
            .send(OutboundRecord {
                topic: &topic,
                key: &key,
                headers: &headers,
                payload: &payload,
            })
            .await?;

        log::warn!(
            "Dead-lettered message from '{}' to '{}' (retry {}): {}",
            letter.original_topic,
            topic,
            letter.retry_count,
            letter.error
        );
        Ok(())
    }

    /// Creates a member of consumer group `group_id` for `topics`. Call
    /// [`ConsumerHandle::subscribe`] (or just `run`) to start receiving.
    pub fn create_consumer<I, S>(&self, group_id: &str, topics: I) -> Result<ConsumerHandle<T>, BusError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let source = self.transport.open_source(group_id)?;
        Ok(ConsumerHandle::new(
            self.clone(),
            source,
            group_id,
            topics.into_iter().map(Into::into).collect(),
        ))
    }

    /// Flushes the producer. Consumers are closed by their own handles.
    pub async fn disconnect(&self) -> Result<(), BusError> {
        self.transport.flush().await?;
        log::info!("Message bus producer flushed");
        Ok(())
    }
}

fn message_headers(trace_id: Option<&str>, retry_count: Option<u32>) -> Vec<(String, String)> {
    let trace_id = trace_id
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut headers = vec![
        (HEADER_CONTENT_TYPE.to_string(), CONTENT_TYPE_JSON.to_string()),
        (
            HEADER_TIMESTAMP.to_string(),
            Utc::now().timestamp_millis().to_string(),
        ),
        (HEADER_TRACE_ID.to_string(), trace_id),
    ];
    if let Some(count) = retry_count {
        headers.push((HEADER_RETRY_COUNT.to_string(), count.to_string()));
    }
    headers
}
