use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::client::MessageBus;
use super::dead_letter::{retry_count_header, DeadLetter};
use super::error::{BusError, HandlerError};
use super::transport::{InboundMessage, MessageSource, Transport};
use super::{HEADER_RETRY_COUNT, HEADER_TRACE_ID};
use crate::domain::envelope::EventEnvelope;

const RECV_RETRY_DELAY: Duration = Duration::from_secs(1);

/// A received message that passed parsing and schema checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumedMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub headers: Vec<(String, String)>,
    pub value: Value,
}

impl ConsumedMessage {
    pub fn envelope(&self) -> Result<EventEnvelope, HandlerError> {
        EventEnvelope::from_value(&self.value).map_err(|e| {
            HandlerError::Malformed(format!("expected an event envelope on '{}': {e}", self.topic))
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &ConsumedMessage) -> Result<(), HandlerError>;
}

/// How one message left the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handler succeeded and the offset was committed.
    Committed,
    /// Unparseable or schema-invalid; dead-lettered, handler not called.
    Rejected,
    /// Handler returned an error; dead-lettered, offset not committed.
    HandlerFailed,
}

/// One consumer-group member with explicit offset commits.
///
/// An offset is committed only after the handler returns `Ok`, so a crash
/// mid-handler leads to redelivery (at-least-once).
pub struct ConsumerHandle<T: Transport> {
    bus: MessageBus<T>,
    source: T::Source,
    group_id: String,
    topics: Vec<String>,
    subscribed: bool,
    shutdown: CancellationToken,
}

impl<T: Transport> ConsumerHandle<T> {
    pub(crate) fn new(
        bus: MessageBus<T>,
        source: T::Source,
        group_id: &str,
        topics: Vec<String>,
    ) -> Self {
        Self {
            bus,
            source,
            group_id: group_id.to_string(),
            topics,
            subscribed: false,
            shutdown: CancellationToken::new(),
        }
    }

    /// Ties the run loop to an external shutdown token.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Clone of the token [`stop`](Self::stop) cancels; lets another task stop
    /// a consumer that is busy in `run`.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Joins the group's topics, starting from the committed offset or, for a
    /// new group, from the current end of each topic.
    pub async fn subscribe(&mut self) -> Result<(), BusError> {
        if !self.subscribed {
            self.source.subscribe(&self.topics).await?;
            self.subscribed = true;
        }
        Ok(())
    }

    /// Stops `run` before the next message. An in-flight handler finishes
    /// and commits first.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Receives until stopped, dispatching each message to `handler`.
    pub async fn run<H>(&mut self, handler: &H) -> Result<(), BusError>
    where
        H: MessageHandler + ?Sized,
    {
        self.subscribe().await?;
        log::info!(
            "Consumer group '{}' running on {:?}",
            self.group_id,
            self.topics
        );

        loop {
            let received = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                received = self.source.recv() => received,
            };

            match received {
                Ok(message) => {
                    self.process(handler, message).await;
                }
                Err(e) => {
                    log::error!("Consumer group '{}' receive failed: {}", self.group_id, e);
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RECV_RETRY_DELAY) => {}
                    }
                }
            }
        }

        self.source.close().await;
        log::info!("Consumer group '{}' stopped", self.group_id);
        Ok(())
    }

    /// Parses, validates and dispatches one message.
    pub async fn process<H>(&mut self, handler: &H, message: InboundMessage) -> Delivery
    where
        H: MessageHandler + ?Sized,
    {
        let value: Value = match serde_json::from_slice(&message.payload) {
            Ok(value) => value,
            Err(e) => {
                let raw = Value::String(String::from_utf8_lossy(&message.payload).into_owned());
                self.dead_letter(&message, raw, format!("invalid JSON: {e}"), Vec::new())
                    .await;
                return Delivery::Rejected;
            }
        };

        if let Err(e) = self.bus.schemas().validate_inbound(&message.topic, &value) {
            let reason = e.to_string();
            self.dead_letter(&message, value, reason, e.errors).await;
            return Delivery::Rejected;
        }

        let consumed = ConsumedMessage {
            topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
            key: message.key.clone(),
            headers: message.headers.clone(),
            value,
        };

        match handler.handle(&consumed).await {
            Ok(()) => {
                let next = message.offset + 1;
                if let Err(e) = self.source.commit(&message.topic, message.partition, next) {
                    // The message was handled; a lost commit only means a
                    // redelivery, which handlers tolerate.
                    log::error!(
                        "Commit of {} [{}] @ {} failed: {}",
                        message.topic,
                        message.partition,
                        next,
                        e
                    );
                }
                Delivery::Committed
            }
            Err(e) => {
                log::error!(
                    "Handler failed on {} [{}] @ {}: {}",
                    message.topic,
                    message.partition,
                    message.offset,
                    e
                );
                self.dead_letter(&message, consumed.value, e.to_string(), Vec::new())
                    .await;
                Delivery::HandlerFailed
            }
        }
    }

    async fn dead_letter(
        &self,
        message: &InboundMessage,
        original: Value,
        error: String,
        validation_errors: Vec<String>,
    ) {
        let previous = retry_count_header(message.header(HEADER_RETRY_COUNT));
        let letter = DeadLetter::for_failure(&message.topic, original, error, previous)
            .with_validation_errors(validation_errors);

        if let Err(e) = self
            .bus
            .send_dead_letter(&letter, message.key.as_deref(), message.header(HEADER_TRACE_ID))
            .await
        {
            // Left uncommitted, so it comes back after a restart.
            log::error!(
                "Could not dead-letter {} [{}] @ {}: {}",
                message.topic,
                message.partition,
                message.offset,
                e
            );
        }
    }
}
