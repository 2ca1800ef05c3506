//! Dead-letter handling: publishing poison messages and watching `*.dlq`.
//!
//! Dead letters are only logged here. Moving one back onto its original
//! topic is an operator decision.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::bus::dead_letter::{dlq_topic, retry_count_of};
use crate::bus::{
    BusError, ConsumedMessage, ConsumerHandle, DeadLetter, HandlerError, MessageBus,
    MessageHandler, Transport,
};
use crate::domain::events::domain_topics;

/// The `*.dlq` topics the processor watches.
pub fn dlq_topics() -> Vec<String> {
    domain_topics().iter().map(|t| dlq_topic(t)).collect()
}

pub struct DeadLetterHandler<T> {
    bus: MessageBus<T>,
}

impl<T: Transport> DeadLetterHandler<T> {
    pub fn new(bus: MessageBus<T>) -> Self {
        Self { bus }
    }

    /// Publishes `message` to `<topic>.dlq` with the error and an incremented
    /// retry count.
    pub async fn handle_poison_message(
        &self,
        topic: &str,
        message: Value,
        error: &str,
    ) -> Result<DeadLetter, BusError> {
        let previous = retry_count_of(&message);
        let letter = DeadLetter::for_failure(topic, message, error, previous);
        self.bus.send_dead_letter(&letter, None, None).await?;
        Ok(letter)
    }

    /// A consumer in `group_id` over every `*.dlq` topic. Run it with a
    /// [`DeadLetterLogger`].
    pub fn setup_dlq_processor(&self, group_id: &str) -> Result<ConsumerHandle<T>, BusError> {
        self.bus.create_consumer(group_id, dlq_topics())
    }
}

/// Logs every dead letter it sees. Never fails, so nothing it receives is
/// dead-lettered again.
#[derive(Debug, Default)]
pub struct DeadLetterLogger {
    seen: AtomicU64,
}

impl DeadLetterLogger {
    pub fn seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessageHandler for DeadLetterLogger {
    async fn handle(&self, message: &ConsumedMessage) -> Result<(), HandlerError> {
        self.seen.fetch_add(1, Ordering::Relaxed);
        match serde_json::from_value::<DeadLetter>(message.value.clone()) {
            Ok(letter) => log::warn!(
                "Dead letter on '{}' @ {}: from '{}' at {} (retry {}): {}{}",
                message.topic,
                message.offset,
                letter.original_topic,
                letter.timestamp.to_rfc3339(),
                letter.retry_count,
                letter.error,
                if letter.validation_errors.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", letter.validation_errors.join("; "))
                }
            ),
            Err(e) => log::warn!(
                "Unrecognised message on '{}' @ {} ({}): {}",
                message.topic,
                message.offset,
                e,
                message.value
            ),
        }
        Ok(())
    }
}

/// Runs the DLQ processor as `group_id` until `shutdown` fires.
pub async fn run_dlq_processor<T: Transport>(
    bus: &MessageBus<T>,
    group_id: &str,
    shutdown: CancellationToken,
) -> Result<(), BusError> {
    let handler = DeadLetterHandler::new(bus.clone());
    let mut consumer = handler.setup_dlq_processor(group_id)?.with_shutdown(shutdown);
    consumer.run(&DeadLetterLogger::default()).await
}
