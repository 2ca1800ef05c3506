//! Message bus client: schema-checked publish, manually committed consume,
//! dead-letter routing. Transport details stay behind [`Transport`].

pub mod client;
pub mod consumer;
pub mod dead_letter;
pub mod error;
pub mod kafka;
pub mod memory;
pub mod schema;
pub mod transport;

pub use client::MessageBus;
pub use consumer::{ConsumedMessage, ConsumerHandle, Delivery, MessageHandler};
pub use dead_letter::{dlq_topic, DeadLetter};
pub use error::{BusError, HandlerError, SchemaValidationError};
pub use kafka::{KafkaConfig, KafkaTransport};
pub use memory::InMemoryTransport;
pub use schema::{FieldKind, FieldRule, SchemaRegistry, TopicSchema};
pub use transport::{InboundMessage, MessageSource, OutboundRecord, Transport};

pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_TIMESTAMP: &str = "timestamp";
pub const HEADER_TRACE_ID: &str = "x-trace-id";
pub const HEADER_RETRY_COUNT: &str = "x-retry-count";
pub const CONTENT_TYPE_JSON: &str = "application/json";
