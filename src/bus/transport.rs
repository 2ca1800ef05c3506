use async_trait::async_trait;

use super::error::BusError;

/// A record handed to the transport for delivery.
#[derive(Debug, Clone, Copy)]
pub struct OutboundRecord<'a> {
    pub topic: &'a str,
    pub key: &'a str,
    pub headers: &'a [(String, String)],
    pub payload: &'a [u8],
}

/// A record received from the transport, detached from any client buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub headers: Vec<(String, String)>,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The producing side of a bus, plus a factory for consumer-group sources.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Source: MessageSource + 'static;

    async fn send(&self, record: OutboundRecord<'_>) -> Result<(), BusError>;

    /// Opens a source that joins `group_id`. Nothing is consumed until
    /// [`MessageSource::subscribe`] is called.
    fn open_source(&self, group_id: &str) -> Result<Self::Source, BusError>;

    /// Delivers anything still buffered on the producer.
    async fn flush(&self) -> Result<(), BusError>;
}

/// One consumer-group member.
#[async_trait]
pub trait MessageSource: Send {
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), BusError>;

    /// Waits for the next message.
    async fn recv(&mut self) -> Result<InboundMessage, BusError>;

    /// Commits `next_offset` (the offset of the next message to read) for
    /// one partition of the group.
    fn commit(&self, topic: &str, partition: i32, next_offset: i64) -> Result<(), BusError>;

    async fn close(&mut self);
}
