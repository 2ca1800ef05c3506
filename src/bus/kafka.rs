//! Kafka transport on top of librdkafka.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};

use super::error::BusError;
use super::transport::{InboundMessage, MessageSource, OutboundRecord, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaConfig {
    pub brokers: String,
    pub client_id: String,
    /// librdkafka `compression.type`, e.g. `gzip`.
    pub compression: String,
    pub send_timeout: Duration,
    pub session_timeout: Duration,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            client_id: "event-pipeline".to_string(),
            compression: "gzip".to_string(),
            send_timeout: Duration::from_secs(5),
            session_timeout: Duration::from_secs(30),
        }
    }
}

pub struct KafkaTransport {
    producer: FutureProducer,
    config: KafkaConfig,
}

impl KafkaTransport {
    /// Builds the producer. librdkafka connects lazily, so broker outages
    /// surface on the first send rather than here.
    pub fn connect(config: KafkaConfig) -> Result<Self, BusError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", &config.client_id)
            .set("compression.type", &config.compression)
            .set("enable.idempotence", "true")
            .set("message.timeout.ms", config.send_timeout.as_millis().to_string())
            .create()?;

        log::info!(
            "Kafka producer configured for {} (compression: {})",
            config.brokers,
            config.compression
        );
        Ok(Self { producer, config })
    }
}

#[async_trait]
impl Transport for KafkaTransport {
    type Source = KafkaSource;

    async fn send(&self, record: OutboundRecord<'_>) -> Result<(), BusError> {
        let headers = record
            .headers
            .iter()
            .fold(OwnedHeaders::new(), |headers, (key, value)| {
                headers.insert(Header {
                    key: key.as_str(),
                    value: Some(value.as_str()),
                })
            });

        let future_record = FutureRecord::to(record.topic)
            .key(record.key)
            .payload(record.payload)
            .headers(headers);

        self.producer
            .send(future_record, self.config.send_timeout)
            .await
            .map(|(partition, offset)| {
                log::debug!(
                    "Delivered to {} [{}] @ {}",
                    record.topic,
                    partition,
                    offset
                );
            })
            .map_err(|(e, _)| BusError::Unavailable(e.to_string()))
    }

    fn open_source(&self, group_id: &str) -> Result<KafkaSource, BusError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .set("group.id", group_id)
            .set("client.id", &self.config.client_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "latest")
            .set("enable.partition.eof", "false")
            .set(
                "session.timeout.ms",
                self.config.session_timeout.as_millis().to_string(),
            )
            .create()?;

        Ok(KafkaSource {
            consumer,
            group_id: group_id.to_string(),
        })
    }

    async fn flush(&self) -> Result<(), BusError> {
        self.producer.flush(self.config.send_timeout)?;
        Ok(())
    }
}

pub struct KafkaSource {
    consumer: StreamConsumer,
    group_id: String,
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), BusError> {
        let topics: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.consumer.subscribe(&topics)?;
        log::info!("Consumer group '{}' subscribed to {:?}", self.group_id, topics);
        Ok(())
    }

    async fn recv(&mut self) -> Result<InboundMessage, BusError> {
        let message = self.consumer.recv().await?;

        let headers = message
            .headers()
            .map(|headers| {
                headers
                    .iter()
                    .map(|h| {
                        let value = h
                            .value
                            .map(|v| String::from_utf8_lossy(v).into_owned())
                            .unwrap_or_default();
                        (h.key.to_string(), value)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(InboundMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message
                .key()
                .map(|k| String::from_utf8_lossy(k).into_owned()),
            headers,
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }

    fn commit(&self, topic: &str, partition: i32, next_offset: i64) -> Result<(), BusError> {
        let mut offsets = TopicPartitionList::new();
        offsets.add_partition_offset(topic, partition, Offset::Offset(next_offset))?;
        self.consumer.commit(&offsets, CommitMode::Async)?;
        Ok(())
    }

    async fn close(&mut self) {
        self.consumer.unsubscribe();
        log::info!("Consumer group '{}' unsubscribed", self.group_id);
    }
}
