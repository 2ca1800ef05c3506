//! In-process transport with Kafka-like group offsets.
//!
//! Every topic is a single partition (0). A group's first subscription to a
//! topic pins its committed offset at the current end of the log, so a
//! member that dies before committing is followed by one that re-reads the
//! same messages.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use super::error::BusError;
use super::transport::{InboundMessage, MessageSource, OutboundRecord, Transport};

#[derive(Debug, Clone)]
struct StoredRecord {
    key: String,
    headers: Vec<(String, String)>,
    payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    topics: HashMap<String, Vec<StoredRecord>>,
    /// (group, topic) -> next offset to read.
    committed: HashMap<(String, String), i64>,
    unavailable: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    appended: Notify,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryTransport {
    shared: Arc<Shared>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.shared)
    }

    /// Makes every send fail with [`BusError::Unavailable`] while `true`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Everything ever sent to `topic`, oldest first.
    pub fn messages(&self, topic: &str) -> Vec<InboundMessage> {
        self.state()
            .topics
            .get(topic)
            .map(|records| {
                records
                    .iter()
                    .enumerate()
                    .map(|(offset, r)| to_inbound(topic, offset as i64, r))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Message bodies on `topic` parsed as JSON; unparseable bodies are skipped.
    pub fn json_messages(&self, topic: &str) -> Vec<Value> {
        self.messages(topic)
            .iter()
            .filter_map(|m| serde_json::from_slice(&m.payload).ok())
            .collect()
    }

    pub fn committed_offset(&self, group_id: &str, topic: &str) -> Option<i64> {
        self.state()
            .committed
            .get(&(group_id.to_string(), topic.to_string()))
            .copied()
    }
}

fn lock(shared: &Shared) -> MutexGuard<'_, State> {
    // A panicking test thread must not wedge every other user of the log.
    shared
        .state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn to_inbound(topic: &str, offset: i64, record: &StoredRecord) -> InboundMessage {
    InboundMessage {
        topic: topic.to_string(),
        partition: 0,
        offset,
        key: Some(record.key.clone()),
        headers: record.headers.clone(),
        payload: record.payload.clone(),
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    type Source = InMemorySource;

    async fn send(&self, record: OutboundRecord<'_>) -> Result<(), BusError> {
        {
            let mut state = self.state();
            if state.unavailable {
                return Err(BusError::Unavailable(format!(
                    "in-memory bus is down (topic '{}')",
                    record.topic
                )));
            }
            state
                .topics
                .entry(record.topic.to_string())
                .or_default()
                .push(StoredRecord {
                    key: record.key.to_string(),
                    headers: record.headers.to_vec(),
                    payload: record.payload.to_vec(),
                });
        }
        self.shared.appended.notify_waiters();
        Ok(())
    }

    fn open_source(&self, group_id: &str) -> Result<InMemorySource, BusError> {
        Ok(InMemorySource {
            shared: Arc::clone(&self.shared),
            group_id: group_id.to_string(),
            positions: Vec::new(),
        })
    }

    async fn flush(&self) -> Result<(), BusError> {
        Ok(())
    }
}

pub struct InMemorySource {
    shared: Arc<Shared>,
    group_id: String,
    /// (topic, next offset to read), in subscription order.
    positions: Vec<(String, i64)>,
}

impl InMemorySource {
    fn poll(&mut self) -> Option<InboundMessage> {
        let state = lock(&self.shared);
        for (topic, position) in self.positions.iter_mut() {
            let Some(record) = state
                .topics
                .get(topic.as_str())
                .and_then(|records| records.get(*position as usize))
            else {
                continue;
            };
            let message = to_inbound(topic, *position, record);
            *position += 1;
            return Some(message);
        }
        None
    }
}

#[async_trait]
impl MessageSource for InMemorySource {
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), BusError> {
        let mut state = lock(&self.shared);
        self.positions.clear();
        for topic in topics {
            let end = state.topics.get(topic).map_or(0, Vec::len) as i64;
            let start = *state
                .committed
                .entry((self.group_id.clone(), topic.clone()))
                .or_insert(end);
            self.positions.push((topic.clone(), start));
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<InboundMessage, BusError> {
        let shared = Arc::clone(&self.shared);
        loop {
            // Register interest before looking, so an append between the
            // check and the await still wakes us.
            let appended = shared.appended.notified();
            if let Some(message) = self.poll() {
                return Ok(message);
            }
            appended.await;
        }
    }

    fn commit(&self, topic: &str, _partition: i32, next_offset: i64) -> Result<(), BusError> {
        lock(&self.shared)
            .committed
            .insert((self.group_id.clone(), topic.to_string()), next_offset);
        Ok(())
    }

    async fn close(&mut self) {
        self.positions.clear();
    }
}
