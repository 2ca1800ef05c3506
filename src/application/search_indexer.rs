//! Keeps the search index in step with domain events.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::normalizer::normalize;
use super::run_blocking;
use crate::bus::{BusError, ConsumedMessage, HandlerError, MessageBus, MessageHandler, Transport};
use crate::domain::envelope::EventEnvelope;
use crate::domain::events::{domain_topics, Action, CanonicalKind, CanonicalPayload, NormalizedEvent};
use crate::domain::ports::SearchIndexRepository;
use crate::domain::search::{IndexDocument, IndexOutcome, UpsertMode};

pub struct SearchIndexer<R: ?Sized> {
    repo: Arc<R>,
}

impl<R: SearchIndexRepository + ?Sized> SearchIndexer<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Applies one event. Returns `None` when the event type is not one the
    /// index cares about.
    pub async fn apply(&self, envelope: &EventEnvelope) -> Result<Option<IndexOutcome>, HandlerError> {
        let event = normalize(&envelope.event_type, &envelope.payload, envelope.occurred_at)
            .map_err(|e| HandlerError::Malformed(e.to_string()))?;

        match event {
            NormalizedEvent::Unmapped { event_type } => {
                log::info!(
                    "Ignoring unmapped event type '{}' ({})",
                    event_type,
                    envelope.event_id
                );
                Ok(None)
            }
            NormalizedEvent::Canonical {
                kind,
                payload,
                occurred_at,
            } => {
                let outcome = self.apply_canonical(kind, payload, occurred_at).await?;
                match outcome {
                    IndexOutcome::Applied => {
                        log::debug!("{} applied ({})", kind, envelope.event_id)
                    }
                    other => log::info!(
                        "{} for {} not applied: {:?} ({})",
                        kind,
                        kind.entity(),
                        other,
                        envelope.event_id
                    ),
                }
                Ok(Some(outcome))
            }
        }
    }

    async fn apply_canonical(
        &self,
        kind: CanonicalKind,
        payload: CanonicalPayload,
        occurred_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<IndexOutcome, HandlerError> {
        let entity_type = kind.entity();
        let result = match kind.action() {
            Action::Created | Action::Updated => {
                let mode = if kind.action() == Action::Created {
                    UpsertMode::Create
                } else {
                    UpsertMode::Update
                };
                let document = IndexDocument {
                    entity_id: payload.id,
                    entity_type,
                    content: payload.content,
                    title: payload.title,
                    author: payload.author_id,
                    occurred_at,
                };
                run_blocking(&self.repo, move |repo| repo.upsert(&document, mode)).await
            }
            Action::Deleted => {
                let id = payload.id;
                run_blocking(&self.repo, move |repo| repo.delete(entity_type, &id, occurred_at))
                    .await
            }
        };
        result.map_err(|e| HandlerError::Failed(e.to_string()))
    }
}

#[async_trait]
impl<R: SearchIndexRepository + ?Sized> MessageHandler for SearchIndexer<R> {
    async fn handle(&self, message: &ConsumedMessage) -> Result<(), HandlerError> {
        let envelope = message.envelope()?;
        self.apply(&envelope).await.map(|_| ())
    }
}

/// Consumes every domain topic as `group_id` until `shutdown` fires.
pub async fn run_search_indexer<T, R>(
    bus: &MessageBus<T>,
    repo: Arc<R>,
    group_id: &str,
    shutdown: CancellationToken,
) -> Result<(), BusError>
where
    T: Transport,
    R: SearchIndexRepository + ?Sized,
{
    let indexer = SearchIndexer::new(repo);
    let mut consumer = bus
        .create_consumer(group_id, domain_topics())?
        .with_shutdown(shutdown);
    consumer.run(&indexer).await
}
