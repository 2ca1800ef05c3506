use chrono::{DateTime, Utc};

use super::errors::DomainError;
use super::outbox::{AttemptRecord, ClaimRequest, NewOutboxEvent, OutboxEvent};
use super::search::{
    EntityType, IndexDocument, IndexOutcome, SearchHit, SearchIndexRecord, SearchQuery, UpsertMode,
};

pub trait OutboxRepository: Send + Sync + 'static {
    /// Stages one event and returns its store-assigned id.
    fn save_event(&self, event: NewOutboxEvent) -> Result<i64, DomainError>;

    /// Claims up to `batch_size` eligible rows, oldest first, skipping rows
    /// another claimer holds.
    fn claim_batch(&self, request: &ClaimRequest) -> Result<Vec<OutboxEvent>, DomainError>;

    /// Both marks apply only while `claimer` still holds the row's claim;
    /// otherwise they fail with [`DomainError::ClaimLost`] and change nothing.
    fn mark_published(&self, id: i64, claimer: &str) -> Result<(), DomainError>;

    fn mark_failed(&self, id: i64, claimer: &str, error: &str) -> Result<AttemptRecord, DomainError>;

    /// Resets exhausted rows so they are published again. Returns how many.
    fn replay_failed(&self) -> Result<usize, DomainError>;

    fn find_by_id(&self, id: i64) -> Result<Option<OutboxEvent>, DomainError>;
}

pub trait SearchIndexRepository: Send + Sync + 'static {
    fn upsert(&self, document: &IndexDocument, mode: UpsertMode)
        -> Result<IndexOutcome, DomainError>;

    fn delete(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<IndexOutcome, DomainError>;

    fn find(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Option<SearchIndexRecord>, DomainError>;

    fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, DomainError>;

    fn count_search_results(
        &self,
        query: &str,
        entity_type: Option<EntityType>,
    ) -> Result<i64, DomainError>;
}
