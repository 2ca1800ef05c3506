use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Bool, Float4, Nullable, Text, Timestamptz, Varchar};
use serde_json::Value;

use crate::domain::errors::DomainError;
use crate::domain::outbox::{NewOutboxEvent, OutboxEvent};
use crate::domain::search::{SearchHit, SearchIndexRecord};
use crate::schema::{outbox_events, search_index};

#[derive(Debug, Clone, Queryable, QueryableByName, Selectable, Identifiable)]
#[diesel(table_name = outbox_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OutboxEventRow {
    pub id: i64,
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub event_type: String,
    pub payload: Value,
    pub occurred_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub retries: i32,
    pub max_retries: i32,
    pub error_message: Option<String>,
    pub trace_id: Option<String>,
    pub claimed_by: Option<String>,
    pub claimed_until: Option<DateTime<Utc>>,
}

impl From<OutboxEventRow> for OutboxEvent {
    fn from(row: OutboxEventRow) -> Self {
        OutboxEvent {
            id: row.id,
            aggregate_id: row.aggregate_id,
            aggregate_type: row.aggregate_type,
            event_type: row.event_type,
            payload: row.payload,
            occurred_at: row.occurred_at,
            processed_at: row.processed_at,
            published_at: row.published_at,
            retries: row.retries,
            max_retries: row.max_retries,
            error_message: row.error_message,
            trace_id: row.trace_id,
        }
    }
}

/// `None` fields fall back to the column default.
#[derive(Debug, Insertable)]
#[diesel(table_name = outbox_events)]
pub struct NewOutboxEventRow<'a> {
    pub aggregate_id: &'a str,
    pub aggregate_type: &'a str,
    pub event_type: &'a str,
    pub payload: &'a Value,
    pub trace_id: Option<&'a str>,
    pub max_retries: Option<i32>,
}

impl<'a> From<&'a NewOutboxEvent> for NewOutboxEventRow<'a> {
    fn from(event: &'a NewOutboxEvent) -> Self {
        NewOutboxEventRow {
            aggregate_id: &event.aggregate_id,
            aggregate_type: &event.aggregate_type,
            event_type: &event.event_type,
            payload: &event.payload,
            trace_id: event.trace_id.as_deref(),
            max_retries: event.max_retries,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = search_index)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SearchIndexRow {
    pub id: i64,
    pub entity_id: String,
    pub entity_type: String,
    pub content: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SearchIndexRow> for SearchIndexRecord {
    type Error = DomainError;

    fn try_from(row: SearchIndexRow) -> Result<Self, Self::Error> {
        Ok(SearchIndexRecord {
            entity_type: row.entity_type.parse()?,
            entity_id: row.entity_id,
            content: row.content,
            title: row.title,
            author: row.author,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// One ranked row of a full-text query.
#[derive(Debug, Clone, QueryableByName)]
pub struct SearchHitRow {
    #[diesel(sql_type = Varchar)]
    pub entity_id: String,
    #[diesel(sql_type = Varchar)]
    pub entity_type: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub content: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub title: Option<String>,
    #[diesel(sql_type = Nullable<Varchar>)]
    pub author: Option<String>,
    #[diesel(sql_type = Timestamptz)]
    pub created_at: DateTime<Utc>,
    #[diesel(sql_type = Timestamptz)]
    pub updated_at: DateTime<Utc>,
    #[diesel(sql_type = Float4)]
    pub rank: f32,
}

impl TryFrom<SearchHitRow> for SearchHit {
    type Error = DomainError;

    fn try_from(row: SearchHitRow) -> Result<Self, Self::Error> {
        Ok(SearchHit {
            entity_type: row.entity_type.parse()?,
            id: row.entity_id,
            content: row.content,
            title: row.title,
            author: row.author,
            created_at: row.created_at,
            updated_at: row.updated_at,
            rank: row.rank,
        })
    }
}

/// Whether an upsert's event is now the row's latest.
#[derive(Debug, QueryableByName)]
pub struct UpsertRow {
    #[diesel(sql_type = Bool)]
    pub applied: bool,
}

#[derive(Debug, QueryableByName)]
pub struct CountRow {
    #[diesel(sql_type = BigInt)]
    pub total: i64,
}
