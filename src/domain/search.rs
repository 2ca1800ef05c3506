use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Post,
    User,
    Comment,
}

impl EntityType {
    pub const ALL: [EntityType; 3] = [EntityType::Post, EntityType::User, EntityType::Comment];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Post => "post",
            EntityType::User => "user",
            EntityType::Comment => "comment",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "post" => Ok(EntityType::Post),
            "user" => Ok(EntityType::User),
            "comment" => Ok(EntityType::Comment),
            other => Err(DomainError::InvalidInput(format!(
                "unknown entity type '{other}'"
            ))),
        }
    }
}

/// A row of the derived search index, unique per `(entity_id, entity_type)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchIndexRecord {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub content: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What the indexer asks the store to upsert.
///
/// `occurred_at` is the source event's timestamp; it becomes the stored
/// `updated_at` and guards against stale or resurrecting writes.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub content: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Whether an upsert comes from a `*_CREATED` or a `*_UPDATED` event.
///
/// Only a create may bring a deleted key back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
    Create,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// The write changed (or re-confirmed) the stored state.
    Applied,
    /// A newer event already shaped the stored row. An older upsert still
    /// fills fields the row lacks.
    Stale,
    /// The key was deleted by a newer event.
    Tombstoned,
    /// Delete of a key that was never indexed.
    Missing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub query: String,
    pub entity_type: Option<EntityType>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub content: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub rank: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults {
    pub results: Vec<SearchHit>,
    pub total: i64,
}
