use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Nullable, Text, Timestamptz, Varchar};

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::ports::SearchIndexRepository;
use crate::domain::search::{
    EntityType, IndexDocument, IndexOutcome, SearchHit, SearchIndexRecord, SearchQuery, UpsertMode,
};
use crate::schema::{search_index, search_index_tombstones};

use super::models::{CountRow, SearchHitRow, SearchIndexRow, UpsertRow};

/// Merges field by field: the newer event wins every field it carries, and
/// the older one only fills fields the row still lacks. `applied` is false
/// when the stored row was newer.
const UPSERT_SQL: &str = r#"
INSERT INTO search_index (entity_id, entity_type, content, title, author, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $6, $6)
ON CONFLICT (entity_id, entity_type) DO UPDATE SET
    content = CASE WHEN search_index.updated_at <= EXCLUDED.updated_at
                   THEN COALESCE(EXCLUDED.content, search_index.content)
                   ELSE COALESCE(search_index.content, EXCLUDED.content) END,
    title = CASE WHEN search_index.updated_at <= EXCLUDED.updated_at
                 THEN COALESCE(EXCLUDED.title, search_index.title)
                 ELSE COALESCE(search_index.title, EXCLUDED.title) END,
    author = CASE WHEN search_index.updated_at <= EXCLUDED.updated_at
                  THEN COALESCE(EXCLUDED.author, search_index.author)
                  ELSE COALESCE(search_index.author, EXCLUDED.author) END,
    created_at = LEAST(search_index.created_at, EXCLUDED.created_at),
    updated_at = GREATEST(search_index.updated_at, EXCLUDED.updated_at)
RETURNING updated_at = $6 AS applied
"#;

const TOMBSTONE_SQL: &str = r#"
INSERT INTO search_index_tombstones (entity_id, entity_type, deleted_at)
VALUES ($1, $2, $3)
ON CONFLICT (entity_id, entity_type) DO UPDATE SET
    deleted_at = GREATEST(search_index_tombstones.deleted_at, EXCLUDED.deleted_at)
"#;

const SEARCH_SQL: &str = r#"
SELECT entity_id, entity_type, content, title, author, created_at, updated_at,
       ts_rank(search_vector, plainto_tsquery('english', $1)) AS rank
FROM search_index
WHERE search_vector @@ plainto_tsquery('english', $1)
  AND ($2::varchar IS NULL OR entity_type = $2)
ORDER BY rank DESC, updated_at DESC
LIMIT $3 OFFSET $4
"#;

const COUNT_SQL: &str = r#"
SELECT COUNT(*) AS total
FROM search_index
WHERE search_vector @@ plainto_tsquery('english', $1)
  AND ($2::varchar IS NULL OR entity_type = $2)
"#;

pub struct DieselSearchIndexRepository {
    pool: DbPool,
}

impl DieselSearchIndexRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl SearchIndexRepository for DieselSearchIndexRepository {
    fn upsert(
        &self,
        document: &IndexDocument,
        mode: UpsertMode,
    ) -> Result<IndexOutcome, DomainError> {
        let mut conn = self.pool.get()?;
        let entity_type = document.entity_type.as_str();

        conn.transaction::<_, DomainError, _>(|conn| {
            let tombstone: Option<DateTime<Utc>> = search_index_tombstones::table
                .find((document.entity_id.as_str(), entity_type))
                .select(search_index_tombstones::deleted_at)
                .for_update()
                .first(conn)
                .optional()?;

            if let Some(deleted_at) = tombstone {
                // Only a create that happened after the delete brings it back.
                if mode == UpsertMode::Update || document.occurred_at <= deleted_at {
                    return Ok(IndexOutcome::Tombstoned);
                }
                diesel::delete(
                    search_index_tombstones::table
                        .find((document.entity_id.as_str(), entity_type)),
                )
                .execute(conn)?;
            }

            let row: UpsertRow = diesel::sql_query(UPSERT_SQL)
                .bind::<Varchar, _>(&document.entity_id)
                .bind::<Varchar, _>(entity_type)
                .bind::<Nullable<Text>, _>(document.content.as_deref())
                .bind::<Nullable<Text>, _>(document.title.as_deref())
                .bind::<Nullable<Varchar>, _>(document.author.as_deref())
                .bind::<Timestamptz, _>(document.occurred_at)
                .get_result(conn)?;

            Ok(if row.applied {
                IndexOutcome::Applied
            } else {
                IndexOutcome::Stale
            })
        })
    }

    fn delete(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<IndexOutcome, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let stored: Option<DateTime<Utc>> = search_index::table
                .filter(search_index::entity_id.eq(entity_id))
                .filter(search_index::entity_type.eq(entity_type.as_str()))
                .select(search_index::updated_at)
                .for_update()
                .first(conn)
                .optional()?;

            let outcome = match stored {
                Some(updated_at) if updated_at > occurred_at => return Ok(IndexOutcome::Stale),
                Some(_) => {
                    diesel::delete(
                        search_index::table
                            .filter(search_index::entity_id.eq(entity_id))
                            .filter(search_index::entity_type.eq(entity_type.as_str())),
                    )
                    .execute(conn)?;
                    IndexOutcome::Applied
                }
                None => IndexOutcome::Missing,
            };

            diesel::sql_query(TOMBSTONE_SQL)
                .bind::<Varchar, _>(entity_id)
                .bind::<Varchar, _>(entity_type.as_str())
                .bind::<Timestamptz, _>(occurred_at)
                .execute(conn)?;

            Ok(outcome)
        })
    }

    fn find(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Option<SearchIndexRecord>, DomainError> {
        let mut conn = self.pool.get()?;

        let row = search_index::table
            .filter(search_index::entity_id.eq(entity_id))
            .filter(search_index::entity_type.eq(entity_type.as_str()))
            .select(SearchIndexRow::as_select())
            .first(&mut conn)
            .optional()?;

        row.map(SearchIndexRecord::try_from).transpose()
    }

    fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, DomainError> {
        let mut conn = self.pool.get()?;

        let rows: Vec<SearchHitRow> = diesel::sql_query(SEARCH_SQL)
            .bind::<Text, _>(&query.query)
            .bind::<Nullable<Varchar>, _>(query.entity_type.map(|t| t.as_str()))
            .bind::<BigInt, _>(query.limit)
            .bind::<BigInt, _>(query.offset)
            .load(&mut conn)?;

        rows.into_iter().map(SearchHit::try_from).collect()
    }

    fn count_search_results(
        &self,
        query: &str,
        entity_type: Option<EntityType>,
    ) -> Result<i64, DomainError> {
        let mut conn = self.pool.get()?;

        let row: CountRow = diesel::sql_query(COUNT_SQL)
            .bind::<Text, _>(query)
            .bind::<Nullable<Varchar>, _>(entity_type.map(|t| t.as_str()))
            .get_result(&mut conn)?;

        Ok(row.total)
    }
}
