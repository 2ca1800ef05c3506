use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Double, Varchar};

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::outbox::{AttemptRecord, ClaimRequest, NewOutboxEvent, OutboxEvent};
use crate::domain::ports::OutboxRepository;
use crate::schema::outbox_events;

use super::models::{NewOutboxEventRow, OutboxEventRow};

/// Locks the oldest eligible rows, skipping any another transaction holds,
/// and leases them to `$2` for `$3` seconds.
const CLAIM_SQL: &str = r#"
WITH claimable AS (
    SELECT id
    FROM outbox_events
    WHERE processed_at IS NULL
      AND published_at IS NULL
      AND retries < max_retries
      AND (claimed_until IS NULL OR claimed_until < now())
    ORDER BY occurred_at ASC, id ASC
    LIMIT $1
    FOR UPDATE SKIP LOCKED
)
UPDATE outbox_events AS e
SET claimed_by = $2,
    claimed_until = now() + make_interval(secs => $3)
FROM claimable
WHERE e.id = claimable.id
RETURNING e.id, e.aggregate_id, e.aggregate_type, e.event_type, e.payload,
          e.occurred_at, e.processed_at, e.published_at, e.retries,
          e.max_retries, e.error_message, e.trace_id, e.claimed_by,
          e.claimed_until
"#;

/// Stages an outbox row on a caller-owned connection.
///
/// Call this inside the same transaction as the domain write that caused the
/// event: the row becomes visible to publishers only if that transaction
/// commits.
pub fn save_event_in(conn: &mut PgConnection, event: &NewOutboxEvent) -> QueryResult<i64> {
    diesel::insert_into(outbox_events::table)
        .values(NewOutboxEventRow::from(event))
        .returning(outbox_events::id)
        .get_result(conn)
}

/// Why a claim-guarded update touched nothing: the row is gone, or someone
/// else holds it now.
fn unclaimed(conn: &mut PgConnection, id: i64) -> QueryResult<DomainError> {
    use crate::schema::outbox_events::dsl;

    let exists = dsl::outbox_events
        .find(id)
        .select(dsl::id)
        .first::<i64>(conn)
        .optional()?;
    Ok(match exists {
        Some(_) => DomainError::ClaimLost { id },
        None => DomainError::NotFound,
    })
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct DieselOutboxRepository {
    pool: DbPool,
    default_max_retries: Option<i32>,
}

impl DieselOutboxRepository {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            default_max_retries: None,
        }
    }

    /// Retry budget for events that do not set their own.
    pub fn with_default_max_retries(mut self, max_retries: i32) -> Self {
        self.default_max_retries = Some(max_retries);
        self
    }
}

impl OutboxRepository for DieselOutboxRepository {
    fn save_event(&self, mut event: NewOutboxEvent) -> Result<i64, DomainError> {
        event.max_retries = event.max_retries.or(self.default_max_retries);
        let mut conn = self.pool.get()?;
        Ok(save_event_in(&mut conn, &event)?)
    }

    fn claim_batch(&self, request: &ClaimRequest) -> Result<Vec<OutboxEvent>, DomainError> {
        let mut conn = self.pool.get()?;

        let mut rows: Vec<OutboxEventRow> = diesel::sql_query(CLAIM_SQL)
            .bind::<BigInt, _>(request.batch_size)
            .bind::<Varchar, _>(&request.claimer)
            .bind::<Double, _>(request.lease.as_secs_f64())
            .load(&mut conn)?;

        // UPDATE ... RETURNING does not keep the CTE's order.
        rows.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at).then(a.id.cmp(&b.id)));
        Ok(rows.into_iter().map(OutboxEvent::from).collect())
    }

    fn mark_published(&self, id: i64, claimer: &str) -> Result<(), DomainError> {
        use crate::schema::outbox_events::dsl;

        let mut conn = self.pool.get()?;
        let now = Utc::now();
        let updated = diesel::update(dsl::outbox_events.find(id).filter(dsl::claimed_by.eq(claimer)))
            .set((
                dsl::published_at.eq(Some(now)),
                dsl::processed_at.eq(Some(now)),
                dsl::error_message.eq(None::<String>),
                dsl::claimed_by.eq(None::<String>),
                dsl::claimed_until.eq(None::<DateTime<Utc>>),
            ))
            .execute(&mut conn)?;

        if updated == 0 {
            return Err(unclaimed(&mut conn, id)?);
        }
        Ok(())
    }

    fn mark_failed(&self, id: i64, claimer: &str, error: &str) -> Result<AttemptRecord, DomainError> {
        use crate::schema::outbox_events::dsl;

        let mut conn = self.pool.get()?;
        let attempt = diesel::update(dsl::outbox_events.find(id).filter(dsl::claimed_by.eq(claimer)))
            .set((
                dsl::retries.eq(dsl::retries + 1),
                dsl::error_message.eq(Some(error)),
                dsl::claimed_by.eq(None::<String>),
                dsl::claimed_until.eq(None::<DateTime<Utc>>),
            ))
            .returning((dsl::retries, dsl::max_retries))
            .get_result::<(i32, i32)>(&mut conn)
            .optional()?;

        let Some((retries, max_retries)) = attempt else {
            return Err(unclaimed(&mut conn, id)?);
        };
        Ok(AttemptRecord {
            retries,
            max_retries,
        })
    }

    fn replay_failed(&self) -> Result<usize, DomainError> {
        use crate::schema::outbox_events::dsl;

        let mut conn = self.pool.get()?;
        let reset = diesel::update(
            dsl::outbox_events
                .filter(dsl::published_at.is_null())
                .filter(dsl::retries.ge(dsl::max_retries)),
        )
        .set((
            dsl::retries.eq(0),
            dsl::error_message.eq(None::<String>),
            dsl::processed_at.eq(None::<DateTime<Utc>>),
            dsl::claimed_by.eq(None::<String>),
            dsl::claimed_until.eq(None::<DateTime<Utc>>),
        ))
        .execute(&mut conn)?;
        Ok(reset)
    }

    fn find_by_id(&self, id: i64) -> Result<Option<OutboxEvent>, DomainError> {
        let mut conn = self.pool.get()?;

        let row = outbox_events::table
            .find(id)
            .select(OutboxEventRow::as_select())
            .first(&mut conn)
            .optional()?;

        Ok(row.map(OutboxEvent::from))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use diesel::prelude::*;
    use serde_json::json;

    use super::{save_event_in, DieselOutboxRepository};
    use crate::domain::errors::DomainError;
    use crate::domain::outbox::{ClaimRequest, NewOutboxEvent};
    use crate::domain::ports::OutboxRepository;
    use crate::schema::outbox_events;
    use crate::testing::pg::setup_db;

    fn post_created(id: &str) -> NewOutboxEvent {
        NewOutboxEvent::new(
            id,
            "post",
            "post.created",
            json!({"id": id, "content": format!("content of {id}")}),
        )
    }

    fn claim(claimer: &str, batch_size: i64) -> ClaimRequest {
        ClaimRequest {
            claimer: claimer.to_string(),
            batch_size,
            lease: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn save_event_assigns_increasing_ids_and_defaults() {
        let (_container, pool) = setup_db().await;
        let repo = DieselOutboxRepository::new(pool);

        let first = repo.save_event(post_created("p1")).expect("save failed");
        let second = repo
            .save_event(post_created("p2").with_trace_id(Some("trace-1".to_string())))
            .expect("save failed");
        assert!(second > first);

        let event = repo
            .find_by_id(second)
            .expect("find failed")
            .expect("event should exist");
        assert_eq!(event.aggregate_id, "p2");
        assert_eq!(event.retries, 0);
        assert_eq!(event.max_retries, 5);
        assert_eq!(event.trace_id.as_deref(), Some("trace-1"));
        assert!(event.is_eligible());
    }

    #[tokio::test]
    async fn configured_retry_budget_applies_to_events_without_one() {
        let (_container, pool) = setup_db().await;
        let repo = DieselOutboxRepository::new(pool).with_default_max_retries(3);

        let defaulted = repo.save_event(post_created("p1")).expect("save failed");
        let explicit = repo
            .save_event(post_created("p2").with_max_retries(7))
            .expect("save failed");

        let max_retries = |id| repo.find_by_id(id).expect("find").expect("exists").max_retries;
        assert_eq!(max_retries(defaulted), 3);
        assert_eq!(max_retries(explicit), 7);
    }

    #[tokio::test]
    async fn claim_returns_oldest_first_and_respects_batch_size() {
        let (_container, pool) = setup_db().await;
        let repo = DieselOutboxRepository::new(pool);
        for id in ["p1", "p2", "p3"] {
            repo.save_event(post_created(id)).expect("save failed");
        }

        let batch = repo.claim_batch(&claim("w1", 2)).expect("claim failed");
        let ids: Vec<&str> = batch.iter().map(|e| e.aggregate_id.as_str()).collect();
        assert_eq!(ids, ["p1", "p2"]);
    }

    #[tokio::test]
    async fn concurrent_claimers_get_disjoint_rows() {
        let (_container, pool) = setup_db().await;
        let repo = DieselOutboxRepository::new(pool);
        for i in 0..4 {
            repo.save_event(post_created(&format!("p{i}")))
                .expect("save failed");
        }

        let a = repo.claim_batch(&claim("w1", 2)).expect("claim failed");
        let b = repo.claim_batch(&claim("w2", 10)).expect("claim failed");
        let c = repo.claim_batch(&claim("w3", 10)).expect("claim failed");

        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
        assert!(c.is_empty(), "every row is leased");
        assert!(a.iter().all(|x| b.iter().all(|y| x.id != y.id)));
    }

    #[tokio::test]
    async fn published_rows_are_never_claimed_again() {
        let (_container, pool) = setup_db().await;
        let repo = DieselOutboxRepository::new(pool);
        let id = repo.save_event(post_created("p1")).expect("save failed");
        repo.claim_batch(&claim("w1", 10)).expect("claim failed");

        repo.mark_published(id, "w1").expect("mark failed");

        let event = repo.find_by_id(id).expect("find failed").expect("exists");
        assert!(event.published_at.is_some());
        assert!(event.processed_at.is_some());
        let mut expired = claim("w1", 10);
        expired.lease = Duration::ZERO;
        assert!(repo.claim_batch(&expired).expect("claim failed").is_empty());
    }

    #[tokio::test]
    async fn failures_count_up_until_exhausted_then_replay_resets() {
        let (_container, pool) = setup_db().await;
        let repo = DieselOutboxRepository::new(pool);
        let id = repo
            .save_event(post_created("p1").with_max_retries(2))
            .expect("save failed");

        repo.claim_batch(&claim("w1", 10)).expect("claim failed");
        let first = repo.mark_failed(id, "w1", "broker down").expect("mark failed");
        assert_eq!((first.retries, first.exhausted()), (1, false));
        repo.claim_batch(&claim("w1", 10)).expect("claim failed");
        let second = repo.mark_failed(id, "w1", "broker down").expect("mark failed");
        assert!(second.exhausted());

        // Failure releases the lease, but an exhausted row is not eligible.
        assert!(repo.claim_batch(&claim("w1", 10)).expect("claim").is_empty());
        let stored = repo.find_by_id(id).expect("find").expect("exists");
        assert_eq!(stored.error_message.as_deref(), Some("broker down"));

        assert_eq!(repo.replay_failed().expect("replay failed"), 1);
        let batch = repo.claim_batch(&claim("w1", 10)).expect("claim failed");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].retries, 0);
        assert_eq!(batch[0].error_message, None);
    }

    #[tokio::test]
    async fn marking_unknown_row_is_not_found() {
        let (_container, pool) = setup_db().await;
        let repo = DieselOutboxRepository::new(pool);

        assert!(matches!(repo.mark_published(42, "w1"), Err(DomainError::NotFound)));
        assert!(matches!(
            repo.mark_failed(42, "w1", "x"),
            Err(DomainError::NotFound)
        ));
        assert!(repo.find_by_id(42).expect("find failed").is_none());
    }

    #[tokio::test]
    async fn marks_from_a_replica_whose_lease_expired_change_nothing() {
        let (_container, pool) = setup_db().await;
        let repo = DieselOutboxRepository::new(pool);
        let id = repo.save_event(post_created("p1")).expect("save failed");

        let mut short = claim("w1", 10);
        short.lease = Duration::ZERO;
        assert_eq!(repo.claim_batch(&short).expect("claim failed").len(), 1);
        assert_eq!(repo.claim_batch(&claim("w2", 10)).expect("claim failed").len(), 1);

        assert!(matches!(
            repo.mark_failed(id, "w1", "timed out"),
            Err(DomainError::ClaimLost { id: lost }) if lost == id
        ));
        assert!(matches!(
            repo.mark_published(id, "w1"),
            Err(DomainError::ClaimLost { .. })
        ));
        let row = repo.find_by_id(id).expect("find").expect("exists");
        assert_eq!(row.retries, 0);
        assert!(row.published_at.is_none());

        repo.mark_published(id, "w2").expect("current claimer marks");
        let row = repo.find_by_id(id).expect("find").expect("exists");
        assert!(row.published_at.is_some());
    }

    #[tokio::test]
    async fn rolled_back_write_leaves_no_outbox_row() {
        let (_container, pool) = setup_db().await;
        let mut conn = pool.get().expect("Failed to get connection");

        let result = conn.transaction::<(), diesel::result::Error, _>(|conn| {
            save_event_in(conn, &post_created("p1"))?;
            Err(diesel::result::Error::RollbackTransaction)
        });
        assert!(result.is_err());

        let committed = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                save_event_in(conn, &post_created("p2"))
            })
            .expect("commit failed");

        let ids: Vec<i64> = outbox_events::table
            .select(outbox_events::id)
            .load(&mut conn)
            .expect("query failed");
        assert_eq!(ids, vec![committed], "exactly one row per committed write");
    }
}
