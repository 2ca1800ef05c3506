//! Drains the outbox table onto the message bus.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::run_blocking;
use crate::bus::{MessageBus, Transport};
use crate::domain::envelope::EventEnvelope;
use crate::domain::errors::DomainError;
use crate::domain::outbox::{ClaimRequest, OutboxEvent};
use crate::domain::ports::OutboxRepository;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    /// How long a claimed row stays invisible to other replicas.
    pub claim_lease: Duration,
    /// Upper bound of one bus send. A cycle stops starting sends once less
    /// than this is left of the lease.
    pub publish_timeout: Duration,
    pub worker_id: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 100,
            claim_lease: Duration::from_secs(30),
            publish_timeout: Duration::from_secs(5),
            worker_id: format!("outbox-{}-{}", std::process::id(), Uuid::new_v4().simple()),
        }
    }
}

/// Counts for one polling cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub claimed: usize,
    pub published: usize,
    pub failed: usize,
    /// Failures that used up the row's last retry.
    pub exhausted: usize,
    /// Claimed rows left for a later cycle because the lease was running out.
    pub deferred: usize,
}

pub struct OutboxPublisher<R: ?Sized, T> {
    repo: Arc<R>,
    bus: MessageBus<T>,
    config: PublisherConfig,
}

impl<R, T> OutboxPublisher<R, T>
where
    R: OutboxRepository + ?Sized,
    T: Transport,
{
    pub fn new(repo: Arc<R>, bus: MessageBus<T>, config: PublisherConfig) -> Self {
        Self { repo, bus, config }
    }

    /// Runs a cycle every `poll_interval` until `shutdown` is cancelled. A
    /// failing cycle is logged and the loop carries on; a cycle in progress
    /// finishes before shutdown is honoured.
    pub async fn start_polling(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::info!(
            "Outbox publisher {} polling every {:?} (batch {})",
            self.config.worker_id,
            self.config.poll_interval,
            self.config.batch_size
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.process_unpublished_events().await {
                Ok(report) if report.claimed > 0 => log::info!(
                    "Outbox cycle: {} claimed, {} published, {} failed ({} exhausted), {} deferred",
                    report.claimed,
                    report.published,
                    report.failed,
                    report.exhausted,
                    report.deferred
                ),
                Ok(_) => {}
                Err(e) => log::error!("Outbox cycle failed: {}", e),
            }
        }

        log::info!("Outbox publisher {} stopped", self.config.worker_id);
    }

    /// Claims one batch of eligible rows, oldest first, and publishes each.
    /// A failing row only affects itself. Rows not reached before the lease
    /// could run out mid-send are left for the next cycle, where they are
    /// claimable again once the lease expires.
    pub async fn process_unpublished_events(&self) -> Result<CycleReport, DomainError> {
        let started = Instant::now();
        let request = ClaimRequest {
            claimer: self.config.worker_id.clone(),
            batch_size: self.config.batch_size,
            lease: self.config.claim_lease,
        };
        let batch = run_blocking(&self.repo, move |repo| repo.claim_batch(&request)).await?;
        let deadline = started + self.config.claim_lease.saturating_sub(self.config.publish_timeout);

        let mut report = CycleReport {
            claimed: batch.len(),
            ..Default::default()
        };
        for (done, event) in batch.into_iter().enumerate() {
            if Instant::now() >= deadline {
                report.deferred = report.claimed - done;
                log::warn!(
                    "Outbox publisher {} is near the end of its {:?} lease; deferring {} events",
                    self.config.worker_id,
                    self.config.claim_lease,
                    report.deferred
                );
                break;
            }
            self.publish_one(event, &mut report).await?;
        }
        Ok(report)
    }

    async fn publish_one(&self, event: OutboxEvent, report: &mut CycleReport) -> Result<(), DomainError> {
        let id = event.id;
        // occurredAt is the row's, not the send time.
        let envelope =
            EventEnvelope::new(event.event_type.as_str(), event.payload.clone()).occurred_at(event.occurred_at);
        let published = self
            .bus
            .publish_envelope(
                &event.event_type,
                envelope,
                Some(&event.aggregate_id),
                event.trace_id.as_deref(),
            )
            .await;
        let claimer = self.config.worker_id.clone();

        match published {
            Ok(envelope) => {
                let marked = run_blocking(&self.repo, move |repo| repo.mark_published(id, &claimer)).await;
                match marked {
                    Ok(()) => {}
                    Err(DomainError::ClaimLost { .. }) => {
                        log::warn!(
                            "Outbox event {} was published but its claim had moved on; it may be published again",
                            id
                        );
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                }
                log::debug!(
                    "Outbox event {} published as {} on '{}'",
                    id,
                    envelope.event_id,
                    event.event_type
                );
                report.published += 1;
            }
            Err(e) => {
                let reason = e.to_string();
                let marked =
                    run_blocking(&self.repo, move |repo| repo.mark_failed(id, &claimer, &reason)).await;
                let attempt = match marked {
                    Ok(attempt) => attempt,
                    Err(DomainError::ClaimLost { .. }) => {
                        log::warn!(
                            "Outbox event {} failed ({}) after its claim had moved on; leaving it to the new claimer",
                            id,
                            e
                        );
                        return Ok(());
                    }
                    Err(other) => return Err(other),
                };
                report.failed += 1;
                if attempt.exhausted() {
                    report.exhausted += 1;
                    let exhausted = DomainError::ExhaustedRetries {
                        id,
                        retries: attempt.retries,
                    };
                    log::error!("{} (last error: {}); replay required", exhausted, e);
                } else {
                    log::warn!(
                        "Outbox event {} publish attempt {}/{} failed: {}",
                        id,
                        attempt.retries,
                        attempt.max_retries,
                        e
                    );
                }
            }
        }
        Ok(())
    }

    /// Makes every exhausted row eligible again.
    pub async fn replay_failed_events(&self) -> Result<usize, DomainError> {
        replay_failed_events(&self.repo).await
    }
}

/// Resets exhausted rows without needing a bus, for admin surfaces.
pub async fn replay_failed_events<R>(repo: &Arc<R>) -> Result<usize, DomainError>
where
    R: OutboxRepository + ?Sized,
{
    let replayed = run_blocking(repo, |repo| repo.replay_failed()).await?;
    log::info!("Replayed {} exhausted outbox events", replayed);
    Ok(replayed)
}
