//! Persistence pool
//!
//! Workers take entities off the entity queue and upsert them. Each upsert
//! checks out its own store connection; a failed upsert is retried with
//! backoff, then written to the dead-letter log. Rows the table cannot hold
//! go to the dead-letter log on the first failure.

use async_channel::Receiver;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::crawler::config::RetryPolicy;
use crate::crawler::dead_letter::{DeadLetter, DeadLetterLog};
use crate::crawler::drain::SharedDrain;
use crate::crawler::stats::SharedStats;
use crate::metrics::UpsertMetrics;
use crate::store::ItemStore;
use crate::Entity;

/// Shared state of every persistence worker
#[derive(Clone)]
pub struct PersistContext {
    /// Store
    pub store: Arc<dyn ItemStore>,
    /// Entity queue, consumer side
    pub entities: Receiver<Entity>,
    /// Outstanding-work counters
    pub drain: SharedDrain,
    /// Run counters
    pub stats: SharedStats,
    /// Upsert retry policy
    pub retry: RetryPolicy,
    /// Sink for entities that exhaust their attempts
    pub dead_letters: Arc<DeadLetterLog>,
}

/// Run one persistence worker until the entity queue is closed
pub async fn persist_worker(worker: usize, ctx: PersistContext) {
    debug!(worker, "Persistence worker started");

    while let Ok(entity) = ctx.entities.recv().await {
        persist(worker, &ctx, entity).await;
        ctx.drain.entity_completed();
    }

    debug!(worker, "Persistence worker stopped");
}

async fn persist(worker: usize, ctx: &PersistContext, entity: Entity) {
    let mut attempts = 0u32;

    loop {
        let metrics = UpsertMetrics::start(entity.kind());
        let error = match ctx.store.upsert(&entity).await {
            Ok(outcome) => {
                metrics.record_outcome(outcome);
                ctx.stats.record_upsert(outcome);
                trace!(
                    worker,
                    id = entity.id(),
                    outcome = outcome.as_str(),
                    "Persisted item"
                );
                return;
            }
            Err(e) => e,
        };

        attempts += 1;
        metrics.record_failure();
        ctx.stats.record_persist_failure();

        if !error.is_retryable() || ctx.retry.is_exhausted(attempts) {
            crate::metrics::record_dead_letter("persist");
            ctx.stats.record_persist_dead_letter();
            ctx.dead_letters
                .record(DeadLetter::persist(entity, attempts, error.to_string()))
                .await;
            return;
        }

        let backoff = ctx.retry.backoff(attempts);
        warn!(
            worker,
            id = entity.id(),
            attempt = attempts,
            max_attempts = %ctx.retry.describe_max(),
            backoff_ms = backoff.as_millis() as u64,
            error = %error,
            "Upsert failed, retrying"
        );
        tokio::time::sleep(backoff).await;
    }
}
