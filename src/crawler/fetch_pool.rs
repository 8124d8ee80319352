//! Fetch pool
//!
//! Workers take ids off the id queue, fetch the payload, classify it and
//! hand the entity to the persistence stage. A failed fetch goes back onto
//! the id queue with its attempt count; when the queue is full the worker
//! keeps the id and retries it itself rather than blocking on its own queue.

use async_channel::{Receiver, Sender, TrySendError};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::crawler::config::RetryPolicy;
use crate::crawler::dead_letter::{DeadLetter, DeadLetterLog};
use crate::crawler::drain::SharedDrain;
use crate::crawler::stats::SharedStats;
use crate::feed::{classify, FeedError, ItemSource};
use crate::{Entity, ItemId};

/// One unit of fetch work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTask {
    /// Item id
    pub id: ItemId,
    /// Failed attempts so far
    pub attempts: u32,
}

impl FetchTask {
    /// A fresh task with no failed attempts
    pub fn new(id: ItemId) -> Self {
        Self { id, attempts: 0 }
    }
}

/// Shared state of every fetch worker
#[derive(Clone)]
pub struct FetchContext {
    /// Feed
    pub source: Arc<dyn ItemSource>,
    /// Id queue, consumer side
    pub ids_rx: Receiver<FetchTask>,
    /// Id queue, producer side used for requeueing
    pub ids_tx: Sender<FetchTask>,
    /// Entity queue
    pub entities: Sender<Entity>,
    /// Outstanding-work counters
    pub drain: SharedDrain,
    /// Run counters
    pub stats: SharedStats,
    /// Retry ceiling and backoff
    pub retry: RetryPolicy,
    /// Sink for ids that exhaust their attempts
    pub dead_letters: Arc<DeadLetterLog>,
}

enum Attempt {
    Done,
    Requeued,
    Retry(FetchTask),
}

/// Run one fetch worker until the id queue is closed
pub async fn fetch_worker(worker: usize, ctx: FetchContext) {
    debug!(worker, "Fetch worker started");

    while let Ok(mut task) = ctx.ids_rx.recv().await {
        loop {
            match attempt(worker, &ctx, task).await {
                Attempt::Done | Attempt::Requeued => break,
                Attempt::Retry(kept) => task = kept,
            }
        }
    }

    debug!(worker, "Fetch worker stopped");
}

async fn attempt(worker: usize, ctx: &FetchContext, mut task: FetchTask) -> Attempt {
    let raw = match ctx.source.fetch_item(task.id).await {
        Ok(raw) => raw,
        Err(e) => {
            task.attempts += 1;
            return on_failure(worker, ctx, task, e).await;
        }
    };

    let fetched_at = Utc::now();
    match classify(raw, fetched_at) {
        Ok(entity) => {
            trace!(worker, id = task.id, kind = %entity.kind(), "Fetched item");
            crate::metrics::record_item_fetched(entity.kind());
            ctx.stats.record_fetched();

            // Count the entity before releasing the id.
            ctx.drain.entity_enqueued();
            if ctx.entities.send(entity).await.is_err() {
                ctx.drain.entity_completed();
                debug!(worker, id = task.id, "Entity queue closed, dropping item");
            }
        }
        Err(unrecognized) => {
            warn!(
                worker,
                id = unrecognized.id,
                kind = %unrecognized.kind,
                "Dropping item of unrecognized kind"
            );
            crate::metrics::record_unrecognized();
            ctx.stats.record_unrecognized();
        }
    }

    ctx.drain.id_completed();
    Attempt::Done
}

async fn on_failure(
    worker: usize,
    ctx: &FetchContext,
    task: FetchTask,
    error: FeedError,
) -> Attempt {
    let failure = error.failure_kind();

    if ctx.retry.is_exhausted(task.attempts) {
        crate::metrics::record_dead_letter("fetch");
        ctx.stats.record_fetch_dead_letter();
        ctx.dead_letters
            .record(DeadLetter::fetch(task.id, task.attempts, error.to_string()))
            .await;
        ctx.drain.id_completed();
        return Attempt::Done;
    }

    crate::metrics::record_fetch_retry(failure);
    ctx.stats.record_fetch_retry();

    let backoff = ctx.retry.backoff(task.attempts);
    warn!(
        worker,
        id = task.id,
        attempt = task.attempts,
        max_attempts = %ctx.retry.describe_max(),
        reason = failure.label(),
        cause = failure.description(),
        backoff_ms = backoff.as_millis() as u64,
        error = %error,
        "Fetch failed, requeueing"
    );

    if !backoff.is_zero() {
        tokio::time::sleep(backoff).await;
    }

    match ctx.ids_tx.try_send(task) {
        Ok(()) => Attempt::Requeued,
        Err(TrySendError::Full(task)) => {
            trace!(worker, id = task.id, "Id queue full, retrying locally");
            Attempt::Retry(task)
        }
        Err(TrySendError::Closed(task)) => {
            debug!(worker, id = task.id, "Id queue closed, abandoning retry");
            Attempt::Done
        }
    }
}
