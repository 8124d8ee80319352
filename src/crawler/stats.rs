//! Run statistics

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::store::UpsertOutcome;

/// Shared handle to run statistics.
pub type SharedStats = Arc<RunStats>;

/// Live counters updated by the workers
#[derive(Debug, Default)]
pub struct RunStats {
    enqueued: AtomicU64,
    fetched: AtomicU64,
    fetch_retries: AtomicU64,
    unrecognized: AtomicU64,
    fetch_dead_lettered: AtomicU64,
    inserted: AtomicU64,
    updated: AtomicU64,
    stale: AtomicU64,
    persist_failures: AtomicU64,
    persist_dead_lettered: AtomicU64,
}

impl RunStats {
    /// Create a new shared stats block
    pub fn shared() -> SharedStats {
        Arc::new(Self::default())
    }

    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fetched(&self) {
        self.fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch_retry(&self) {
        self.fetch_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unrecognized(&self) {
        self.unrecognized.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch_dead_letter(&self) {
        self.fetch_dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_upsert(&self, outcome: UpsertOutcome) {
        let counter = match outcome {
            UpsertOutcome::Inserted => &self.inserted,
            UpsertOutcome::Updated => &self.updated,
            UpsertOutcome::Stale => &self.stale,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_persist_failure(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_persist_dead_letter(&self) {
        self.persist_dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    /// Ids for which fetching is finished, whatever the outcome
    pub fn ids_completed(&self) -> u64 {
        self.fetched.load(Ordering::Relaxed)
            + self.unrecognized.load(Ordering::Relaxed)
            + self.fetch_dead_lettered.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> RunSummary {
        RunSummary {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            fetched: self.fetched.load(Ordering::Relaxed),
            fetch_retries: self.fetch_retries.load(Ordering::Relaxed),
            unrecognized: self.unrecognized.load(Ordering::Relaxed),
            fetch_dead_lettered: self.fetch_dead_lettered.load(Ordering::Relaxed),
            inserted: self.inserted.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            persist_dead_lettered: self.persist_dead_lettered.load(Ordering::Relaxed),
        }
    }
}

/// Outcome counts of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Ids pushed by the enqueuer
    pub enqueued: u64,
    /// Ids fetched and classified
    pub fetched: u64,
    /// Failed fetch attempts that were retried
    pub fetch_retries: u64,
    /// Ids dropped for an unrecognized kind
    pub unrecognized: u64,
    /// Ids given up on after exhausting fetch attempts
    pub fetch_dead_lettered: u64,
    /// Rows inserted
    pub inserted: u64,
    /// Rows updated
    pub updated: u64,
    /// Upserts skipped because a newer version was stored
    pub stale: u64,
    /// Failed upsert attempts
    pub persist_failures: u64,
    /// Entities given up on after exhausting upsert attempts
    pub persist_dead_lettered: u64,
}

impl RunSummary {
    /// Upserts that reached the store and were applied or skipped as stale
    pub fn persisted(&self) -> u64 {
        self.inserted + self.updated + self.stale
    }

    /// Items that did not make it to the store
    pub fn dead_lettered(&self) -> u64 {
        self.fetch_dead_lettered + self.persist_dead_lettered
    }
}
