//! Pipeline configuration and retry policy

use std::time::Duration;

use crate::crawler::CrawlError;

/// Concurrent feed requests.
/// Fetch workers spend nearly all their time waiting on the network, so many
/// of them share a few runtime threads.
pub const DEFAULT_FETCH_WORKERS: usize = 100;

/// Concurrent store writers; matches the default pool size so no writer
/// waits on a connection in steady state.
pub const DEFAULT_PERSIST_WORKERS: usize = 100;

/// Id queue capacity.
/// Kept tiny: the enqueuer only needs to stay one step ahead of the fetchers.
pub const DEFAULT_ID_QUEUE_CAPACITY: usize = 2;

/// Entity queue capacity between fetch and persistence.
pub const DEFAULT_ENTITY_QUEUE_CAPACITY: usize = 300;

/// Store connection pool size.
pub const DEFAULT_POOL_SIZE: u32 = 100;

/// How far back recently stored items are re-crawled for mutations.
pub const DEFAULT_LOOKBACK: Duration = Duration::from_secs(2 * 60 * 60);

/// Fetch attempts per id before it is dead-lettered.
pub const DEFAULT_MAX_FETCH_ATTEMPTS: u32 = 8;

/// Upsert attempts per entity before it is dead-lettered.
pub const DEFAULT_STORE_ATTEMPTS: u32 = 3;

/// First retry delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 250;

/// Retry delay cap in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// How often progress is written to the log
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

/// Calculate exponential backoff delay for the given zero-based retry
pub fn calculate_backoff(retry: u32, initial: Duration, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(retry);
    initial.saturating_mul(factor).min(max)
}

/// Retry policy for one pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Delay cap
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Bounded exponential backoff
    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }

    /// Retry forever with no delay
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Override backoff bounds
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Whether `attempts` failed attempts exhaust the policy
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }

    /// Delay after the `attempts`-th failure (1-based)
    pub fn backoff(&self, attempts: u32) -> Duration {
        calculate_backoff(
            attempts.saturating_sub(1),
            self.initial_backoff,
            self.max_backoff,
        )
    }

    /// Human-readable ceiling for log lines
    pub fn describe_max(&self) -> String {
        self.max_attempts
            .map(|max| max.to_string())
            .unwrap_or_else(|| "unbounded".to_string())
    }
}

/// Sizing and policy for one crawl run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of fetch workers
    pub fetch_workers: usize,
    /// Number of persistence workers
    pub persist_workers: usize,
    /// Id queue capacity
    pub id_queue_capacity: usize,
    /// Entity queue capacity
    pub entity_queue_capacity: usize,
    /// Store connection pool size
    pub pool_size: u32,
    /// Re-crawl window for recently stored items
    pub lookback: Duration,
    /// Fetch retry policy
    pub fetch_retry: RetryPolicy,
    /// Upsert retry policy
    pub store_retry: RetryPolicy,
    /// Progress log cadence
    pub progress_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_workers: DEFAULT_FETCH_WORKERS,
            persist_workers: DEFAULT_PERSIST_WORKERS,
            id_queue_capacity: DEFAULT_ID_QUEUE_CAPACITY,
            entity_queue_capacity: DEFAULT_ENTITY_QUEUE_CAPACITY,
            pool_size: DEFAULT_POOL_SIZE,
            lookback: DEFAULT_LOOKBACK,
            fetch_retry: RetryPolicy::bounded(DEFAULT_MAX_FETCH_ATTEMPTS),
            store_retry: RetryPolicy::bounded(DEFAULT_STORE_ATTEMPTS),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl PipelineConfig {
    /// Set the re-crawl window
    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        self.lookback = lookback;
        self
    }

    /// Set worker counts
    pub fn with_workers(mut self, fetch_workers: usize, persist_workers: usize) -> Self {
        self.fetch_workers = fetch_workers;
        self.persist_workers = persist_workers;
        self
    }

    /// Set queue capacities
    pub fn with_queue_capacities(mut self, ids: usize, entities: usize) -> Self {
        self.id_queue_capacity = ids;
        self.entity_queue_capacity = entities;
        self
    }

    /// Set the fetch retry policy
    pub fn with_fetch_retry(mut self, policy: RetryPolicy) -> Self {
        self.fetch_retry = policy;
        self
    }

    /// Set the upsert retry policy
    pub fn with_store_retry(mut self, policy: RetryPolicy) -> Self {
        self.store_retry = policy;
        self
    }

    /// Reject sizes that would stall the pipeline
    pub fn validate(&self) -> Result<(), CrawlError> {
        let checks = [
            (self.fetch_workers == 0, "fetch workers must be at least 1"),
            (
                self.persist_workers == 0,
                "persistence workers must be at least 1",
            ),
            (
                self.id_queue_capacity == 0,
                "id queue capacity must be at least 1",
            ),
            (
                self.entity_queue_capacity == 0,
                "entity queue capacity must be at least 1",
            ),
            (
                self.pool_size == 0,
                "connection pool size must be at least 1",
            ),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(CrawlError::InvalidConfig(message.to_string())),
            None => Ok(()),
        }
    }
}
