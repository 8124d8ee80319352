//! Crawl planning and the ingestion pipeline
//!
//! A run resolves the id range to crawl from the store's watermark and the
//! feed's current maximum, then pushes every id through two worker pools
//! connected by bounded queues:
//!
//! ```text
//! enqueuer -> [id queue] -> fetch pool -> [entity queue] -> persistence pool -> store
//!                 ^              |
//!                 +-- requeue ---+
//! ```
//!
//! The [`drain::DrainCoordinator`] decides when every id has logically
//! completed; the pipeline then closes both queues and joins the workers.

use crate::feed::FeedError;
use crate::store::StoreError;

pub mod config;
pub mod dead_letter;
pub mod drain;
pub mod enqueuer;
pub mod fetch_pool;
pub mod persist_pool;
pub mod pipeline;
pub mod progress;
pub mod stats;
pub mod watermark;

pub use config::{PipelineConfig, RetryPolicy};
pub use dead_letter::{DeadLetter, DeadLetterLog, DeadLetterStage};
pub use drain::DrainCoordinator;
pub use pipeline::Pipeline;
pub use progress::ProgressState;
pub use stats::{RunStats, RunSummary};

/// Crawl errors
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// The feed could not report its maximum id
    #[error("feed unavailable: {0}")]
    UpstreamUnavailable(#[source] FeedError),

    /// The store could not be reached while planning or connecting
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// The dead-letter log could not be opened or read
    #[error("dead-letter log error: {0}")]
    DeadLetter(String),

    /// Pipeline sizing rejected
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Shutdown was requested before the run drained
    #[error("crawl cancelled")]
    Cancelled,

    /// A worker task panicked or was lost
    #[error("worker failure: {0}")]
    Worker(String),
}

/// Result type for crawl operations
pub type CrawlResult<T> = Result<T, CrawlError>;
