//! CLI error types and conversions

use crate::crawler::CrawlError;
use crate::feed::FeedError;
use crate::metrics::MetricsError;

/// Exit status for a crawl cancelled by Ctrl+C (128 + SIGINT)
pub const EXIT_CANCELLED: i32 = 130;

/// Exit status for startup, planning and run failures
pub const EXIT_FAILURE: i32 = 1;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Crawl error
    #[error("crawl error: {0}")]
    CrawlError(#[from] CrawlError),

    /// Feed client error
    #[error("feed error: {0}")]
    FeedError(#[from] FeedError),

    /// Metrics exporter error
    #[error("metrics error: {0}")]
    MetricsError(#[from] MetricsError),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

impl CliError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::CrawlError(CrawlError::Cancelled) => EXIT_CANCELLED,
            _ => EXIT_FAILURE,
        }
    }
}
