//! Remote item feed
//!
//! The feed is read-only and unauthenticated. It exposes the current maximum
//! id and one JSON document per item; this module turns those documents into
//! [`crate::Entity`] values.

use crate::ItemId;
use async_trait::async_trait;

pub mod classifier;
pub mod failure;
pub mod hn_http;
pub mod payload;

pub use classifier::{classify, UnrecognizedKind};
pub use failure::FailureKind;
pub use hn_http::HackerNewsClient;
pub use payload::RawItem;

/// Feed errors
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Non-success HTTP status
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Transport failure (DNS, connect, timeout, reset)
    #[error("network error: {0}")]
    NetworkError(String),

    /// Body could not be decoded
    #[error("parse error: {0}")]
    ParseError(String),

    /// Feed answered `null` for the item
    #[error("item {0} not available yet")]
    Missing(ItemId),

    /// Client could not be constructed
    #[error("client configuration error: {0}")]
    ClientError(String),
}

impl FeedError {
    /// Classification used in log lines and metric labels
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            FeedError::HttpError(message) => FailureKind::from_status_message(message),
            FeedError::NetworkError(message) => FailureKind::from_network_message(message),
            FeedError::ParseError(_) => FailureKind::Decode,
            FeedError::Missing(_) => FailureKind::Missing,
            FeedError::ClientError(_) => FailureKind::Other,
        }
    }
}

/// Result type for feed operations
pub type FeedResult<T> = Result<T, FeedError>;

/// Source of feed items
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Current maximum id assigned by the feed
    async fn max_item_id(&self) -> FeedResult<ItemId>;

    /// Fetch the current representation of one item
    async fn fetch_item(&self, id: ItemId) -> FeedResult<RawItem>;

    /// Base URL of the feed, for logging
    fn base_url(&self) -> &str;
}
