//! # Hacker News Ingest Library
//!
//! Incrementally mirrors the Hacker News item feed into a relational store.
//! Every item the feed assigns an id to is fetched, classified into one of the
//! entity variants and upserted, so re-running the crawler over the same ids
//! converges on the latest observed version of each item.
//!
//! ## Architecture
//!
//! - [`feed`] - The remote item feed: payload types, classifier, HTTP client
//! - [`store`] - The relational store: row mapping, Postgres and in-memory stores
//! - [`crawler`] - Watermark planning and the bounded fetch/persist pipeline
//! - [`cli`] - Command line surface for the `hn-ingest` binary
//! - [`metrics`] - Prometheus counters for feed and store traffic
//! - [`shutdown`] - Whole-run cancellation
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use hn_ingest::crawler::{Pipeline, PipelineConfig};
//! use hn_ingest::feed::HackerNewsClient;
//! use hn_ingest::store::MemoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::default().with_lookback(Duration::from_secs(3600));
//! let source = Arc::new(HackerNewsClient::new(config.fetch_workers)?);
//! let store = Arc::new(MemoryStore::new());
//!
//! let pipeline = Pipeline::new(config, source, store);
//! let summary = pipeline.run_incremental().await?;
//! println!("persisted {} items", summary.persisted());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// Crawl planning and the ingestion pipeline
pub mod crawler;

/// Remote item feed
pub mod feed;

/// Observability metrics
pub mod metrics;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Relational item store
pub mod store;

/// Identifier the feed assigns to every item.
pub type ItemId = u64;

/// Item kind as declared by the feed's `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// Link or text submission
    Story,
    /// Reply to a story, poll or another comment
    Comment,
    /// Poll; shares the story field set
    Poll,
    /// Poll option
    #[serde(rename = "pollopt")]
    PollOpt,
    /// Job posting; shares the story field set
    Job,
}

impl ItemKind {
    /// The tag used by the feed and stored in the `type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Story => "story",
            ItemKind::Comment => "comment",
            ItemKind::Poll => "poll",
            ItemKind::PollOpt => "pollopt",
            ItemKind::Job => "job",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "story" => Ok(ItemKind::Story),
            "comment" => Ok(ItemKind::Comment),
            "poll" => Ok(ItemKind::Poll),
            "pollopt" => Ok(ItemKind::PollOpt),
            "job" => Ok(ItemKind::Job),
            _ => Err(format!("Unknown item kind: {s}")),
        }
    }
}

/// Fields every item shares regardless of kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemHeader {
    /// Feed-assigned id, never reused
    pub id: ItemId,
    /// Declared kind; never changes across re-fetches
    pub kind: ItemKind,
    /// Author handle, absent for some deleted items
    pub author: Option<String>,
    /// Creation time assigned by the feed
    pub created_at: DateTime<Utc>,
    /// Child ids in feed order (flat, never walked)
    pub children: Vec<ItemId>,
    /// When this version of the item was received
    pub fetched_at: DateTime<Utc>,
}

/// Story, poll or job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    /// Shared item fields
    pub header: ItemHeader,
    /// Title
    pub title: String,
    /// Link target, absent for text posts
    pub url: Option<String>,
    /// Score
    pub score: i64,
    /// Total comment count
    pub descendants: i64,
    /// Body text (HTML)
    pub text: String,
    /// Flagged dead
    pub dead: bool,
    /// Deleted by author or moderators
    pub deleted: bool,
}

/// Comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    /// Shared item fields
    pub header: ItemHeader,
    /// Parent item id
    pub parent: ItemId,
    /// Body text (HTML)
    pub text: String,
    /// Flagged dead
    pub dead: bool,
    /// Deleted by author or moderators
    pub deleted: bool,
}

/// Poll option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollOption {
    /// Shared item fields
    pub header: ItemHeader,
    /// Owning poll id
    pub poll: ItemId,
    /// Score
    pub score: i64,
    /// Option text
    pub text: String,
    /// Flagged dead
    pub dead: bool,
    /// Deleted by author or moderators
    pub deleted: bool,
}

/// A classified feed item, ready to be persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum Entity {
    /// Story, poll or job
    Story(Story),
    /// Comment
    Comment(Comment),
    /// Poll option
    PollOption(PollOption),
}

impl Entity {
    /// Shared item fields
    pub fn header(&self) -> &ItemHeader {
        match self {
            Entity::Story(story) => &story.header,
            Entity::Comment(comment) => &comment.header,
            Entity::PollOption(option) => &option.header,
        }
    }

    /// Item id
    pub fn id(&self) -> ItemId {
        self.header().id
    }

    /// Declared kind
    pub fn kind(&self) -> ItemKind {
        self.header().kind
    }

    /// When this version was received from the feed
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.header().fetched_at
    }
}

/// Inclusive range of item ids to crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    /// First id (inclusive)
    pub start: ItemId,
    /// Last id (inclusive)
    pub end: ItemId,
}

impl IdRange {
    /// Create a range; `start > end` yields an empty range
    pub fn new(start: ItemId, end: ItemId) -> Self {
        Self { start, end }
    }

    /// Whether the range holds no ids
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Number of ids in the range
    pub fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.end - self.start + 1
        }
    }

    /// Ids in ascending order
    pub fn ids(&self) -> std::ops::RangeInclusive<ItemId> {
        self.start..=self.end
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}
