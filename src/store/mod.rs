//! Relational item store
//!
//! One logical table, `items`, holds the union of every entity's fields keyed
//! by id. Writes are idempotent upserts: the first write inserts the full
//! record, later writes overwrite only the mutable columns of the item's kind
//! and only when they carry a version fetched no earlier than the stored one.
//!
//! - [`postgres`] - sqlx-backed store used in production
//! - [`memory`] - in-process store with identical semantics

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Entity, ItemId, ItemKind};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PgItemStore, PgStoreConfig};

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Could not reach the database or obtain a pooled connection
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// Statement failed
    #[error("query error: {0}")]
    QueryError(String),

    /// Value cannot be represented in the table
    #[error("invalid row: {0}")]
    InvalidRow(String),
}

impl StoreError {
    /// Whether repeating the same upsert can succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StoreError::InvalidRow(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => StoreError::ConnectionError(e.to_string()),
            other => StoreError::QueryError(other.to_string()),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// What an upsert did to the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Id was absent; full record inserted
    Inserted,
    /// Mutable columns overwritten
    Updated,
    /// Stored row was fetched later; nothing changed
    Stale,
}

impl UpsertOutcome {
    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Inserted => "inserted",
            UpsertOutcome::Updated => "updated",
            UpsertOutcome::Stale => "stale",
        }
    }
}

/// Persistent item storage
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Smallest id among rows created after `cutoff`
    async fn min_id_since(&self, cutoff: DateTime<Utc>) -> StoreResult<Option<ItemId>>;

    /// Largest stored id
    async fn max_id(&self) -> StoreResult<Option<ItemId>>;

    /// Atomically insert or update one entity
    async fn upsert(&self, entity: &Entity) -> StoreResult<UpsertOutcome>;

    /// Release pooled connections
    async fn close(&self);
}

/// Column of the `items` table that re-fetches may change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    /// `title`
    Title,
    /// `url`
    Url,
    /// `score`
    Score,
    /// `descendants`
    Descendants,
    /// `text`
    Text,
    /// `dead`
    Dead,
    /// `deleted`
    Deleted,
    /// `kids`
    Kids,
}

impl Column {
    /// SQL column name
    pub fn name(&self) -> &'static str {
        match self {
            Column::Title => "title",
            Column::Url => "url",
            Column::Score => "score",
            Column::Descendants => "descendants",
            Column::Text => "text",
            Column::Dead => "dead",
            Column::Deleted => "deleted",
            Column::Kids => "kids",
        }
    }
}

const STORY_MUTABLE: &[Column] = &[
    Column::Title,
    Column::Url,
    Column::Score,
    Column::Descendants,
    Column::Text,
    Column::Dead,
    Column::Deleted,
    Column::Kids,
];

const COMMENT_MUTABLE: &[Column] = &[Column::Text, Column::Dead, Column::Deleted, Column::Kids];

const POLLOPT_MUTABLE: &[Column] = &[Column::Text, Column::Score, Column::Dead, Column::Deleted];

/// Columns a later fetch of `kind` may overwrite.
///
/// `id`, `type`, `by`, `time`, `parent` and `poll` are written on insert only.
pub fn mutable_columns(kind: ItemKind) -> &'static [Column] {
    match kind {
        ItemKind::Story | ItemKind::Poll | ItemKind::Job => STORY_MUTABLE,
        ItemKind::Comment => COMMENT_MUTABLE,
        ItemKind::PollOpt => POLLOPT_MUTABLE,
    }
}

/// One row of the `items` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRow {
    /// Item id
    pub id: i64,
    /// Declared kind
    pub kind: ItemKind,
    /// Author
    pub by: Option<String>,
    /// Creation time
    pub time: DateTime<Utc>,
    /// Parent id (comments)
    pub parent: Option<i64>,
    /// Owning poll (poll options)
    pub poll: Option<i64>,
    /// Title (stories)
    pub title: Option<String>,
    /// Link (stories)
    pub url: Option<String>,
    /// Score (stories, poll options)
    pub score: Option<i64>,
    /// Comment count (stories)
    pub descendants: Option<i64>,
    /// Body text
    pub text: Option<String>,
    /// Dead flag
    pub dead: bool,
    /// Deleted flag
    pub deleted: bool,
    /// Child ids
    pub kids: Vec<i64>,
    /// When this version was fetched
    pub fetched_at: DateTime<Utc>,
}

fn db_id(id: ItemId) -> StoreResult<i64> {
    i64::try_from(id).map_err(|_| StoreError::InvalidRow(format!("id {id} exceeds BIGINT")))
}

pub(crate) fn item_id(value: i64) -> StoreResult<ItemId> {
    ItemId::try_from(value).map_err(|_| StoreError::InvalidRow(format!("negative id {value}")))
}

impl ItemRow {
    /// Flatten an entity into a full table row
    pub fn from_entity(entity: &Entity) -> StoreResult<Self> {
        let header = entity.header();
        let kids = header
            .children
            .iter()
            .map(|kid| db_id(*kid))
            .collect::<StoreResult<Vec<_>>>()?;

        let mut row = ItemRow {
            id: db_id(header.id)?,
            kind: header.kind,
            by: header.author.clone(),
            time: header.created_at,
            parent: None,
            poll: None,
            title: None,
            url: None,
            score: None,
            descendants: None,
            text: None,
            dead: false,
            deleted: false,
            kids,
            fetched_at: header.fetched_at,
        };

        match entity {
            Entity::Story(story) => {
                row.title = Some(story.title.clone());
                row.url = story.url.clone();
                row.score = Some(story.score);
                row.descendants = Some(story.descendants);
                row.text = Some(story.text.clone());
                row.dead = story.dead;
                row.deleted = story.deleted;
            }
            Entity::Comment(comment) => {
                row.parent = Some(db_id(comment.parent)?);
                row.text = Some(comment.text.clone());
                row.dead = comment.dead;
                row.deleted = comment.deleted;
            }
            Entity::PollOption(option) => {
                row.poll = Some(db_id(option.poll)?);
                row.score = Some(option.score);
                row.text = Some(option.text.clone());
                row.dead = option.dead;
                row.deleted = option.deleted;
            }
        }

        Ok(row)
    }

    /// Overwrite this row's mutable columns with `newer`'s.
    ///
    /// Returns `false` and leaves the row untouched when `newer` was fetched
    /// before the stored version.
    pub fn merge_mutable(&mut self, newer: &ItemRow) -> bool {
        if newer.fetched_at < self.fetched_at {
            return false;
        }

        for column in mutable_columns(newer.kind) {
            match column {
                Column::Title => self.title = newer.title.clone(),
                Column::Url => self.url = newer.url.clone(),
                Column::Score => self.score = newer.score,
                Column::Descendants => self.descendants = newer.descendants,
                Column::Text => self.text = newer.text.clone(),
                Column::Dead => self.dead = newer.dead,
                Column::Deleted => self.deleted = newer.deleted,
                Column::Kids => self.kids = newer.kids.clone(),
            }
        }
        self.fetched_at = newer.fetched_at;
        true
    }
}
