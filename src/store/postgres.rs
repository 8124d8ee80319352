//! Postgres-backed item store
//!
//! Owns a `PgPool` sized to the persistence stage. Each upsert checks out one
//! pooled connection for exactly one statement; the connection goes back to
//! the pool when the guard drops, on success and on failure alike.
//!
//! The expected schema lives in `sql/items.sql`; this module never creates or
//! alters tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, info};

use crate::store::{
    item_id, mutable_columns, ItemRow, ItemStore, StoreError, StoreResult, UpsertOutcome,
};
use crate::{Entity, ItemId, ItemKind};

/// Default time to wait for a free pooled connection
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Connection settings for [`PgItemStore`]
#[derive(Debug, Clone)]
pub struct PgStoreConfig {
    /// `postgres://` URL; may contain credentials, never logged
    pub database_url: String,
    /// Pool size
    pub max_connections: u32,
    /// How long an upsert waits for a free connection
    pub acquire_timeout: Duration,
}

impl PgStoreConfig {
    /// Settings for `database_url` with a pool of `max_connections`
    pub fn new(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        }
    }

    /// Override how long to wait for a connection
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Build the conflict-aware upsert for one kind.
///
/// The `WHERE` guard keeps a later-fetched row from being clobbered by an
/// earlier fetch that completes last. `RETURNING (xmax = 0)` is true for a
/// fresh insert and false for an update; no row comes back when the guard
/// rejected the write.
fn build_upsert_sql(kind: ItemKind) -> String {
    let assignments = mutable_columns(kind)
        .iter()
        .map(|column| format!("{0} = EXCLUDED.{0}", column.name()))
        .chain(std::iter::once("fetched_at = EXCLUDED.fetched_at".to_string()))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"INSERT INTO items (
    id, "type", "by", "time", parent, poll, title, url,
    score, descendants, text, dead, deleted, kids, fetched_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
ON CONFLICT (id) DO UPDATE SET {assignments}
WHERE items.fetched_at <= EXCLUDED.fetched_at
RETURNING (xmax = 0) AS inserted"#
    )
}

static STORY_UPSERT: Lazy<String> = Lazy::new(|| build_upsert_sql(ItemKind::Story));
static COMMENT_UPSERT: Lazy<String> = Lazy::new(|| build_upsert_sql(ItemKind::Comment));
static POLLOPT_UPSERT: Lazy<String> = Lazy::new(|| build_upsert_sql(ItemKind::PollOpt));

fn upsert_sql(entity: &Entity) -> &'static str {
    match entity {
        Entity::Story(_) => STORY_UPSERT.as_str(),
        Entity::Comment(_) => COMMENT_UPSERT.as_str(),
        Entity::PollOption(_) => POLLOPT_UPSERT.as_str(),
    }
}

/// Item store backed by a Postgres connection pool
#[derive(Debug, Clone)]
pub struct PgItemStore {
    pool: PgPool,
}

impl PgItemStore {
    /// Open the pool and verify the database is reachable
    pub async fn connect(config: &PgStoreConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Connected to item store"
        );

        Ok(Self { pool })
    }
}

#[async_trait]
impl ItemStore for PgItemStore {
    async fn min_id_since(&self, cutoff: DateTime<Utc>) -> StoreResult<Option<ItemId>> {
        let min: Option<i64> =
            sqlx::query_scalar(r#"SELECT min(id) FROM items WHERE "time" > $1"#)
                .bind(cutoff)
                .fetch_one(&self.pool)
                .await?;

        min.map(item_id).transpose()
    }

    async fn max_id(&self) -> StoreResult<Option<ItemId>> {
        let max: Option<i64> = sqlx::query_scalar("SELECT max(id) FROM items")
            .fetch_one(&self.pool)
            .await?;

        max.map(item_id).transpose()
    }

    async fn upsert(&self, entity: &Entity) -> StoreResult<UpsertOutcome> {
        let row = ItemRow::from_entity(entity)?;

        let mut conn = self.pool.acquire().await?;

        let inserted: Option<bool> = sqlx::query_scalar(upsert_sql(entity))
            .bind(row.id)
            .bind(row.kind.as_str())
            .bind(&row.by)
            .bind(row.time)
            .bind(row.parent)
            .bind(row.poll)
            .bind(&row.title)
            .bind(&row.url)
            .bind(row.score)
            .bind(row.descendants)
            .bind(&row.text)
            .bind(row.dead)
            .bind(row.deleted)
            .bind(&row.kids)
            .bind(row.fetched_at)
            .fetch_optional(&mut *conn)
            .await?;

        let outcome = match inserted {
            Some(true) => UpsertOutcome::Inserted,
            Some(false) => UpsertOutcome::Updated,
            None => UpsertOutcome::Stale,
        };

        debug!(id = row.id, outcome = outcome.as_str(), "Upsert applied");
        Ok(outcome)
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Item store pool closed");
    }
}
