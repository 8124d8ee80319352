//! Watermark resolution
//!
//! Items keep mutating after they are first seen (scores, comment counts,
//! edits, deletions), so each run re-crawls everything created within the
//! lookback window in addition to ids the store has never seen.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info};

use crate::crawler::{CrawlError, CrawlResult};
use crate::feed::ItemSource;
use crate::store::ItemStore;
use crate::{IdRange, ItemId};

/// Compute the id range for this run.
///
/// The start is one past the smallest stored id created after
/// `now - lookback`. With nothing in the window it falls back to one past the
/// largest stored id, and to `1` for an empty store. The end is the feed's
/// current maximum id. A start past the end yields an empty range.
pub async fn resolve(
    source: &dyn ItemSource,
    store: &dyn ItemStore,
    lookback: Duration,
    now: DateTime<Utc>,
) -> CrawlResult<IdRange> {
    let cutoff = cutoff(now, lookback)?;

    let start = match store
        .min_id_since(cutoff)
        .await
        .map_err(CrawlError::StoreUnavailable)?
    {
        Some(min_recent) => {
            debug!(min_recent, %cutoff, "Found recent items in lookback window");
            next_id(min_recent)
        }
        None => match store.max_id().await.map_err(CrawlError::StoreUnavailable)? {
            Some(max_stored) => {
                debug!(max_stored, %cutoff, "No items in lookback window, resuming after newest");
                next_id(max_stored)
            }
            None => {
                debug!("Store is empty, crawling from the first id");
                1
            }
        },
    };

    let end = source
        .max_item_id()
        .await
        .map_err(CrawlError::UpstreamUnavailable)?;

    let range = IdRange::new(start, end);
    info!(
        start = range.start,
        end = range.end,
        ids = range.len(),
        lookback_secs = lookback.as_secs(),
        "Resolved crawl range"
    );
    Ok(range)
}

fn cutoff(now: DateTime<Utc>, lookback: Duration) -> CrawlResult<DateTime<Utc>> {
    chrono::Duration::from_std(lookback)
        .ok()
        .and_then(|lookback| now.checked_sub_signed(lookback))
        .ok_or_else(|| CrawlError::InvalidConfig(format!("lookback {lookback:?} out of range")))
}

fn next_id(id: ItemId) -> ItemId {
    id.saturating_add(1)
}
