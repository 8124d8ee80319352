//! End-to-end pipeline runs against a scripted feed and the memory store

use hn_ingest::crawler::{Pipeline, PipelineConfig, RetryPolicy};
use hn_ingest::store::{ItemRow, ItemStore};
use hn_ingest::{IdRange, ItemKind};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{InstrumentedStore, ScriptedFeed};

fn config() -> PipelineConfig {
    PipelineConfig::default()
        .with_workers(16, 8)
        .with_queue_capacities(2, 300)
        .with_fetch_retry(RetryPolicy::unbounded())
}

#[tokio::test]
async fn test_every_id_in_range_is_persisted_once() {
    let feed = Arc::new(ScriptedFeed::new(1005));
    let store = Arc::new(InstrumentedStore::new());

    let summary = Pipeline::new(config(), feed.clone(), store.clone())
        .run_incremental()
        .await
        .unwrap();

    assert_eq!(summary.enqueued, 1005);
    assert_eq!(summary.fetched, 1005);
    assert_eq!(summary.inserted, 1005);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.dead_lettered(), 0);
    assert_eq!(feed.fetch_count(), 1005);

    let rows = store.inner.rows();
    assert_eq!(rows.len(), 1005);
    assert_eq!(rows.first().map(|r| r.id), Some(1));
    assert_eq!(rows.last().map(|r| r.id), Some(1005));
    assert!(store.is_closed(), "store must be closed after the run");
}

#[tokio::test]
async fn test_rows_carry_classified_fields() {
    let feed = Arc::new(ScriptedFeed::new(12));
    let store = Arc::new(InstrumentedStore::new());

    Pipeline::new(config(), feed, store.clone())
        .run(IdRange::new(1, 12))
        .await
        .unwrap();

    let story = store.inner.get(11).unwrap();
    assert_eq!(story.kind, ItemKind::Story);
    assert_eq!(story.title.as_deref(), Some("Story 11"));
    assert_eq!(story.kids, vec![12]);
    assert_eq!(story.parent, None);

    let comment = store.inner.get(12).unwrap();
    assert_eq!(comment.kind, ItemKind::Comment);
    assert_eq!(comment.parent, Some(11));
    assert_eq!(comment.by.as_deref(), Some("dang"));
}

#[tokio::test]
async fn test_rerun_over_same_range_is_idempotent() {
    let feed = Arc::new(ScriptedFeed::new(200));
    let store = Arc::new(InstrumentedStore::new());
    let range = IdRange::new(1, 200);

    Pipeline::new(config(), feed.clone(), store.clone())
        .run(range)
        .await
        .unwrap();
    let first = store.inner.rows();

    let summary = Pipeline::new(config(), feed, store.clone())
        .run(range)
        .await
        .unwrap();
    let second = store.inner.rows();

    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.updated, 200);
    assert_eq!(first.len(), second.len());
    for (before, after) in first.iter().zip(&second) {
        // fetched_at records when the row was last written, not item content
        assert!(after.fetched_at >= before.fetched_at);
        let after = ItemRow {
            fetched_at: before.fetched_at,
            ..after.clone()
        };
        assert_eq!(before, &after);
    }
}

#[tokio::test]
async fn test_incremental_rerun_starts_after_smallest_recent_id() {
    let feed = Arc::new(ScriptedFeed::new(50));
    let store = Arc::new(InstrumentedStore::new());

    Pipeline::new(config(), feed.clone(), store.clone())
        .run_incremental()
        .await
        .unwrap();

    // Everything was created just now, so the window covers the whole table.
    let pipeline = Pipeline::new(config(), feed, store.clone());
    assert_eq!(pipeline.plan().await.unwrap(), IdRange::new(2, 50));
    let summary = pipeline.run_incremental().await.unwrap();
    assert_eq!(summary.enqueued, 49);
    assert_eq!(store.inner.len(), 50);
}

#[tokio::test]
async fn test_caught_up_store_runs_empty_range() {
    let feed = Arc::new(ScriptedFeed::new(30));
    let store = Arc::new(InstrumentedStore::new());

    Pipeline::new(config(), feed.clone(), store.clone())
        .run_incremental()
        .await
        .unwrap();

    // A zero lookback leaves nothing in the window: resume after the newest id.
    let config = config().with_lookback(Duration::ZERO);
    let pipeline = Pipeline::new(config, feed.clone(), store.clone());
    let range = pipeline.plan().await.unwrap();
    assert!(range.is_empty(), "expected empty range, got {range}");

    let fetches_before = feed.fetch_count();
    let summary = pipeline.run(range).await.unwrap();
    assert_eq!(summary.enqueued, 0);
    assert_eq!(feed.fetch_count(), fetches_before);
    assert_eq!(store.max_id().await.unwrap(), Some(30));
}

#[tokio::test]
async fn test_slow_feed_still_drains() {
    let feed = Arc::new(ScriptedFeed::new(60).with_delay(Duration::from_millis(5)));
    let store = Arc::new(InstrumentedStore::new());

    let summary = tokio::time::timeout(
        Duration::from_secs(10),
        Pipeline::new(config(), feed, store.clone()).run(IdRange::new(1, 60)),
    )
    .await
    .expect("pipeline did not drain")
    .unwrap();

    assert_eq!(summary.persisted(), 60);
    assert_eq!(store.inner.len(), 60);
}
