//! Re-crawls converge on the latest observed version of each item

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use futures::future::join_all;
use hn_ingest::crawler::{Pipeline, PipelineConfig, RetryPolicy};
use hn_ingest::feed::{classify, RawItem};
use hn_ingest::store::{ItemStore, MemoryStore, UpsertOutcome};
use hn_ingest::IdRange;
use std::sync::Arc;

use crate::common::{default_item, InstrumentedStore, ScriptedFeed};

fn config() -> PipelineConfig {
    PipelineConfig::default()
        .with_workers(4, 4)
        .with_fetch_retry(RetryPolicy::unbounded())
}

#[tokio::test]
async fn test_mutable_fields_follow_the_feed() {
    let feed = Arc::new(ScriptedFeed::new(21));
    let store = Arc::new(InstrumentedStore::new());
    let range = IdRange::new(1, 21);

    Pipeline::new(config(), feed.clone(), store.clone())
        .run(range)
        .await
        .unwrap();
    assert_eq!(store.inner.get(21).unwrap().score, Some(1));

    feed.set_item(RawItem {
        score: Some(250),
        descendants: Some(40),
        title: Some("Story 21 (edited)".to_string()),
        kids: Some(vec![22, 23]),
        ..default_item(21)
    });
    feed.set_item(RawItem {
        text: Some("[flagged]".to_string()),
        dead: Some(true),
        ..default_item(5)
    });

    Pipeline::new(config(), feed, store.clone())
        .run(range)
        .await
        .unwrap();

    let story = store.inner.get(21).unwrap();
    assert_eq!(story.score, Some(250));
    assert_eq!(story.descendants, Some(40));
    assert_eq!(story.title.as_deref(), Some("Story 21 (edited)"));
    assert_eq!(story.kids, vec![22, 23]);

    let comment = store.inner.get(5).unwrap();
    assert!(comment.dead);
    assert_eq!(comment.text.as_deref(), Some("[flagged]"));
}

#[tokio::test]
async fn test_immutable_fields_keep_first_observation() {
    let feed = Arc::new(ScriptedFeed::new(3));
    let store = Arc::new(InstrumentedStore::new());
    let range = IdRange::new(1, 3);

    Pipeline::new(config(), feed.clone(), store.clone())
        .run(range)
        .await
        .unwrap();

    feed.set_item(RawItem {
        by: Some("someone_else".to_string()),
        parent: Some(1),
        ..default_item(3)
    });

    Pipeline::new(config(), feed, store.clone())
        .run(range)
        .await
        .unwrap();

    let comment = store.inner.get(3).unwrap();
    assert_eq!(comment.parent, Some(2));
    assert_eq!(comment.by.as_deref(), Some("dang"));
}

#[tokio::test]
async fn test_out_of_order_completion_keeps_newest_version() {
    let store = Arc::new(MemoryStore::new());
    let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

    // Versions of one story fetched at increasing times, written in
    // scrambled order and concurrently.
    let order = [3, 0, 4, 1, 2];
    let writes = order.iter().map(|&version| {
        let store = store.clone();
        async move {
            let raw = RawItem {
                score: Some(version * 10),
                ..default_item(1)
            };
            let entity = classify(raw, base + ChronoDuration::seconds(version)).unwrap();
            store.upsert(&entity).await.unwrap()
        }
    });
    let outcomes = join_all(writes).await;

    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == UpsertOutcome::Inserted)
            .count(),
        1
    );

    let row = store.get(1).unwrap();
    assert_eq!(row.score, Some(40));
    assert_eq!(row.fetched_at, base + ChronoDuration::seconds(4));
}

#[tokio::test]
async fn test_stale_version_is_reported() {
    let store = MemoryStore::new();
    let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

    let newer = classify(RawItem { score: Some(9), ..default_item(1) }, base).unwrap();
    let older = classify(
        RawItem { score: Some(1), ..default_item(1) },
        base - ChronoDuration::seconds(30),
    )
    .unwrap();

    assert_eq!(store.upsert(&newer).await.unwrap(), UpsertOutcome::Inserted);
    assert_eq!(store.upsert(&older).await.unwrap(), UpsertOutcome::Stale);
    assert_eq!(store.get(1).unwrap().score, Some(9));
}
