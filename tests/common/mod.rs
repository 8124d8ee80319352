//! Scripted feeds and instrumented stores shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hn_ingest::feed::{FeedError, FeedResult, ItemSource, RawItem};
use hn_ingest::store::{ItemStore, MemoryStore, StoreError, StoreResult, UpsertOutcome};
use hn_ingest::{Entity, ItemId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Payload the scripted feed serves for `id` unless overridden.
///
/// Every tenth id (1, 11, 21, ...) is a story; the rest are comments
/// replying to the previous id.
pub fn default_item(id: ItemId) -> RawItem {
    let time = Some(Utc::now().timestamp());
    if id % 10 == 1 {
        RawItem {
            id,
            kind: Some("story".to_string()),
            by: Some("pg".to_string()),
            time,
            title: Some(format!("Story {id}")),
            url: Some(format!("https://example.com/{id}")),
            score: Some(1),
            descendants: Some(0),
            kids: Some(vec![id + 1]),
            ..Default::default()
        }
    } else {
        RawItem {
            id,
            kind: Some("comment".to_string()),
            by: Some("dang".to_string()),
            time,
            text: Some(format!("Comment {id}")),
            parent: Some(id - 1),
            ..Default::default()
        }
    }
}

/// In-process feed with per-id failure scripts
pub struct ScriptedFeed {
    max_id: ItemId,
    overrides: Mutex<HashMap<ItemId, RawItem>>,
    failures: Mutex<HashMap<ItemId, u32>>,
    always_fail: HashSet<ItemId>,
    missing_once: Mutex<HashSet<ItemId>>,
    delay: Option<Duration>,
    fetches: AtomicU64,
}

impl ScriptedFeed {
    pub fn new(max_id: ItemId) -> Self {
        Self {
            max_id,
            overrides: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            always_fail: HashSet::new(),
            missing_once: Mutex::new(HashSet::new()),
            delay: None,
            fetches: AtomicU64::new(0),
        }
    }

    /// Serve `raw` for its id
    pub fn with_item(self, raw: RawItem) -> Self {
        self.set_item(raw);
        self
    }

    /// Answer `503` for the first `times` fetches of `id`
    pub fn failing(self, id: ItemId, times: u32) -> Self {
        self.failures.lock().unwrap().insert(id, times);
        self
    }

    /// Answer `503` for every fetch of `id`
    pub fn always_failing(mut self, id: ItemId) -> Self {
        self.always_fail.insert(id);
        self
    }

    /// Answer `null` for the first fetch of `id`
    pub fn missing_once(self, id: ItemId) -> Self {
        self.missing_once.lock().unwrap().insert(id);
        self
    }

    /// Sleep before answering each fetch
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the payload served for `raw.id`
    pub fn set_item(&self, raw: RawItem) {
        self.overrides.lock().unwrap().insert(raw.id, raw);
    }

    /// Fetch calls so far, failed ones included
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ItemSource for ScriptedFeed {
    async fn max_item_id(&self) -> FeedResult<ItemId> {
        Ok(self.max_id)
    }

    async fn fetch_item(&self, id: ItemId) -> FeedResult<RawItem> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.always_fail.contains(&id) {
            return Err(FeedError::HttpError("status 503: Service Unavailable".to_string()));
        }

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(FeedError::HttpError(
                        "status 503: Service Unavailable".to_string(),
                    ));
                }
            }
        }

        if self.missing_once.lock().unwrap().remove(&id) {
            return Err(FeedError::Missing(id));
        }

        let payload = self.overrides.lock().unwrap().get(&id).cloned();
        Ok(payload.unwrap_or_else(|| default_item(id)))
    }

    fn base_url(&self) -> &str {
        "memory://scripted"
    }
}

/// Feed that never answers an item request
pub struct StalledFeed {
    pub max_id: ItemId,
}

#[async_trait]
impl ItemSource for StalledFeed {
    async fn max_item_id(&self) -> FeedResult<ItemId> {
        Ok(self.max_id)
    }

    async fn fetch_item(&self, _id: ItemId) -> FeedResult<RawItem> {
        std::future::pending().await
    }

    fn base_url(&self) -> &str {
        "memory://stalled"
    }
}

/// Memory store whose upserts wait for permits, fail for chosen ids and
/// record whether the store was closed
pub struct InstrumentedStore {
    pub inner: MemoryStore,
    gate: Option<Semaphore>,
    rejected: HashSet<ItemId>,
    closed: AtomicBool,
}

impl InstrumentedStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            gate: None,
            rejected: HashSet::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Hold every upsert until [`open_gate`](Self::open_gate)
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    /// Fail every upsert of `id`
    pub fn rejecting(mut self, id: ItemId) -> Self {
        self.rejected.insert(id);
        self
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1_000_000);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ItemStore for InstrumentedStore {
    async fn min_id_since(&self, cutoff: DateTime<Utc>) -> StoreResult<Option<ItemId>> {
        self.inner.min_id_since(cutoff).await
    }

    async fn max_id(&self) -> StoreResult<Option<ItemId>> {
        self.inner.max_id().await
    }

    async fn upsert(&self, entity: &Entity) -> StoreResult<UpsertOutcome> {
        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| StoreError::ConnectionError(e.to_string()))?;
        }
        if self.rejected.contains(&entity.id()) {
            return Err(StoreError::QueryError(
                "value too long for type character varying(80)".to_string(),
            ));
        }
        self.inner.upsert(entity).await
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
