//! In-memory item store
//!
//! Same upsert contract as the Postgres store, kept in a `BTreeMap` behind a
//! mutex. Used by tests and benches.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::store::{item_id, ItemRow, ItemStore, StoreError, StoreResult, UpsertOutcome};
use crate::{Entity, ItemId};

/// Item store held in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<i64, ItemRow>>,
    upserts: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored row for `id`
    pub fn get(&self, id: ItemId) -> Option<ItemRow> {
        let key = i64::try_from(id).ok()?;
        self.rows.lock().ok()?.get(&key).cloned()
    }

    /// All rows in id order
    pub fn rows(&self) -> Vec<ItemRow> {
        self.rows
            .lock()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.rows.lock().map(|map| map.len()).unwrap_or(0)
    }

    /// Whether no rows are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of upsert calls that reached the store
    pub fn upsert_count(&self) -> u64 {
        self.upserts.load(Ordering::SeqCst)
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, BTreeMap<i64, ItemRow>>> {
        self.rows
            .lock()
            .map_err(|e| StoreError::ConnectionError(format!("store lock poisoned: {e}")))
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn min_id_since(&self, cutoff: DateTime<Utc>) -> StoreResult<Option<ItemId>> {
        let rows = self.lock()?;
        rows.values()
            .filter(|row| row.time > cutoff)
            .map(|row| row.id)
            .min()
            .map(item_id)
            .transpose()
    }

    async fn max_id(&self) -> StoreResult<Option<ItemId>> {
        let rows = self.lock()?;
        rows.keys().next_back().copied().map(item_id).transpose()
    }

    async fn upsert(&self, entity: &Entity) -> StoreResult<UpsertOutcome> {
        let row = ItemRow::from_entity(entity)?;
        self.upserts.fetch_add(1, Ordering::SeqCst);

        let mut rows = self.lock()?;
        let outcome = match rows.entry(row.id) {
            Entry::Vacant(slot) => {
                slot.insert(row);
                UpsertOutcome::Inserted
            }
            Entry::Occupied(mut slot) => {
                if slot.get_mut().merge_mutable(&row) {
                    UpsertOutcome::Updated
                } else {
                    UpsertOutcome::Stale
                }
            }
        };
        Ok(outcome)
    }

    async fn close(&self) {}
}
