//! Drain coordination
//!
//! Tracks logical completion of the two pipeline stages. An id counts as
//! outstanding from the moment it is enqueued until a fetch worker finishes
//! with it for good (classified, dropped or dead-lettered); requeueing a
//! failed id leaves it outstanding. An entity counts as outstanding from the
//! moment a fetch worker hands it over until a persistence worker is done
//! with it. The run is drained once the enqueuer has finished and both
//! counts are zero.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared handle to a drain coordinator.
pub type SharedDrain = Arc<DrainCoordinator>;

/// Outstanding-work counters for one run
#[derive(Debug, Default)]
pub struct DrainCoordinator {
    pending_ids: AtomicU64,
    pending_entities: AtomicU64,
    producer_done: AtomicBool,
    notify: Notify,
}

impl DrainCoordinator {
    /// Create a coordinator with nothing outstanding
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new shared coordinator wrapped in [`Arc`].
    pub fn shared() -> SharedDrain {
        Arc::new(Self::new())
    }

    /// An id was handed to the id queue
    pub fn id_enqueued(&self) {
        self.pending_ids.fetch_add(1, Ordering::SeqCst);
    }

    /// A fetch worker is finished with an id
    pub fn id_completed(&self) {
        if self.pending_ids.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }

    /// A fetch worker is about to hand an entity to persistence.
    ///
    /// Must be called before the corresponding [`id_completed`](Self::id_completed)
    /// so both counters are never zero while the entity is in flight.
    pub fn entity_enqueued(&self) {
        self.pending_entities.fetch_add(1, Ordering::SeqCst);
    }

    /// A persistence worker is finished with an entity
    pub fn entity_completed(&self) {
        if self.pending_entities.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }

    /// The enqueuer will not produce further ids
    pub fn mark_producer_done(&self) {
        self.producer_done.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Ids enqueued and not yet completed
    pub fn pending_ids(&self) -> u64 {
        self.pending_ids.load(Ordering::SeqCst)
    }

    /// Entities handed over and not yet completed
    pub fn pending_entities(&self) -> u64 {
        self.pending_entities.load(Ordering::SeqCst)
    }

    /// Whether the enqueuer has finished
    pub fn is_producer_done(&self) -> bool {
        self.producer_done.load(Ordering::SeqCst)
    }

    /// Whether all work has logically completed
    pub fn is_drained(&self) -> bool {
        // Ids first: an entity is counted before its id completes.
        self.is_producer_done() && self.pending_ids() == 0 && self.pending_entities() == 0
    }

    /// Wait until [`is_drained`](Self::is_drained) holds.
    pub async fn wait_drained(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a notification between the check
            // and the await is not lost.
            notified.as_mut().enable();

            if self.is_drained() {
                return;
            }
            notified.await;
        }
    }
}
