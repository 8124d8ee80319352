//! Work enqueuer
//!
//! Pushes every id of the range onto the bounded id queue in ascending
//! order. The queue is small, so the enqueuer spends most of a run parked on
//! `send` and never runs far ahead of the fetch pool.

use async_channel::Sender;
use tracing::{debug, info};

use crate::crawler::drain::SharedDrain;
use crate::crawler::fetch_pool::FetchTask;
use crate::crawler::stats::SharedStats;
use crate::IdRange;

/// Enqueue `range` and mark the producer done.
///
/// Each id is counted as outstanding before it is sent so the drain can
/// never observe zero outstanding ids while one is in the queue.
pub async fn enqueue(
    range: IdRange,
    ids: Sender<FetchTask>,
    drain: SharedDrain,
    stats: SharedStats,
) {
    let mut sent = 0u64;

    for id in range.ids() {
        drain.id_enqueued();
        if ids.send(FetchTask::new(id)).await.is_err() {
            // Queue closed underneath us: the run is being torn down.
            drain.id_completed();
            debug!(id, "Id queue closed, stopping enqueuer");
            break;
        }
        stats.record_enqueued();
        sent += 1;
    }

    drain.mark_producer_done();
    info!(enqueued = sent, range = %range, "Finished enqueueing ids");
}
