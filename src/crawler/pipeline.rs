//! Pipeline orchestration
//!
//! Wires the enqueuer, the fetch pool and the persistence pool together for
//! one run and waits for the drain coordinator to report completion.

use chrono::Utc;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tracing::{info, info_span, warn, Instrument};

use crate::crawler::config::PipelineConfig;
use crate::crawler::dead_letter::DeadLetterLog;
use crate::crawler::drain::DrainCoordinator;
use crate::crawler::enqueuer::enqueue;
use crate::crawler::fetch_pool::{fetch_worker, FetchContext, FetchTask};
use crate::crawler::persist_pool::{persist_worker, PersistContext};
use crate::crawler::progress::{self, ProgressState};
use crate::crawler::stats::{RunStats, RunSummary, SharedStats};
use crate::crawler::{watermark, CrawlError, CrawlResult};
use crate::feed::ItemSource;
use crate::metrics::RunMetrics;
use crate::shutdown::SharedShutdown;
use crate::store::ItemStore;
use crate::{Entity, IdRange};

/// One crawl run over a feed and a store
pub struct Pipeline {
    config: PipelineConfig,
    source: Arc<dyn ItemSource>,
    store: Arc<dyn ItemStore>,
    shutdown: Option<SharedShutdown>,
    dead_letters: Arc<DeadLetterLog>,
    stats: SharedStats,
}

impl Pipeline {
    /// Create a pipeline; dead letters are only logged until
    /// [`with_dead_letters`](Self::with_dead_letters) is called.
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn ItemSource>,
        store: Arc<dyn ItemStore>,
    ) -> Self {
        Self {
            config,
            source,
            store,
            shutdown: None,
            dead_letters: Arc::new(DeadLetterLog::disabled()),
            stats: RunStats::shared(),
        }
    }

    /// Cancel the run when `shutdown` fires
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Append dead letters to `log`
    pub fn with_dead_letters(mut self, log: DeadLetterLog) -> Self {
        self.dead_letters = Arc::new(log);
        self
    }

    /// Live counters of this pipeline's run
    pub fn stats(&self) -> SharedStats {
        self.stats.clone()
    }

    /// Pipeline configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Resolve the id range from the store watermark and the feed maximum
    pub async fn plan(&self) -> CrawlResult<IdRange> {
        watermark::resolve(
            self.source.as_ref(),
            self.store.as_ref(),
            self.config.lookback,
            Utc::now(),
        )
        .await
    }

    /// Plan the range and crawl it.
    pub async fn run_incremental(self) -> CrawlResult<RunSummary> {
        match self.plan().await {
            Ok(range) => self.run(range).await,
            Err(e) => {
                self.close().await;
                Err(e)
            }
        }
    }

    /// Release the store without running
    pub async fn close(self) {
        self.store.close().await;
    }

    /// Crawl `range` until every id has been persisted, dropped or
    /// dead-lettered. The store is closed on every exit path.
    pub async fn run(self, range: IdRange) -> CrawlResult<RunSummary> {
        let span = info_span!("crawl", range = %range, feed = self.source.base_url());
        let result = self.execute(range).instrument(span).await;
        self.store.close().await;
        result
    }

    async fn execute(&self, range: IdRange) -> CrawlResult<RunSummary> {
        self.config.validate()?;

        let metrics = RunMetrics::start(range.len());
        if range.is_empty() {
            info!("Store is caught up with the feed, nothing to crawl");
            metrics.record_success(0);
            return Ok(self.stats.snapshot());
        }

        let config = &self.config;
        info!(
            fetch_workers = config.fetch_workers,
            persist_workers = config.persist_workers,
            id_queue = config.id_queue_capacity,
            entity_queue = config.entity_queue_capacity,
            max_fetch_attempts = %config.fetch_retry.describe_max(),
            "Starting pipeline"
        );

        let (ids_tx, ids_rx) = async_channel::bounded::<FetchTask>(config.id_queue_capacity);
        let (entities_tx, entities_rx) =
            async_channel::bounded::<Entity>(config.entity_queue_capacity);
        let drain = DrainCoordinator::shared();

        let mut workers = JoinSet::new();

        let persist_ctx = PersistContext {
            store: self.store.clone(),
            entities: entities_rx,
            drain: drain.clone(),
            stats: self.stats.clone(),
            retry: config.store_retry,
            dead_letters: self.dead_letters.clone(),
        };
        for worker in 0..config.persist_workers {
            workers.spawn(persist_worker(worker, persist_ctx.clone()));
        }
        drop(persist_ctx);

        let fetch_ctx = FetchContext {
            source: self.source.clone(),
            ids_rx,
            ids_tx: ids_tx.clone(),
            entities: entities_tx.clone(),
            drain: drain.clone(),
            stats: self.stats.clone(),
            retry: config.fetch_retry,
            dead_letters: self.dead_letters.clone(),
        };
        for worker in 0..config.fetch_workers {
            workers.spawn(fetch_worker(worker, fetch_ctx.clone()));
        }
        drop(fetch_ctx);

        workers.spawn(enqueue(
            range,
            ids_tx.clone(),
            drain.clone(),
            self.stats.clone(),
        ));

        let reporter = tokio::spawn(progress::report(
            ProgressState::new(range.len(), config.progress_interval),
            self.stats.clone(),
            drain.clone(),
        ));

        let outcome = loop {
            tokio::select! {
                biased;
                _ = drain.wait_drained() => break Ok(()),
                _ = wait_for_shutdown(self.shutdown.as_ref()) => break Err(CrawlError::Cancelled),
                Some(joined) = workers.join_next() => {
                    if let Err(e) = joined {
                        break Err(worker_failure(e));
                    }
                }
            }
        };

        reporter.abort();
        ids_tx.close();
        entities_tx.close();

        if outcome.is_err() {
            workers.abort_all();
        }
        let joined = join_all(&mut workers).await;

        let outcome = outcome.and(joined);
        let summary = self.stats.snapshot();
        match &outcome {
            Ok(()) => {
                metrics.record_success(summary.persisted());
                info!(
                    fetched = summary.fetched,
                    inserted = summary.inserted,
                    updated = summary.updated,
                    stale = summary.stale,
                    unrecognized = summary.unrecognized,
                    fetch_retries = summary.fetch_retries,
                    dead_lettered = summary.dead_lettered(),
                    "Crawl complete"
                );
            }
            Err(e) => {
                metrics.record_failure(&e.to_string());
                warn!(
                    completed = self.stats.ids_completed(),
                    pending_ids = drain.pending_ids(),
                    pending_entities = drain.pending_entities(),
                    "Crawl stopped before draining"
                );
            }
        }

        outcome.map(|()| summary)
    }
}

async fn wait_for_shutdown(shutdown: Option<&SharedShutdown>) {
    match shutdown {
        Some(shutdown) => shutdown.wait_for_shutdown().await,
        None => std::future::pending().await,
    }
}

async fn join_all(workers: &mut JoinSet<()>) -> CrawlResult<()> {
    let mut first_failure = None;
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            if !e.is_cancelled() && first_failure.is_none() {
                first_failure = Some(worker_failure(e));
            }
        }
    }
    first_failure.map_or(Ok(()), Err)
}

fn worker_failure(error: JoinError) -> CrawlError {
    CrawlError::Worker(error.to_string())
}
