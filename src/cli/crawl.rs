//! Crawl command implementation

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::crawler::config::{
    DEFAULT_ENTITY_QUEUE_CAPACITY, DEFAULT_FETCH_WORKERS, DEFAULT_ID_QUEUE_CAPACITY,
    DEFAULT_MAX_FETCH_ATTEMPTS, DEFAULT_PERSIST_WORKERS, DEFAULT_POOL_SIZE, DEFAULT_STORE_ATTEMPTS,
};
use crate::crawler::stats::SharedStats;
use crate::crawler::{
    CrawlError, DeadLetterLog, Pipeline, PipelineConfig, RetryPolicy, RunSummary,
};
use crate::feed::HackerNewsClient;
use crate::shutdown::SharedShutdown;
use crate::store::postgres::DEFAULT_ACQUIRE_TIMEOUT_SECS;
use crate::store::{PgItemStore, PgStoreConfig};

use super::CliError;

const PROGRESS_REFRESH: Duration = Duration::from_millis(250);

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}";

/// Parse a worker count or queue capacity
fn parse_count(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("value must be at least 1".to_string());
    }
    Ok(value)
}

/// Hacker News ingest CLI
#[derive(Parser, Debug)]
#[command(name = "hn-ingest")]
#[command(about = "Incrementally mirror the Hacker News item feed into PostgreSQL", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Re-crawl items created within this many hours, to pick up score,
    /// comment and edit changes
    #[arg(value_name = "LOOKBACK_HOURS", default_value_t = 2)]
    pub lookback_hours: u64,

    /// Concurrent feed requests
    #[arg(long, default_value_t = DEFAULT_FETCH_WORKERS, value_parser = parse_count)]
    pub fetch_workers: usize,

    /// Concurrent store writers
    #[arg(long, default_value_t = DEFAULT_PERSIST_WORKERS, value_parser = parse_count)]
    pub persist_workers: usize,

    /// Id queue capacity
    #[arg(long, default_value_t = DEFAULT_ID_QUEUE_CAPACITY, value_parser = parse_count)]
    pub id_queue: usize,

    /// Entity queue capacity between fetch and persistence
    #[arg(long, default_value_t = DEFAULT_ENTITY_QUEUE_CAPACITY, value_parser = parse_count)]
    pub entity_queue: usize,

    /// Store connection pool size
    #[arg(long, default_value_t = DEFAULT_POOL_SIZE, value_parser = clap::value_parser!(u32).range(1..))]
    pub pool_size: u32,

    /// Fetch attempts per id before it is dead-lettered (0 retries forever)
    #[arg(long, default_value_t = DEFAULT_MAX_FETCH_ATTEMPTS)]
    pub max_fetch_attempts: u32,

    /// Upsert attempts per item before it is dead-lettered
    #[arg(long, default_value_t = DEFAULT_STORE_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub store_attempts: u32,

    /// Feed base URL
    #[arg(long, default_value = HackerNewsClient::DEFAULT_BASE_URL)]
    pub feed_url: String,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Seconds to wait for a store connection before giving up
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = DEFAULT_ACQUIRE_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub connect_timeout: u64,

    /// Append items that could not be fetched or stored to this JSON-lines file
    #[arg(long)]
    pub dead_letter: Option<PathBuf>,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    /// Disable the progress bar
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,
}

impl Cli {
    /// Pipeline configuration from the flags
    pub fn pipeline_config(&self) -> PipelineConfig {
        let fetch_retry = match self.max_fetch_attempts {
            0 => RetryPolicy::unbounded(),
            attempts => RetryPolicy::bounded(attempts),
        };

        let lookback = Duration::from_secs(self.lookback_hours.saturating_mul(3600));

        PipelineConfig {
            pool_size: self.pool_size,
            ..PipelineConfig::default()
        }
        .with_lookback(lookback)
        .with_workers(self.fetch_workers, self.persist_workers)
        .with_queue_capacities(self.id_queue, self.entity_queue)
        .with_fetch_retry(fetch_retry)
        .with_store_retry(RetryPolicy::bounded(self.store_attempts))
    }

    /// Run one incremental crawl
    pub async fn execute(&self, shutdown: SharedShutdown) -> Result<RunSummary, CliError> {
        if let Some(addr) = self.metrics_addr {
            crate::metrics::init_metrics(addr)?;
        }

        let config = self.pipeline_config();
        config.validate()?;

        let database_url = self.database_url.clone().ok_or_else(|| {
            CliError::ConfigurationError(
                "no database configured: pass --database-url or set DATABASE_URL".to_string(),
            )
        })?;

        let source = HackerNewsClient::with_base_url(&self.feed_url, config.fetch_workers)?;
        let store_config = PgStoreConfig::new(database_url, config.pool_size)
            .with_acquire_timeout(Duration::from_secs(self.connect_timeout));
        let store = PgItemStore::connect(&store_config)
            .await
            .map_err(CrawlError::StoreUnavailable)?;

        let mut pipeline = Pipeline::new(config, Arc::new(source), Arc::new(store));
        pipeline = pipeline.with_shutdown(shutdown);

        if let Some(path) = &self.dead_letter {
            match DeadLetterLog::open(path).await {
                Ok(log) => pipeline = pipeline.with_dead_letters(log),
                Err(e) => {
                    pipeline.close().await;
                    return Err(e.into());
                }
            }
        }

        let range = match pipeline.plan().await {
            Ok(range) => range,
            Err(e) => {
                pipeline.close().await;
                return Err(e.into());
            }
        };

        let show_bar = !self.no_progress && !range.is_empty() && std::io::stderr().is_terminal();
        let bar = show_bar.then(|| spawn_progress_bar(range.len(), pipeline.stats()));

        let result = pipeline.run(range).await;

        if let Some((pb, updater)) = bar {
            updater.abort();
            pb.finish_and_clear();
        }

        let summary = result?;
        info!(
            persisted = summary.persisted(),
            dead_lettered = summary.dead_lettered(),
            "Crawl finished"
        );
        Ok(summary)
    }
}

fn spawn_progress_bar(total: u64, stats: SharedStats) -> (ProgressBar, JoinHandle<()>) {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_TEMPLATE) {
        pb.set_style(style.progress_chars("#>-"));
    }

    let updater = tokio::spawn({
        let pb = pb.clone();
        async move {
            let mut ticker = tokio::time::interval(PROGRESS_REFRESH);
            loop {
                ticker.tick().await;
                let summary = stats.snapshot();
                pb.set_position(stats.ids_completed());
                pb.set_message(format!(
                    "{} stored, {} retries",
                    summary.persisted(),
                    summary.fetch_retries
                ));
            }
        }
    });

    (pb, updater)
}
