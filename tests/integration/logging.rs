//! Integration tests for logging and tracing

use hn_ingest::crawler::{Pipeline, PipelineConfig, RetryPolicy};
use hn_ingest::IdRange;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::common::{InstrumentedStore, ScriptedFeed};

#[test]
fn test_tracing_subscriber_initialization() {
    // try_init: another test may have installed a subscriber already
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hn_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

#[test]
fn test_tracing_json_format() {
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new("hn_ingest=info"))
        .with_test_writer()
        .try_init();
}

#[test]
fn test_env_filter_parsing() {
    for directive in ["info", "hn_ingest=debug", "hn_ingest::crawler=trace,sqlx=warn"] {
        assert!(EnvFilter::try_new(directive).is_ok(), "rejected {directive}");
    }
}

#[tokio::test]
async fn test_pipeline_runs_with_trace_logging_enabled() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("hn_ingest=trace"))
        .with_test_writer()
        .try_init();

    let feed = Arc::new(ScriptedFeed::new(20).failing(2, 1));
    let store = Arc::new(InstrumentedStore::new());
    let config = PipelineConfig::default()
        .with_workers(2, 2)
        .with_fetch_retry(RetryPolicy::unbounded());

    let summary = Pipeline::new(config, feed, store)
        .run(IdRange::new(1, 20))
        .await
        .unwrap();
    assert_eq!(summary.persisted(), 20);
}
