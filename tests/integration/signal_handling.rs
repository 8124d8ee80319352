use std::sync::Arc;
use std::time::Duration;

use hn_ingest::crawler::{CrawlError, Pipeline, PipelineConfig};
use hn_ingest::shutdown::ShutdownCoordinator;
use hn_ingest::IdRange;

use crate::common::{InstrumentedStore, StalledFeed};

#[tokio::test]
async fn shutdown_notifies_waiters() {
    let shutdown = ShutdownCoordinator::shared();
    let waiter = {
        let handle = shutdown.clone();
        tokio::spawn(async move {
            handle.wait_for_shutdown().await;
            true
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.request_shutdown();

    let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn shutdown_concurrent_waiters_all_notified() {
    let shutdown = ShutdownCoordinator::shared();
    let waiters: Vec<_> = (0..8)
        .map(|_| {
            let handle = shutdown.clone();
            tokio::spawn(async move { handle.wait_for_shutdown().await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown.request_shutdown();

    for waiter in waiters {
        let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(result.is_ok(), "a waiter missed the shutdown notification");
    }
}

#[tokio::test]
async fn shutdown_cancels_run_and_closes_store() {
    let shutdown = ShutdownCoordinator::shared();
    let store = Arc::new(InstrumentedStore::new());
    let pipeline = Pipeline::new(
        PipelineConfig::default().with_workers(4, 2),
        Arc::new(StalledFeed { max_id: 1_000 }),
        store.clone(),
    )
    .with_shutdown(shutdown.clone());

    let run = tokio::spawn(pipeline.run(IdRange::new(1, 1_000)));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!run.is_finished());

    shutdown.request_shutdown();

    let result = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("run ignored shutdown")
        .unwrap();
    assert!(matches!(result, Err(CrawlError::Cancelled)));
    assert!(store.is_closed());
}

#[tokio::test]
async fn shutdown_before_run_cancels_immediately() {
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();

    let result = Pipeline::new(
        PipelineConfig::default().with_workers(2, 2),
        Arc::new(StalledFeed { max_id: 10 }),
        Arc::new(InstrumentedStore::new()),
    )
    .with_shutdown(shutdown)
    .run(IdRange::new(1, 10))
    .await;

    assert!(matches!(result, Err(CrawlError::Cancelled)));
}
