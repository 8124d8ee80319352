//! Ingestion metrics
//!
//! Counters and histograms for feed requests, classification outcomes and
//! store writes, recorded through the `metrics` facade. When no exporter is
//! installed every call is a no-op; [`init_metrics`] installs the Prometheus
//! scrape endpoint.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::feed::FailureKind;
use crate::store::UpsertOutcome;
use crate::ItemKind;

/// Set once the exporter is installed
static METRICS_INITIALIZED: OnceCell<SocketAddr> = OnceCell::new();

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Metrics initialization errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Exporter could not be installed
    #[error("failed to install Prometheus exporter on {addr}: {reason}")]
    InstallFailed {
        /// Requested listen address
        addr: SocketAddr,
        /// Underlying error
        reason: String,
    },
}

/// Install the Prometheus exporter and describe all metrics.
///
/// Idempotent: a second call is a no-op. Must be called from within a Tokio
/// runtime since the exporter spawns its HTTP listener there.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if let Some(existing) = METRICS_INITIALIZED.get() {
        debug!(addr = %existing, "Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::InstallFailed {
            addr,
            reason: e.to_string(),
        })?;

    describe_counter!(
        "feed_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to the item feed"
    );
    describe_histogram!(
        "feed_request_duration_seconds",
        Unit::Seconds,
        "Feed request duration in seconds"
    );
    describe_counter!(
        "items_fetched_total",
        Unit::Count,
        "Items fetched and classified, by kind"
    );
    describe_counter!(
        "fetch_retries_total",
        Unit::Count,
        "Fetch attempts that failed and were retried"
    );
    describe_counter!(
        "items_unrecognized_total",
        Unit::Count,
        "Items dropped because of an unrecognized kind"
    );
    describe_counter!(
        "items_dead_lettered_total",
        Unit::Count,
        "Items given up on, by stage"
    );
    describe_counter!(
        "items_persisted_total",
        Unit::Count,
        "Upserts applied, by outcome"
    );
    describe_counter!(
        "persist_failures_total",
        Unit::Count,
        "Upsert attempts that failed"
    );
    describe_histogram!(
        "upsert_duration_seconds",
        Unit::Seconds,
        "Upsert round-trip duration in seconds"
    );
    describe_gauge!(
        "id_queue_outstanding",
        Unit::Count,
        "Ids enqueued and not yet completed"
    );
    describe_gauge!(
        "entity_queue_outstanding",
        Unit::Count,
        "Entities handed to persistence and not yet completed"
    );

    let _ = METRICS_INITIALIZED.set(addr);
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Check if the exporter has been installed
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED.get().is_some()
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Timing and outcome of one feed request
pub struct FeedRequestMetrics {
    endpoint: &'static str,
    start_time: Instant,
    correlation_id: String,
}

impl FeedRequestMetrics {
    /// Start recording a feed request against `endpoint` (`item` or `maxitem`)
    pub fn start(endpoint: &'static str) -> Self {
        Self {
            endpoint,
            start_time: Instant::now(),
            correlation_id: generate_correlation_id(),
        }
    }

    /// Record a response with the given status
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "feed_requests_total",
            "endpoint" => self.endpoint,
            "status" => status_code.to_string(),
        )
        .increment(1);

        histogram!(
            "feed_request_duration_seconds",
            "endpoint" => self.endpoint,
        )
        .record(duration.as_secs_f64());

        if status_code == 429 {
            warn!(
                correlation_id = %self.correlation_id,
                endpoint = self.endpoint,
                duration_ms = duration.as_millis(),
                "Rate limit error (429) recorded"
            );
        }
    }

    /// Record a transport failure (no status code)
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();

        counter!(
            "feed_requests_total",
            "endpoint" => self.endpoint,
            "status" => "network_error",
        )
        .increment(1);

        histogram!(
            "feed_request_duration_seconds",
            "endpoint" => self.endpoint,
        )
        .record(duration.as_secs_f64());

        debug!(
            correlation_id = %self.correlation_id,
            endpoint = self.endpoint,
            duration_ms = duration.as_millis(),
            "Network error recorded"
        );
    }

    /// Correlation ID for this request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// An item was fetched and classified
pub fn record_item_fetched(kind: ItemKind) {
    counter!("items_fetched_total", "kind" => kind.as_str()).increment(1);
}

/// A fetch attempt failed and the id will be tried again
pub fn record_fetch_retry(failure: FailureKind) {
    counter!("fetch_retries_total", "reason" => failure.label()).increment(1);
}

/// A payload was dropped for its kind
pub fn record_unrecognized() {
    counter!("items_unrecognized_total").increment(1);
}

/// An id or entity was given up on
pub fn record_dead_letter(stage: &'static str) {
    counter!("items_dead_lettered_total", "stage" => stage).increment(1);
}

/// Outstanding work per queue
pub fn record_outstanding(ids: u64, entities: u64) {
    gauge!("id_queue_outstanding").set(ids as f64);
    gauge!("entity_queue_outstanding").set(entities as f64);
}

/// Timing of one upsert
pub struct UpsertMetrics {
    kind: ItemKind,
    start_time: Instant,
}

impl UpsertMetrics {
    /// Start timing an upsert of `kind`
    pub fn start(kind: ItemKind) -> Self {
        Self {
            kind,
            start_time: Instant::now(),
        }
    }

    /// Record an applied upsert
    pub fn record_outcome(&self, outcome: UpsertOutcome) {
        histogram!("upsert_duration_seconds").record(self.start_time.elapsed().as_secs_f64());
        counter!(
            "items_persisted_total",
            "kind" => self.kind.as_str(),
            "outcome" => outcome.as_str(),
        )
        .increment(1);
    }

    /// Record a failed upsert attempt
    pub fn record_failure(&self) {
        histogram!("upsert_duration_seconds").record(self.start_time.elapsed().as_secs_f64());
        counter!("persist_failures_total", "kind" => self.kind.as_str()).increment(1);
    }
}

/// Whole-run metrics
pub struct RunMetrics {
    start_time: Instant,
}

impl RunMetrics {
    /// Start tracking a run over `total_ids` ids
    pub fn start(total_ids: u64) -> Self {
        info!(total_ids = total_ids, "Crawl run started");
        Self {
            start_time: Instant::now(),
        }
    }

    /// Record a fully drained run
    pub fn record_success(&self, persisted: u64) {
        counter!("runs_completed_total").increment(1);
        info!(
            persisted = persisted,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Crawl run drained"
        );
    }

    /// Record a run that ended early
    pub fn record_failure(&self, error: &str) {
        counter!("runs_failed_total").increment(1);
        error!(
            error = %error,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Crawl run failed"
        );
    }
}
