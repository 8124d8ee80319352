//! Hacker News HTTP client
//!
//! Thin JSON-over-HTTP client for the public Firebase API. It issues exactly
//! one request per call; retrying is the pipeline's job.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::feed::{FeedError, FeedResult, ItemSource, RawItem};
use crate::metrics::FeedRequestMetrics;
use crate::ItemId;

/// HTTP connect timeout (seconds)
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP request timeout (seconds)
const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;
/// How long idle keep-alive connections are kept around
const HTTP_POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// Client for `https://hacker-news.firebaseio.com/v0`
#[derive(Debug, Clone)]
pub struct HackerNewsClient {
    client: Client,
    base_url: String,
}

impl HackerNewsClient {
    /// Public feed endpoint
    pub const DEFAULT_BASE_URL: &'static str = "https://hacker-news.firebaseio.com/v0";

    /// Create a client for the public feed.
    ///
    /// `max_idle_per_host` should match the number of fetch workers so every
    /// worker can keep a warm connection.
    pub fn new(max_idle_per_host: usize) -> FeedResult<Self> {
        Self::with_base_url(Self::DEFAULT_BASE_URL, max_idle_per_host)
    }

    /// Create a client for a feed mirror or test server
    pub fn with_base_url(
        base_url: impl Into<String>,
        max_idle_per_host: usize,
    ) -> FeedResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .pool_max_idle_per_host(max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(HTTP_POOL_IDLE_TIMEOUT_SECS))
            .build()
            .map_err(|e| FeedError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// URL of one item document
    pub fn item_url(&self, id: ItemId) -> String {
        format!("{}/item/{id}.json", self.base_url)
    }

    /// URL of the maximum id document
    pub fn max_item_url(&self) -> String {
        format!("{}/maxitem.json", self.base_url)
    }

    async fn get_json<T>(&self, url: &str, endpoint: &'static str) -> FeedResult<T>
    where
        T: DeserializeOwned,
    {
        let metrics = FeedRequestMetrics::start(endpoint);

        let response = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                metrics.record_network_error();
                return Err(network_error(e));
            }
        };

        let status = response.status();
        metrics.record_complete(status.as_u16());

        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("unexpected status");
            return Err(FeedError::HttpError(format!(
                "status {}: {reason}",
                status.as_u16()
            )));
        }

        let body = response.text().await.map_err(network_error)?;

        debug!(
            correlation_id = %metrics.correlation_id(),
            url = %url,
            bytes = body.len(),
            "Feed response received"
        );

        serde_json::from_str(&body)
            .map_err(|e| FeedError::ParseError(format!("Failed to decode {endpoint}: {e}")))
    }
}

/// Map a transport failure, keeping the category in the message prefix.
fn network_error(e: reqwest::Error) -> FeedError {
    if e.is_timeout() {
        FeedError::NetworkError(format!("timeout: {e}"))
    } else if e.is_connect() {
        FeedError::NetworkError(format!("connect: {e}"))
    } else if e.is_decode() {
        FeedError::ParseError(e.to_string())
    } else {
        FeedError::NetworkError(e.to_string())
    }
}

#[async_trait]
impl ItemSource for HackerNewsClient {
    async fn max_item_id(&self) -> FeedResult<ItemId> {
        self.get_json::<ItemId>(&self.max_item_url(), "maxitem")
            .await
    }

    async fn fetch_item(&self, id: ItemId) -> FeedResult<RawItem> {
        self.get_json::<Option<RawItem>>(&self.item_url(id), "item")
            .await?
            .ok_or(FeedError::Missing(id))
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
