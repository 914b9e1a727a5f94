//! Source clients
//!
//! A `SourceClient` performs one fetch against one configured source and
//! returns a weekday bucket or a `SourceFailure`. It never panics or returns
//! any other error type; network errors, non-2xx statuses and malformed
//! payloads all become a failure carrying a readable cause.

pub mod parse;

use crate::error::SourceFailure;
use crate::models::{SourceConfig, WeekdayBucket};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("anitodo/", env!("CARGO_PKG_VERSION"));

/// bilibili rejects timeline requests without a site referer
const REFERER: &str = "https://www.bilibili.com/";

/// One fetch against one external source
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Configured source name, used as the key in error maps
    fn name(&self) -> &str;

    /// Fetch and normalize the source's current updates
    async fn fetch(&self) -> Result<WeekdayBucket, SourceFailure>;
}

/// Build the HTTP client shared by every `HttpSourceClient`
///
/// `timeout` bounds one whole request; the fan-out applies its own
/// per-attempt timeout on top.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
}

/// `SourceClient` over HTTP GET + JSON
pub struct HttpSourceClient {
    config: SourceConfig,
    http_client: reqwest::Client,
}

impl HttpSourceClient {
    pub fn new(config: SourceConfig, http_client: reqwest::Client) -> Self {
        Self { config, http_client }
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn failure(&self, cause: impl Into<String>) -> SourceFailure {
        SourceFailure::new(&self.config.name, cause)
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn fetch(&self) -> Result<WeekdayBucket, SourceFailure> {
        debug!(source = %self.config.name, endpoint = %self.config.endpoint, "Fetching source");

        let response = self
            .http_client
            .get(&self.config.endpoint)
            .header(reqwest::header::REFERER, REFERER)
            .send()
            .await
            .map_err(|e| self.failure(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.failure(format!("HTTP {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| self.failure(format!("invalid JSON body: {}", e)))?;

        parse::parse_body(self.config.parse_mode, &self.config.name, &body)
            .map_err(|cause| self.failure(cause))
    }
}

/// Build one HTTP client per configured source, sharing a connection pool
pub fn http_clients(
    configs: &[SourceConfig],
    timeout: Duration,
) -> Result<Vec<Arc<dyn SourceClient>>, reqwest::Error> {
    let http_client = build_http_client(timeout)?;
    Ok(configs
        .iter()
        .cloned()
        .map(|config| {
            Arc::new(HttpSourceClient::new(config, http_client.clone())) as Arc<dyn SourceClient>
        })
        .collect())
}
