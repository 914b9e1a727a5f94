//! Concurrent fan-out over all configured sources
//!
//! Every source runs in its own task and the fetcher waits for all of them
//! to settle. One source failing, timing out or panicking never affects the
//! others: it only adds an entry to the error map.

use crate::error::SourceFailure;
use crate::models::{AggregateInput, WeekdayBucket};
use crate::sources::SourceClient;
use anitodo_common::config::RefreshConfig;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-source timeout and retry settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Bound on a single attempt
    pub timeout: Duration,
    /// Extra attempts after the first failure
    pub retry_times: u8,
    /// Pause between attempts
    pub retry_delay: Duration,
}

impl FetchPolicy {
    pub fn from_config(config: &RefreshConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.source_timeout_secs),
            retry_times: config.retry_times,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        }
    }

    /// Single attempt with the given timeout
    pub fn no_retry(timeout: Duration) -> Self {
        Self {
            timeout,
            retry_times: 0,
            retry_delay: Duration::ZERO,
        }
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::from_config(&RefreshConfig::default())
    }
}

/// Runs every source client concurrently and collects all outcomes
///
/// # Example
/// ```rust,ignore
/// let fetcher = FanOutFetcher::new(clients, FetchPolicy::default());
/// let input = fetcher.fetch_all().await;
/// for (source, failure) in &input.errors {
///     eprintln!("{}: {}", source, failure.cause);
/// }
/// ```
pub struct FanOutFetcher {
    clients: Vec<Arc<dyn SourceClient>>,
    policy: FetchPolicy,
}

impl FanOutFetcher {
    pub fn new(clients: Vec<Arc<dyn SourceClient>>, policy: FetchPolicy) -> Self {
        Self { clients, policy }
    }

    /// Fetch from all sources and wait for every one to settle
    ///
    /// Successful buckets keep the configured source order so downstream
    /// merging is deterministic regardless of completion order. An empty
    /// source list yields an empty `AggregateInput`.
    pub async fn fetch_all(&self) -> AggregateInput {
        if self.clients.is_empty() {
            debug!("No sources configured, nothing to fetch");
            return AggregateInput::default();
        }

        let (names, tasks): (Vec<String>, Vec<_>) = self
            .clients
            .iter()
            .map(|client| {
                let client = Arc::clone(client);
                let policy = self.policy.clone();
                let name = client.name().to_string();
                let task = tokio::spawn(async move { fetch_with_policy(client.as_ref(), &policy).await });
                (name, task)
            })
            .unzip();

        let outcomes = join_all(tasks).await;

        let mut input = AggregateInput::default();
        for (name, outcome) in names.into_iter().zip(outcomes) {
            let result = match outcome {
                Ok(result) => result,
                Err(join_error) => Err(SourceFailure::new(
                    &name,
                    format!("fetch task aborted: {}", join_error),
                )),
            };

            match result {
                Ok(bucket) => {
                    debug!(source = %name, weekdays = bucket.len(), "Source fetched");
                    input.buckets.push(bucket);
                }
                Err(failure) => {
                    warn!(source = %name, error = %failure.cause, "Source failed (isolated)");
                    input.errors.insert(name, failure);
                }
            }
        }

        info!(
            succeeded = input.buckets.len(),
            failed = input.errors.len(),
            "Fan-out complete"
        );
        input
    }

    /// Number of configured sources
    pub fn count(&self) -> usize {
        self.clients.len()
    }
}

/// One source, with timeout per attempt and retries on failure
async fn fetch_with_policy(
    client: &dyn SourceClient,
    policy: &FetchPolicy,
) -> Result<WeekdayBucket, SourceFailure> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let failure = match tokio::time::timeout(policy.timeout, client.fetch()).await {
            Ok(Ok(bucket)) => return Ok(bucket),
            Ok(Err(failure)) => failure,
            Err(_) => SourceFailure::new(
                client.name(),
                format!("timed out after {} ms", policy.timeout.as_millis()),
            ),
        };

        if attempt > u32::from(policy.retry_times) {
            return Err(failure);
        }

        debug!(
            source = %client.name(),
            attempt,
            error = %failure.cause,
            "Source attempt failed, retrying"
        );
        tokio::time::sleep(policy.retry_delay).await;
    }
}

// ============================================================================
// Mock Sources for Testing
// ============================================================================
