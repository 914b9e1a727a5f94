//! Periodic background refresh

use crate::pipeline::RefreshPipeline;
use anitodo_common::config::RefreshConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// First tick for intervals too large to add to `Instant::now()`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Runs the refresh pipeline on a fixed interval until cancelled
///
/// A failed refresh is logged and the loop keeps going. Cancellation is
/// observed between refreshes; a refresh already running completes.
pub struct RefreshScheduler {
    pipeline: Arc<RefreshPipeline>,
    interval: Duration,
    run_on_startup: bool,
}

impl RefreshScheduler {
    pub fn new(pipeline: Arc<RefreshPipeline>, interval: Duration, run_on_startup: bool) -> Self {
        Self {
            pipeline,
            interval,
            run_on_startup,
        }
    }

    pub fn from_config(pipeline: Arc<RefreshPipeline>, config: &RefreshConfig) -> Self {
        Self::new(
            pipeline,
            Duration::from_secs(config.interval_minutes.saturating_mul(60)),
            config.run_on_startup,
        )
    }

    /// Loop until `cancel` fires; returns the number of refreshes attempted
    pub async fn run(&self, cancel: CancellationToken) -> u64 {
        let now = Instant::now();
        let start = if self.run_on_startup {
            now
        } else {
            now.checked_add(self.interval).unwrap_or(now + FAR_FUTURE)
        };
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.interval.as_secs(),
            run_on_startup = self.run_on_startup,
            "Refresh scheduler started"
        );

        let mut runs = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    runs += 1;
                    match self.pipeline.refresh().await {
                        Ok(result) => {
                            if !result.partial_errors.is_empty() {
                                warn!(
                                    failed = ?result.partial_errors.keys().collect::<Vec<_>>(),
                                    "Refresh completed with failed sources"
                                );
                            }
                        }
                        Err(e) => warn!(run = runs, error = %e, "Scheduled refresh failed"),
                    }
                }
            }
        }

        info!(runs, "Refresh scheduler stopped");
        runs
    }

    /// Run on a background task
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<u64> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}
