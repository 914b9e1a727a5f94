//! Refresh pipeline: fetch → merge → save → reload

use crate::error::{Error, MutationKind, Result};
use crate::fanout::FanOutFetcher;
use crate::merge;
use crate::models::{entry_count, AggregateResult};
use crate::sync::StateSynchronizer;
use anitodo_common::events::AniEvent;
use anitodo_common::time;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// One end-to-end refresh
///
/// Refreshes are single-flight: a call made while another is running waits
/// for it to finish and then runs its own.
pub struct RefreshPipeline {
    fetcher: FanOutFetcher,
    synchronizer: Arc<StateSynchronizer>,
    running: Mutex<()>,
}

impl RefreshPipeline {
    pub fn new(fetcher: FanOutFetcher, synchronizer: Arc<StateSynchronizer>) -> Self {
        Self {
            fetcher,
            synchronizer,
            running: Mutex::new(()),
        }
    }

    pub fn synchronizer(&self) -> &Arc<StateSynchronizer> {
        &self.synchronizer
    }

    /// Fetch all sources, merge, persist and reload local state
    ///
    /// Fails with `AllSourcesFailed` when every source failed (nothing is
    /// saved), `Mutation { kind: Save, .. }` when persisting fails and
    /// `Query` when the reload fails. With no sources configured the save
    /// is skipped and state is still reloaded.
    pub async fn refresh(&self) -> Result<AggregateResult> {
        let _running = self.running.lock().await;
        let outcome = self.run().await;

        let events = self.synchronizer.events();
        match &outcome {
            Ok(result) => events.emit_lossy(AniEvent::RefreshCompleted {
                entry_count: entry_count(&result.merged),
                failed_sources: result.partial_errors.keys().cloned().collect(),
                timestamp: time::now(),
            }),
            Err(e) => {
                warn!(error = %e, "Refresh failed");
                events.emit_lossy(AniEvent::RefreshFailed {
                    cause: e.to_string(),
                    timestamp: time::now(),
                });
            }
        }
        outcome
    }

    async fn run(&self) -> Result<AggregateResult> {
        let input = self.fetcher.fetch_all().await;
        if input.all_failed() {
            return Err(Error::AllSourcesFailed {
                errors: input.errors,
            });
        }

        let merged = merge::merge(&input.buckets);

        if !input.buckets.is_empty() {
            self.synchronizer
                .store()
                .save_entries(&merged)
                .await
                .map_err(|e| Error::Mutation {
                    kind: MutationKind::Save,
                    key: format!("{} entries", entry_count(&merged)),
                    cause: e.to_string(),
                })?;
        }

        self.synchronizer.reload().await?;

        info!(
            entries = entry_count(&merged),
            failed_sources = input.errors.len(),
            "Refresh complete"
        );
        Ok(AggregateResult {
            merged,
            partial_errors: input.errors,
        })
    }
}
