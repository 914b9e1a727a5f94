//! Event types and the event bus
//!
//! The presentation layer subscribes to the bus and re-renders from read-only
//! snapshots when something changes. Events carry identifiers and counts, not
//! the data itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// anitodo event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AniEvent {
    /// Watched/favorite sets were replaced from the store
    StateReloaded {
        watched_count: usize,
        favorite_count: usize,
        today_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// An entry was marked watched (optimistically or confirmed)
    WatchedChanged {
        ani_id: i64,
        watched: bool,
        confirmed: bool,
        timestamp: DateTime<Utc>,
    },

    /// A title was followed or unfollowed
    FavoriteChanged {
        ani_id: i64,
        title: String,
        favorite: bool,
        confirmed: bool,
        timestamp: DateTime<Utc>,
    },

    /// A store write failed and the optimistic change was undone
    ///
    /// Meant for a transient, retryable notification.
    MutationRolledBack {
        key: String,
        cause: String,
        timestamp: DateTime<Utc>,
    },

    /// A refresh fetched, merged and persisted at least one source
    RefreshCompleted {
        entry_count: usize,
        failed_sources: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A refresh produced nothing to persist or could not persist it
    RefreshFailed {
        cause: String,
        timestamp: DateTime<Utc>,
    },
}

/// Central event distribution bus
///
/// Uses `tokio::broadcast` internally: publishing never blocks, slow
/// subscribers observe `Lagged` instead of stalling producers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AniEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<AniEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: AniEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
