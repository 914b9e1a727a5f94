//! Optimistic state synchronizer
//!
//! Owns the watched-id and followed-title sets mirrored from the store.
//! Toggles apply to the local sets first, then write to the store and roll
//! back if the write fails. Writes are serialized per entity key (ani id for
//! watched, title for favorites); different keys proceed concurrently.
//!
//! Reloads replace the sets wholesale. A reload may overlap an in-flight
//! toggle and observe the store before that toggle's write; the sets are
//! eventually consistent with the store, not linearizable.

pub mod key_lock;

use crate::error::{Error, MutationKind, Result};
use crate::models::{Entry, HistoryPage, WeekdayBucket};
use crate::store::Store;
use anitodo_common::events::{AniEvent, EventBus};
use anitodo_common::time;
use key_lock::KeyedLocks;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub use key_lock::KeyGuard;

#[derive(Debug, Default)]
struct SyncState {
    watched: HashSet<i64>,
    favorite: HashSet<String>,
    /// ani id → title, from the last reload and from toggles
    titles: HashMap<i64, String>,
    today: WeekdayBucket,
    loaded: bool,
    /// Generation of the reload whose result is currently applied
    generation: u64,
}

/// Client-side mirror of watched/favorite state
///
/// Construct one per process and share it behind an `Arc`.
pub struct StateSynchronizer {
    store: Arc<dyn Store>,
    state: RwLock<SyncState>,
    watch_locks: KeyedLocks<i64>,
    favorite_locks: KeyedLocks<String>,
    reload_requests: AtomicU64,
    events: EventBus,
}

fn query_error(query: &'static str, cause: anitodo_common::Error) -> Error {
    Error::Query {
        query,
        cause: cause.to_string(),
    }
}

impl StateSynchronizer {
    pub fn new(store: Arc<dyn Store>, events: EventBus) -> Self {
        Self {
            store,
            state: RwLock::new(SyncState::default()),
            watch_locks: KeyedLocks::new(),
            favorite_locks: KeyedLocks::new(),
            reload_requests: AtomicU64::new(0),
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Replace local state with the store's view
    ///
    /// Returns `Ok(false)` when a newer reload was applied first and this
    /// result was discarded. On failure local state is left untouched.
    pub async fn reload(&self) -> Result<bool> {
        let generation = self.reload_requests.fetch_add(1, Ordering::SeqCst) + 1;

        let (today, watched, favorites) = tokio::try_join!(
            async {
                self.store
                    .query_today_updates()
                    .await
                    .map_err(|e| query_error("query_today_update_ani_list", e))
            },
            async {
                self.store
                    .query_watched()
                    .await
                    .map_err(|e| query_error("query_watched_ani_item_list", e))
            },
            async {
                self.store
                    .query_favorite_updates()
                    .await
                    .map_err(|e| query_error("query_favorite_ani_update_list", e))
            },
        )
        .map_err(|e| {
            warn!(generation, error = %e, "Reload failed, keeping previous state");
            e
        })?;

        let mut state = self.state.write().await;
        if state.generation > generation {
            debug!(
                generation,
                applied = state.generation,
                "Discarding stale reload"
            );
            return Ok(false);
        }

        let mut titles: HashMap<i64, String> = HashMap::new();
        for entry in today.values().flatten().chain(favorites.iter()) {
            if let Some(id) = entry.id {
                titles.insert(id, entry.title.clone());
            }
        }

        state.watched = watched.into_iter().map(|r| r.ani_item_id).collect();
        state.favorite = favorites.into_iter().map(|e| e.title).collect();
        state.titles = titles;
        state.today = today;
        state.loaded = true;
        state.generation = generation;

        let today_count: usize = state.today.values().map(Vec::len).sum();
        info!(
            watched = state.watched.len(),
            favorite = state.favorite.len(),
            today = today_count,
            "State reloaded"
        );
        self.events.emit_lossy(AniEvent::StateReloaded {
            watched_count: state.watched.len(),
            favorite_count: state.favorite.len(),
            today_count,
            timestamp: time::now(),
        });
        Ok(true)
    }

    /// Mark `ani_id` watched
    ///
    /// The id is added locally before the store call and removed again if
    /// the call fails. If the entry's title is followed, or a follow/unfollow
    /// of it is in flight, it is unfollowed after the watch is confirmed;
    /// that is a second, independent write and its failure is reported while
    /// the watch stays recorded.
    pub async fn toggle_watched(&self, ani_id: i64) -> Result<()> {
        let _guard = self.watch_locks.lock(ani_id).await;

        let was_watched = {
            let mut state = self.state.write().await;
            !state.watched.insert(ani_id)
        };
        self.events.emit_lossy(AniEvent::WatchedChanged {
            ani_id,
            watched: true,
            confirmed: false,
            timestamp: time::now(),
        });

        if let Err(e) = self.store.mark_watched(ani_id).await {
            if !was_watched {
                self.state.write().await.watched.remove(&ani_id);
            }
            let key = ani_id.to_string();
            warn!(ani_id, error = %e, "Watch failed, rolled back");
            self.events.emit_lossy(AniEvent::MutationRolledBack {
                key: format!("watch:{}", key),
                cause: e.to_string(),
                timestamp: time::now(),
            });
            return Err(Error::Mutation {
                kind: MutationKind::Watch,
                key,
                cause: e.to_string(),
            });
        }

        let followed_title = {
            let mut state = self.state.write().await;
            // A reload may have replaced the set while the write was in flight
            state.watched.insert(ani_id);
            // A follow still in flight counts: a reload may have dropped its
            // optimistic entry, and the unfollow below queues behind it.
            let title = state
                .titles
                .get(&ani_id)
                .filter(|title| {
                    state.favorite.contains(*title) || self.favorite_locks.in_flight(*title)
                })
                .cloned();
            title
        };
        debug!(ani_id, "Watch confirmed");
        self.events.emit_lossy(AniEvent::WatchedChanged {
            ani_id,
            watched: true,
            confirmed: true,
            timestamp: time::now(),
        });

        if let Some(title) = followed_title {
            debug!(ani_id, title = %title, "Watched entry was followed, unfollowing");
            self.set_favorite(ani_id, &title, false).await?;
        }
        Ok(())
    }

    /// Flip whether `title` is followed; returns the new membership
    ///
    /// Favorites are keyed by title so they survive the entry's id changing
    /// between refreshes.
    pub async fn toggle_favorite(&self, ani_id: i64, title: &str) -> Result<bool> {
        let title = title.trim();
        let _guard = self.favorite_locks.lock(title.to_string()).await;

        let follow = !self.state.read().await.favorite.contains(title);
        self.write_favorite(ani_id, title, follow).await?;
        Ok(follow)
    }

    /// Follow or unfollow `title` unless it is already in that state
    async fn set_favorite(&self, ani_id: i64, title: &str, follow: bool) -> Result<()> {
        let _guard = self.favorite_locks.lock(title.to_string()).await;

        if self.state.read().await.favorite.contains(title) == follow {
            return Ok(());
        }
        self.write_favorite(ani_id, title, follow).await
    }

    /// Optimistic apply + store write + rollback; caller holds the title's lock
    async fn write_favorite(&self, ani_id: i64, title: &str, follow: bool) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if follow {
                state.favorite.insert(title.to_string());
            } else {
                state.favorite.remove(title);
            }
            state.titles.insert(ani_id, title.to_string());
        }
        self.emit_favorite(ani_id, title, follow, false);

        let (kind, outcome) = if follow {
            (MutationKind::Collect, self.store.collect(ani_id, title).await)
        } else {
            (MutationKind::Uncollect, self.store.uncollect(ani_id, title).await)
        };

        match outcome {
            Ok(()) => {
                {
                    let mut state = self.state.write().await;
                    if follow {
                        state.favorite.insert(title.to_string());
                    } else {
                        state.favorite.remove(title);
                    }
                }
                debug!(ani_id, title, follow, "Favorite change confirmed");
                self.emit_favorite(ani_id, title, follow, true);
                Ok(())
            }
            Err(e) => {
                {
                    let mut state = self.state.write().await;
                    if follow {
                        state.favorite.remove(title);
                    } else {
                        state.favorite.insert(title.to_string());
                    }
                }
                warn!(ani_id, title, error = %e, "{} failed, rolled back", kind);
                self.events.emit_lossy(AniEvent::MutationRolledBack {
                    key: format!("{}:{}", kind, title),
                    cause: e.to_string(),
                    timestamp: time::now(),
                });
                Err(Error::Mutation {
                    kind,
                    key: title.to_string(),
                    cause: e.to_string(),
                })
            }
        }
    }

    fn emit_favorite(&self, ani_id: i64, title: &str, favorite: bool, confirmed: bool) {
        self.events.emit_lossy(AniEvent::FavoriteChanged {
            ani_id,
            title: title.to_string(),
            favorite,
            confirmed,
            timestamp: time::now(),
        });
    }

    /// Paginated history, straight from the store
    pub async fn history(&self, page: u32, page_size: u32) -> Result<HistoryPage> {
        self.store
            .query_history(page, page_size)
            .await
            .map_err(|e| query_error("query_ani_history_list", e))
    }

    // ========================================================================
    // Read-only views
    // ========================================================================

    /// False until the first successful reload
    pub async fn is_loaded(&self) -> bool {
        self.state.read().await.loaded
    }

    pub async fn is_watched(&self, ani_id: i64) -> bool {
        self.state.read().await.watched.contains(&ani_id)
    }

    pub async fn is_favorite(&self, title: &str) -> bool {
        self.state.read().await.favorite.contains(title.trim())
    }

    pub async fn watched_snapshot(&self) -> HashSet<i64> {
        self.state.read().await.watched.clone()
    }

    pub async fn favorite_snapshot(&self) -> HashSet<String> {
        self.state.read().await.favorite.clone()
    }

    /// Today's entries as of the last reload
    pub async fn today(&self) -> WeekdayBucket {
        self.state.read().await.today.clone()
    }

    /// Today's entries not yet watched
    pub async fn pending_today(&self) -> WeekdayBucket {
        let state = self.state.read().await;
        state
            .today
            .iter()
            .map(|(weekday, entries)| {
                let pending = entries
                    .iter()
                    .filter(|e| e.id.map_or(true, |id| !state.watched.contains(&id)))
                    .cloned()
                    .collect();
                (weekday.clone(), pending)
            })
            .collect()
    }

    /// Today's entries whose title is followed
    pub async fn favorite_today(&self) -> Vec<Entry> {
        let state = self.state.read().await;
        state
            .today
            .values()
            .flatten()
            .filter(|e| state.favorite.contains(&e.title))
            .cloned()
            .collect()
    }

    /// True while a watch write for `ani_id` is in flight
    pub fn watch_in_flight(&self, ani_id: i64) -> bool {
        self.watch_locks.in_flight(&ani_id)
    }

    /// True while a follow/unfollow write for `title` is in flight
    pub fn favorite_in_flight(&self, title: &str) -> bool {
        self.favorite_locks.in_flight(&title.trim().to_string())
    }
}
