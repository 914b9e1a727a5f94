//! Shared test fixtures: scripted store and sources

#![allow(dead_code)]

use anitodo_common::{Error as StoreError, Result as StoreResult};
use anitodo_sync::store::validate_page;
use anitodo_sync::{
    Entry, HistoryItem, HistoryPage, SourceClient, SourceFailure, Store, WatchRecord, WeekdayBucket,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, RwLock};

pub const WEEKDAY: &str = "Friday";

#[derive(Default)]
struct StoreData {
    entries: Vec<Entry>,
    watched: HashSet<i64>,
    /// title → ani id at follow time
    favorites: BTreeMap<String, i64>,
    next_id: i64,
}

/// In-memory `Store` with failure injection
///
/// Mutations record `"<command>:<key>"` in `calls` on entry, then wait on
/// `gate` before doing anything else; holding `gate.write()` in a test parks
/// every mutation inside the store.
#[derive(Default)]
pub struct MockStore {
    data: Mutex<StoreData>,
    pub calls: Mutex<Vec<String>>,
    pub gate: RwLock<()>,
    pub fail_watch: AtomicBool,
    pub fail_collect: AtomicBool,
    pub fail_uncollect: AtomicBool,
    pub fail_save: AtomicBool,
    pub fail_queries: AtomicBool,
    pub saves: AtomicUsize,
    /// When set, the next `query_today_updates` waits for this signal
    pub hold_next_today: Mutex<Option<oneshot::Receiver<()>>>,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store pre-populated with `titles` as today's entries, ids 1..
    pub fn with_entries(titles: &[&str]) -> Arc<Self> {
        let store = Self::default();
        {
            let mut data = store.data.lock().unwrap();
            for title in titles {
                data.next_id += 1;
                let id = data.next_id;
                data.entries.push(Entry::new(*title, "mock").with_id(id));
            }
        }
        Arc::new(store)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.data.lock().unwrap().entries.clone()
    }

    pub fn id_of(&self, title: &str) -> Option<i64> {
        self.data
            .lock()
            .unwrap()
            .entries
            .iter()
            .find(|e| e.title == title)
            .and_then(|e| e.id)
    }

    pub fn stored_favorites(&self) -> Vec<String> {
        self.data.lock().unwrap().favorites.keys().cloned().collect()
    }

    pub fn stored_watched(&self) -> HashSet<i64> {
        self.data.lock().unwrap().watched.clone()
    }

    /// Simulate a daily refresh that issues every entry a new id
    pub fn renumber(&self) {
        let mut data = self.data.lock().unwrap();
        let mut next_id = data.next_id;
        for entry in data.entries.iter_mut() {
            next_id += 1;
            entry.id = Some(next_id);
        }
        data.next_id = next_id;
        data.watched.clear();
    }

    pub fn add_favorite(&self, title: &str) {
        self.data.lock().unwrap().favorites.insert(title.to_string(), 0);
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(flag: &AtomicBool, what: &str) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Internal(format!("injected {} failure", what)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Store for MockStore {
    async fn query_today_updates(&self) -> StoreResult<WeekdayBucket> {
        let hold = self.hold_next_today.lock().unwrap().take();
        if let Some(rx) = hold {
            let _ = rx.await;
        }
        Self::check(&self.fail_queries, "query")?;
        let mut bucket = WeekdayBucket::new();
        bucket.insert(WEEKDAY.to_string(), self.entries());
        Ok(bucket)
    }

    async fn save_entries(&self, data: &WeekdayBucket) -> StoreResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_save, "save")?;
        let mut store = self.data.lock().unwrap();
        for entry in data.values().flatten() {
            let known = store
                .entries
                .iter()
                .any(|e| e.title == entry.title && e.platform == entry.platform);
            if !known {
                store.next_id += 1;
                let id = store.next_id;
                store.entries.push(Entry {
                    id: Some(id),
                    ..entry.clone()
                });
            }
        }
        Ok(())
    }

    async fn query_watched(&self) -> StoreResult<Vec<WatchRecord>> {
        Self::check(&self.fail_queries, "query")?;
        let data = self.data.lock().unwrap();
        Ok(data
            .watched
            .iter()
            .map(|id| WatchRecord {
                ani_item_id: *id,
                watched_time: 1,
            })
            .collect())
    }

    async fn mark_watched(&self, ani_id: i64) -> StoreResult<()> {
        self.record(format!("watch:{}", ani_id));
        let _pass = self.gate.read().await;
        Self::check(&self.fail_watch, "watch")?;
        self.data.lock().unwrap().watched.insert(ani_id);
        Ok(())
    }

    async fn query_favorite_updates(&self) -> StoreResult<Vec<Entry>> {
        Self::check(&self.fail_queries, "query")?;
        let data = self.data.lock().unwrap();
        Ok(data
            .favorites
            .iter()
            .map(|(title, id)| {
                data.entries
                    .iter()
                    .rev()
                    .find(|e| &e.title == title)
                    .cloned()
                    .unwrap_or_else(|| Entry::new(title.clone(), "").with_id(*id))
            })
            .collect())
    }

    async fn collect(&self, ani_id: i64, title: &str) -> StoreResult<()> {
        self.record(format!("collect:{}", title));
        let _pass = self.gate.read().await;
        Self::check(&self.fail_collect, "collect")?;
        self.data.lock().unwrap().favorites.insert(title.to_string(), ani_id);
        Ok(())
    }

    async fn uncollect(&self, _ani_id: i64, title: &str) -> StoreResult<()> {
        self.record(format!("uncollect:{}", title));
        let _pass = self.gate.read().await;
        Self::check(&self.fail_uncollect, "uncollect")?;
        self.data.lock().unwrap().favorites.remove(title);
        Ok(())
    }

    async fn query_history(&self, page: u32, page_size: u32) -> StoreResult<HistoryPage> {
        validate_page(page, page_size)?;
        Self::check(&self.fail_queries, "query")?;
        let data = self.data.lock().unwrap();
        let items = data
            .entries
            .iter()
            .skip(((page - 1) * page_size) as usize)
            .take(page_size as usize)
            .map(|e| HistoryItem {
                entry: e.clone(),
                is_watched: e.id.map_or(false, |id| data.watched.contains(&id)),
                watched_time: None,
            })
            .collect();
        Ok(HistoryPage {
            total: data.entries.len() as u64,
            items,
            page,
            page_size,
        })
    }
}

/// Source returning a fixed bucket or a fixed failure
pub struct StaticSource {
    name: String,
    outcome: Result<WeekdayBucket, String>,
}

impl StaticSource {
    pub fn ok(name: &str, weekday: &str, titles: &[&str]) -> Arc<dyn SourceClient> {
        let mut bucket = WeekdayBucket::new();
        bucket.insert(
            weekday.to_string(),
            titles.iter().map(|t| Entry::new(*t, name)).collect(),
        );
        Arc::new(Self {
            name: name.to_string(),
            outcome: Ok(bucket),
        })
    }

    pub fn failing(name: &str) -> Arc<dyn SourceClient> {
        Arc::new(Self {
            name: name.to_string(),
            outcome: Err("connection refused".to_string()),
        })
    }
}

#[async_trait]
impl SourceClient for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<WeekdayBucket, SourceFailure> {
        self.outcome
            .clone()
            .map_err(|cause| SourceFailure::new(&self.name, cause))
    }
}
