//! Store: the persistence and query authority
//!
//! One method per command. The synchronizer and the refresh pipeline only
//! see this trait, so the SQLite implementation can be swapped for an
//! in-memory one in tests.

pub mod sqlite;

use crate::models::{Entry, HistoryPage, WatchRecord, WeekdayBucket};
use anitodo_common::{Error, Result};
use async_trait::async_trait;

pub use sqlite::SqliteStore;

/// Largest accepted history page
pub const MAX_PAGE_SIZE: u32 = 200;

#[async_trait]
pub trait Store: Send + Sync {
    /// `query_today_update_ani_list`: today's entries under today's weekday label
    async fn query_today_updates(&self) -> Result<WeekdayBucket>;

    /// `save_ani_item_data`: persist merged entries
    ///
    /// Re-saving the same episode of the same title on the same platform
    /// keeps its id.
    async fn save_entries(&self, data: &WeekdayBucket) -> Result<()>;

    /// `query_watched_ani_item_list`: watch records for today's entries
    async fn query_watched(&self) -> Result<Vec<WatchRecord>>;

    /// `watch_ani_item`
    async fn mark_watched(&self, ani_id: i64) -> Result<()>;

    /// `query_favorite_ani_update_list`: newest entry for every followed title
    async fn query_favorite_updates(&self) -> Result<Vec<Entry>>;

    /// `collect_ani_item`
    async fn collect(&self, ani_id: i64, title: &str) -> Result<()>;

    /// `cancel_collect_ani_item`; removing a title that is not followed is not an error
    async fn uncollect(&self, ani_id: i64, title: &str) -> Result<()>;

    /// `query_ani_history_list`, 1-based pages
    async fn query_history(&self, page: u32, page_size: u32) -> Result<HistoryPage>;
}

/// Reject page 0 and page sizes outside `1..=MAX_PAGE_SIZE`
pub fn validate_page(page: u32, page_size: u32) -> Result<()> {
    if page == 0 {
        return Err(Error::InvalidInput("page starts at 1".to_string()));
    }
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(Error::InvalidInput(format!(
            "page_size must be between 1 and {}, got {}",
            MAX_PAGE_SIZE, page_size
        )));
    }
    Ok(())
}
