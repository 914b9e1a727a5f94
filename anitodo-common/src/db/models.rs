//! Database row models

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Row of `ani_info`
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct AniInfoRow {
    pub id: i64,
    pub title: String,
    pub platform: String,
    /// Episode number as text, `''` when the source gave none
    pub update_count: String,
    pub update_info: Option<String>,
    pub image_url: String,
    pub detail_url: String,
    /// Epoch milliseconds
    pub update_time: i64,
}

/// Row of `ani_watch_history`
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct WatchHistoryRow {
    pub ani_item_id: i64,
    pub watched_time: i64,
}

/// Row of `ani_collect`
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct CollectRow {
    pub ani_item_id: i64,
    pub ani_title: String,
    pub collect_time: i64,
}
