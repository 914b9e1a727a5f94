//! Core data model
//!
//! `Entry` is one release item as produced by a source and persisted by the
//! store. Buckets group entries by a weekday label chosen by the source.

use crate::error::SourceFailure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use anitodo_common::config::{ParseMode, SourceConfig};

/// One release item from one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Store-issued identity, `None` until persisted
    #[serde(default)]
    pub id: Option<i64>,
    pub title: String,
    pub platform: String,
    /// Free-text status such as "episode 12"
    #[serde(default)]
    pub update_label: Option<String>,
    /// Episode/chapter number, display only
    #[serde(default)]
    pub update_sequence: Option<u32>,
    #[serde(default)]
    pub detail_url: String,
    #[serde(default)]
    pub image_url: String,
    /// Epoch milliseconds reported by the source
    #[serde(default)]
    pub update_timestamp: i64,
}

impl Entry {
    /// Unpersisted entry with empty links and no episode information
    pub fn new(title: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            platform: platform.into(),
            update_label: None,
            update_sequence: None,
            detail_url: String::new(),
            image_url: String::new(),
            update_timestamp: 0,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.update_sequence = Some(sequence);
        self
    }

    pub fn with_timestamp(mut self, update_timestamp: i64) -> Self {
        self.update_timestamp = update_timestamp;
        self
    }
}

/// Weekday label → entries
///
/// Keys are source-defined free-form strings. A `BTreeMap` keeps iteration
/// deterministic so merge output does not depend on hashing.
pub type WeekdayBucket = BTreeMap<String, Vec<Entry>>;

/// Total number of entries across all weekdays
pub fn entry_count(bucket: &WeekdayBucket) -> usize {
    bucket.values().map(Vec::len).sum()
}

/// Output of one fan-out: successful buckets in source order plus failures by source name
#[derive(Debug, Clone, Default)]
pub struct AggregateInput {
    pub buckets: Vec<WeekdayBucket>,
    pub errors: BTreeMap<String, SourceFailure>,
}

impl AggregateInput {
    /// True when nothing succeeded and at least one source failed
    pub fn all_failed(&self) -> bool {
        self.buckets.is_empty() && !self.errors.is_empty()
    }
}

/// Merged view of one refresh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateResult {
    pub merged: WeekdayBucket,
    /// Empty unless at least one source failed
    pub partial_errors: BTreeMap<String, SourceFailure>,
}

/// Row of `query_watched_ani_item_list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchRecord {
    pub ani_item_id: i64,
    pub watched_time: i64,
}

/// One row of the paginated history view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub entry: Entry,
    pub is_watched: bool,
    /// Epoch milliseconds, present when watched
    pub watched_time: Option<i64>,
}

/// Result of `query_ani_history_list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub total: u64,
    pub items: Vec<HistoryItem>,
    pub page: u32,
    pub page_size: u32,
}
