//! Merging per-source weekday buckets into one canonical view
//!
//! Platforms report the same release under slightly different titles (with
//! or without a season marker or subtitle). Two entries are the same release
//! when either title contains the other; the longer title is kept as the
//! more complete one. Short titles can false-positive against unrelated long
//! ones (a one-character title matches almost anything) and this is accepted.

use crate::models::{Entry, WeekdayBucket};
use tracing::trace;

/// Substring containment in either direction
pub fn is_similar_title(a: &str, b: &str) -> bool {
    a.contains(b) || b.contains(a)
}

fn title_len(title: &str) -> usize {
    title.chars().count()
}

/// Deduplicate one weekday's entries, left to right
///
/// Each incoming entry replaces the first similar entry already kept if its
/// title is strictly longer, and is dropped otherwise. Ties keep the entry
/// seen first. Order of first appearance is preserved.
pub fn dedup_entries(entries: impl IntoIterator<Item = Entry>) -> Vec<Entry> {
    let mut result: Vec<Entry> = Vec::new();

    for item in entries {
        match result
            .iter_mut()
            .find(|existing| is_similar_title(&existing.title, &item.title))
        {
            Some(existing) => {
                if title_len(&item.title) > title_len(&existing.title) {
                    trace!(kept = %item.title, dropped = %existing.title, "Replacing shorter duplicate");
                    *existing = item;
                } else {
                    trace!(kept = %existing.title, dropped = %item.title, "Dropping duplicate");
                }
            }
            None => result.push(item),
        }
    }

    result
}

/// Merge buckets from all successful sources
///
/// For each weekday present in any input, the entries of every bucket that
/// declares it are concatenated in input order and deduplicated. Input order
/// decides ties, so callers must pass buckets in a fixed (configured) order.
pub fn merge(buckets: &[WeekdayBucket]) -> WeekdayBucket {
    let mut combined = WeekdayBucket::new();
    for bucket in buckets {
        for (weekday, entries) in bucket {
            combined
                .entry(weekday.clone())
                .or_default()
                .extend(entries.iter().cloned());
        }
    }

    combined
        .into_iter()
        .map(|(weekday, entries)| (weekday, dedup_entries(entries)))
        .collect()
}
