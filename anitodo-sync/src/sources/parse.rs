//! Response body parsers, one per `ParseMode`
//!
//! Parsers are pure: they take the decoded JSON body and return a bucket or
//! a human-readable cause. Entries with blank titles are dropped and titles
//! are trimmed.

use crate::models::{Entry, ParseMode, WeekdayBucket};
use anitodo_common::time;
use serde_json::Value;

const BILIBILI_PLATFORM: &str = "bilibili";
const BILIBILI_PLAY_URL: &str = "https://www.bilibili.com/bangumi/play/ep";

/// Parse `body` according to `mode`
///
/// `source_name` fills in the platform of weekday_json entries that omit it.
pub fn parse_body(mode: ParseMode, source_name: &str, body: &Value) -> Result<WeekdayBucket, String> {
    match mode {
        ParseMode::WeekdayJson => parse_weekday_json(source_name, body),
        ParseMode::BilibiliTimeline => parse_bilibili_timeline(body, time::today_weekday_label()),
    }
}

/// `{ "<weekday>": [entry, ...] }`, already in the `Entry` shape
pub fn parse_weekday_json(source_name: &str, body: &Value) -> Result<WeekdayBucket, String> {
    let raw: WeekdayBucket =
        serde_json::from_value(body.clone()).map_err(|e| format!("malformed weekday payload: {}", e))?;

    let mut bucket = WeekdayBucket::new();
    for (weekday, entries) in raw {
        let cleaned = entries
            .into_iter()
            .filter_map(|mut entry| {
                entry.title = entry.title.trim().to_string();
                if entry.title.is_empty() {
                    return None;
                }
                if entry.platform.trim().is_empty() {
                    entry.platform = source_name.to_string();
                }
                // Ids belong to the store, never to a source
                entry.id = None;
                Some(entry)
            })
            .collect();
        bucket.insert(weekday, cleaned);
    }
    Ok(bucket)
}

/// bilibili timeline API response
///
/// Only the day flagged `is_today == 1` is used, and within it only episodes
/// with `published == 1`. A response without a today block yields an empty
/// list under `weekday` rather than an error.
pub fn parse_bilibili_timeline(body: &Value, weekday: &str) -> Result<WeekdayBucket, String> {
    let code = body.get("code").and_then(Value::as_i64).unwrap_or(-1);
    if code != 0 {
        let message = body.get("message").and_then(Value::as_str).unwrap_or("");
        return Err(format!("timeline returned code {} {}", code, message).trim_end().to_string());
    }

    let days = body
        .get("result")
        .and_then(Value::as_array)
        .ok_or_else(|| "timeline response has no result array".to_string())?;

    let mut entries = Vec::new();
    if let Some(today) = days
        .iter()
        .find(|day| day.get("is_today").and_then(Value::as_i64) == Some(1))
    {
        if let Some(episodes) = today.get("episodes").and_then(Value::as_array) {
            entries.extend(
                episodes
                    .iter()
                    .filter(|ep| ep.get("published").and_then(Value::as_i64) == Some(1))
                    .filter_map(parse_bilibili_episode),
            );
        }
    }

    let mut bucket = WeekdayBucket::new();
    bucket.insert(weekday.to_string(), entries);
    Ok(bucket)
}

fn parse_bilibili_episode(ep: &Value) -> Option<Entry> {
    let title = ep.get("title").and_then(Value::as_str).unwrap_or("").trim();
    if title.is_empty() {
        return None;
    }

    let pub_index = ep.get("pub_index").and_then(Value::as_str).unwrap_or("").trim();
    let image_url = ep
        .get("square_cover")
        .and_then(Value::as_str)
        .or_else(|| ep.get("cover").and_then(Value::as_str))
        .unwrap_or_default();
    let episode_id = ep.get("episode_id").and_then(Value::as_i64).unwrap_or_default();
    let update_timestamp = ep
        .get("pub_ts")
        .and_then(Value::as_i64)
        .map(|secs| secs.saturating_mul(1000))
        .unwrap_or_else(time::now_millis);

    Some(Entry {
        id: None,
        title: title.to_string(),
        platform: BILIBILI_PLATFORM.to_string(),
        update_label: (!pub_index.is_empty()).then(|| pub_index.to_string()),
        update_sequence: extract_number(pub_index),
        detail_url: format!("{}{}", BILIBILI_PLAY_URL, episode_id),
        image_url: image_url.to_string(),
        update_timestamp,
    })
}

/// First run of ASCII digits in `s`, e.g. "第12话" → 12
pub fn extract_number(s: &str) -> Option<u32> {
    let digits: String = s
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}
