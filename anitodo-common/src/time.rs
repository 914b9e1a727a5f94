//! Timestamp and weekday utilities
//!
//! All persisted timestamps are epoch milliseconds. "Today" is the local
//! calendar day.

use chrono::{DateTime, Datelike, Local, LocalResult, NaiveTime, TimeZone, Timelike, Utc, Weekday};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current time as epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Epoch milliseconds of the most recent local midnight
pub fn start_of_today_millis() -> i64 {
    start_of_day_millis(Local::now())
}

/// Epoch milliseconds of local midnight on the day of `at`
///
/// Falls back to the earliest valid instant when midnight does not exist
/// locally (DST gap).
pub fn start_of_day_millis(at: DateTime<Local>) -> i64 {
    let midnight = at.date_naive().and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&midnight) {
        LocalResult::Single(dt) => dt.timestamp_millis(),
        LocalResult::Ambiguous(earliest, _) => earliest.timestamp_millis(),
        LocalResult::None => at.timestamp_millis() - i64::from(at.num_seconds_from_midnight()) * 1000,
    }
}

/// Label used as the weekday bucket key
pub fn weekday_label(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Weekday label of the local current day
pub fn today_weekday_label() -> &'static str {
    weekday_label(Local::now().weekday())
}
