use chrono::{DateTime, Local, NaiveDate, Utc};
use std::path::Path;

/// Format used for backup file suffixes (`<stem>_<YYYYMMDDHHMMSS>.csv`).
pub const COMPACT_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Returns the current UTC time as an RFC 9557 string with millisecond precision.
pub fn current_datetime_rfc9557() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Returns the current local time formatted for log lines (`2024-05-24 10:54:55,123`).
pub fn current_datetime_log() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S,%3f").to_string()
}

/// Local calendar date of "yesterday" relative to `today`.
pub fn yesterday_of(today: NaiveDate) -> NaiveDate {
    today.pred_opt().unwrap_or(today)
}

/// Base name of the running executable without its extension, or `"app"` when
/// it cannot be determined.
pub fn process_basename() -> String {
    std::env::current_exe()
        .ok()
        .as_deref()
        .and_then(Path::file_stem)
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| "app".to_string())
}
