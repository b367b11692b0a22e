use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::misc::utils::{current_datetime_log, current_datetime_rfc9557};

/// Numeric log levels shared by every logging channel.
pub const LEVEL_SILLY: i64 = 0;
pub const LEVEL_TRACE: i64 = 1;
pub const LEVEL_DEBUG: i64 = 2;
pub const LEVEL_INFO: i64 = 3;
pub const LEVEL_WARN: i64 = 4;
pub const LEVEL_ERROR: i64 = 5;
pub const LEVEL_FATAL: i64 = 6;

/// Upper-case label for a numeric level, as written to log files.
pub fn level_name(level: i64) -> &'static str {
    match level {
        LEVEL_FATAL => "CRITICAL",
        LEVEL_ERROR => "ERROR",
        LEVEL_WARN => "WARNING",
        LEVEL_INFO => "INFO",
        LEVEL_DEBUG => "DEBUG",
        LEVEL_TRACE => "TRACE",
        _ => "SILLY",
    }
}

/// Parses a configured level name (`DEBUG`, `INFO`, `WARNING`, ...) into its
/// numeric level. Numeric strings are accepted as-is.
pub fn level_from_name(name: &str) -> Option<i64> {
    let name = name.trim();
    if let Ok(level) = name.parse::<i64>() {
        return (LEVEL_SILLY..=LEVEL_FATAL).contains(&level).then_some(level);
    }
    match name.to_ascii_uppercase().as_str() {
        "CRITICAL" | "FATAL" => Some(LEVEL_FATAL),
        "ERROR" => Some(LEVEL_ERROR),
        "WARNING" | "WARN" => Some(LEVEL_WARN),
        "INFO" => Some(LEVEL_INFO),
        "DEBUG" => Some(LEVEL_DEBUG),
        "TRACE" => Some(LEVEL_TRACE),
        "SILLY" | "NOTSET" => Some(LEVEL_SILLY),
        _ => None,
    }
}

/// Every level at or above `min_level`, suitable for a channel level list.
pub fn levels_from(min_level: i64) -> Vec<i64> {
    (min_level.max(LEVEL_SILLY)..=LEVEL_FATAL).collect()
}

/// # Logrecord
///
/// A single diagnostic event. Structured extras travel in `tags`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Logrecord {
    /// The severity level of the log (0 silly .. 6 fatal).
    pub loglevel: i64,
    /// Details about the message content.
    pub message: Message,
    /// Information about the application generating the log.
    pub app: App,
    /// Flexible JSON value for arbitrary tags or additional metadata.
    pub tags: Value,
    /// RFC 9557 formatted timestamp string.
    pub rfc9557: String,
    /// Local timestamp used in the human readable line.
    pub local_ts: String,
}

impl Default for Logrecord {
    fn default() -> Self {
        Self {
            loglevel: 0,
            message: Message::default(),
            app: App::default(),
            tags: serde_json::json!([]),
            rfc9557: current_datetime_rfc9557(),
            local_ts: current_datetime_log(),
        }
    }
}

impl Logrecord {
    /// True when structured extras were attached.
    pub fn has_tags(&self) -> bool {
        self.tags != serde_json::json!([]) && !self.tags.is_null()
    }

    /// Formats the record as `<ts> - <app> - <LEVEL> - <message>`.
    pub fn to_line(&self) -> String {
        format!(
            "{} - {} - {} - {}",
            self.local_ts,
            self.app.name,
            level_name(self.loglevel),
            self.message.text
        )
    }
}

/// # Message
///
/// Represents the textual content of a log entry, including its language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The language of the message.
    pub lang: String,
    /// The actual text content of the message.
    pub text: String,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            text: String::new(),
            lang: "ja".to_string(),
        }
    }
}

/// # App
///
/// Contains information about the application that generated the log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    /// The process ID (PID) of the application.
    pub pid: i64,
    /// The name of the application.
    pub name: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            name: String::new(),
            pid: std::process::id() as i64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names_round_trip_through_config_spelling() {
        assert_eq!(level_from_name("warning"), Some(LEVEL_WARN));
        assert_eq!(level_from_name("CRITICAL"), Some(LEVEL_FATAL));
        assert_eq!(level_from_name("3"), Some(LEVEL_INFO));
        assert_eq!(level_from_name("9"), None);
        assert_eq!(level_from_name("verbose"), None);
        assert_eq!(level_name(LEVEL_WARN), "WARNING");
    }

    #[test]
    fn test_levels_from_includes_everything_above() {
        assert_eq!(levels_from(LEVEL_WARN), vec![4, 5, 6]);
        assert_eq!(levels_from(-3).len(), 7);
    }

    #[test]
    fn test_to_line_layout() {
        let mut record = Logrecord::default();
        record.app.name = "main_logger".to_string();
        record.loglevel = LEVEL_INFO;
        record.message.text = "done".to_string();
        assert!(record.to_line().ends_with(" - main_logger - INFO - done"));
        assert!(!record.has_tags());
    }
}
