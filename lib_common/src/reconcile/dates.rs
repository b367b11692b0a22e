//! # Date Normalizer
//!
//! The exports carry dates in several textual layouts. Every comparison in
//! the engine goes through [`DateNormalizer`], which tries the configured
//! formats in order and yields a `NaiveDate` (or blank). A value that matches
//! none of them is a [`DateParseError`]; callers decide whether that drops a
//! single comparison or excludes a record.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;

use super::store::is_blank;

/// Formats tried in order when no list is configured.
pub const DEFAULT_DATE_FORMATS: [&str; 7] = [
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d",
    "%Y-%m-%d",
];

/// Text form written back when a date field is overwritten.
pub const CANONICAL_DATE_FORMAT: &str = "%Y/%m/%d";

/// "No defined end date" marker used by the source system.
pub const DEFAULT_SENTINEL: &str = "9999-12-31";
/// Bounded far-future date the sentinel is mapped to.
pub const DEFAULT_SENTINEL_REPLACEMENT: &str = "2100-12-31";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{raw}' matches none of the accepted date formats")]
pub struct DateParseError {
    pub raw: String,
}

/// Remaps one date onto another before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentinelMapping {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl Default for SentinelMapping {
    fn default() -> Self {
        Self {
            from: NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX),
            to: NaiveDate::from_ymd_opt(2100, 12, 31).unwrap_or(NaiveDate::MAX),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateNormalizer {
    formats: Vec<String>,
    sentinel: Option<SentinelMapping>,
}

impl Default for DateNormalizer {
    fn default() -> Self {
        Self {
            formats: DEFAULT_DATE_FORMATS.iter().map(|f| f.to_string()).collect(),
            sentinel: Some(SentinelMapping::default()),
        }
    }
}

impl DateNormalizer {
    pub fn new(formats: Vec<String>, sentinel: Option<SentinelMapping>) -> Self {
        Self { formats, sentinel }
    }

    pub fn formats(&self) -> &[String] {
        &self.formats
    }

    pub fn sentinel(&self) -> Option<SentinelMapping> {
        self.sentinel
    }

    /// Parses `raw` with the first matching format. Date-only formats yield
    /// midnight. Blank input is `Ok(None)`.
    pub fn parse_datetime(&self, raw: &str) -> Result<Option<NaiveDateTime>, DateParseError> {
        if is_blank(raw) {
            return Ok(None);
        }
        let text = raw.trim();

        let parsed = self.formats.iter().find_map(|format| {
            NaiveDateTime::parse_from_str(text, format).ok().or_else(|| {
                NaiveDate::parse_from_str(text, format)
                    .ok()
                    .map(|date| date.and_time(NaiveTime::MIN))
            })
        });

        match parsed {
            Some(datetime) => Ok(Some(self.remap(datetime))),
            None => Err(DateParseError {
                raw: raw.to_string(),
            }),
        }
    }

    /// Canonical comparable form of `raw`: the calendar date, with the
    /// sentinel remapped. Blank input is `Ok(None)`.
    pub fn normalize(&self, raw: &str) -> Result<Option<NaiveDate>, DateParseError> {
        Ok(self.parse_datetime(raw)?.map(|datetime| datetime.date()))
    }

    /// Like [`normalize`](Self::normalize) but folds parse failures into blank.
    pub fn normalize_lenient(&self, raw: &str) -> Option<NaiveDate> {
        self.normalize(raw).ok().flatten()
    }

    /// Text written back into a dataset for `date`.
    pub fn canonical(&self, date: NaiveDate) -> String {
        date.format(CANONICAL_DATE_FORMAT).to_string()
    }

    fn remap(&self, datetime: NaiveDateTime) -> NaiveDateTime {
        match self.sentinel {
            Some(mapping) if datetime.date() == mapping.from => mapping.to.and_time(datetime.time()),
            _ => datetime,
        }
    }
}
