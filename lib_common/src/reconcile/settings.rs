//! Typed views of the settings file.
//!
//! [`RuntimeConfig`] holds the raw `section:key` strings; the structs here
//! validate and bind them once at start-up so the engine never sees text
//! configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;
use encoding_rs::Encoding;

use super::backup::DEFAULT_RETENTION_DAYS;
use super::dates::{
    DateNormalizer, SentinelMapping, DEFAULT_DATE_FORMATS, DEFAULT_SENTINEL,
    DEFAULT_SENTINEL_REPLACEMENT,
};
use super::errors::ReconcileError;
use super::merge::MergeOptions;
use super::schema::Schema;
use super::sequence::SequenceOrder;
use super::store::DuplicatePolicy;
use super::tabular::{resolve_encoding, DEFAULT_ENCODING};
use crate::configs::config_sys::{RuntimeConfig, RuntimeConfigError};
use crate::loggers::loggerlocal::{
    LoggerLocal, LoggerLocalOptions, DEFAULT_BACKUP_COUNT, DEFAULT_MAX_BYTES,
};
use crate::loggers::logrecord::{level_from_name, levels_from, LEVEL_INFO};
use crate::utils::misc::utils::yesterday_of;

/// Block-list file used when `exclude_file` is not configured.
pub const DEFAULT_EXCLUDE_FILE: &str = "exclude_words.txt";

/// Layout of a fixed `target_date`.
const TARGET_DATE_FORMAT: &str = "%Y-%m-%d";

/// Update cutoff: a fixed date or the day before the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetDate {
    Yesterday,
    Fixed(NaiveDate),
}

impl TargetDate {
    pub fn resolve(self, today: NaiveDate) -> NaiveDate {
        match self {
            Self::Yesterday => yesterday_of(today),
            Self::Fixed(date) => date,
        }
    }
}

impl FromStr for TargetDate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.eq_ignore_ascii_case("yesterday") {
            return Ok(Self::Yesterday);
        }
        NaiveDate::parse_from_str(text, TARGET_DATE_FORMAT)
            .map(Self::Fixed)
            .map_err(|_| format!("expected 'yesterday' or YYYY-MM-DD, got '{}'", text))
    }
}

impl fmt::Display for TargetDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yesterday => write!(f, "yesterday"),
            Self::Fixed(date) => write!(f, "{}", date.format(TARGET_DATE_FORMAT)),
        }
    }
}

/// Everything the engine stages need besides their inputs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineSettings {
    pub schema: Schema,
    pub dates: DateNormalizer,
    pub merge: MergeOptions,
    pub sequence_order: SequenceOrder,
    pub duplicate_policy: DuplicatePolicy,
}

impl EngineSettings {
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, ReconcileError> {
        let duplicate_policy = config.parse_or("default:duplicate_ids", DuplicatePolicy::default())?;
        let fill_blank_baseline = config.parse_or("default:fill_blank_baseline", false)?;
        let sequence_order = match config.get("default:sequence_order_column") {
            Some(column) => SequenceOrder::ByColumn(column.to_string()),
            None => SequenceOrder::ExtractRow,
        };

        Ok(Self {
            schema: Schema::from_config(config),
            dates: date_normalizer(config)?,
            merge: MergeOptions {
                fill_blank_baseline,
            },
            sequence_order,
            duplicate_policy,
        })
    }
}

fn date_normalizer(config: &RuntimeConfig) -> Result<DateNormalizer, ReconcileError> {
    let formats = config
        .list("dates:formats")
        .filter(|formats| !formats.is_empty())
        .unwrap_or_else(|| DEFAULT_DATE_FORMATS.iter().map(|f| f.to_string()).collect());

    let sentinel_raw = config.get_or("dates:sentinel", DEFAULT_SENTINEL);
    if sentinel_raw.eq_ignore_ascii_case("none") {
        return Ok(DateNormalizer::new(formats, None));
    }
    let parse = |key: &str, raw: &str| {
        NaiveDate::parse_from_str(raw, TARGET_DATE_FORMAT)
            .map_err(|e| ReconcileError::invalid_setting(key, raw, e.to_string()))
    };
    let sentinel = SentinelMapping {
        from: parse("dates:sentinel", sentinel_raw)?,
        to: parse(
            "dates:sentinel_replacement",
            config.get_or("dates:sentinel_replacement", DEFAULT_SENTINEL_REPLACEMENT),
        )?,
    };
    Ok(DateNormalizer::new(formats, Some(sentinel)))
}

/// Settings of one reconciliation run.
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub new_file: PathBuf,
    pub old_file: PathBuf,
    pub output_file: PathBuf,
    pub exclude_file: PathBuf,
    pub target_date: TargetDate,
    pub backup_dir: PathBuf,
    pub retention_days: i64,
    pub encoding: &'static Encoding,
    pub engine: EngineSettings,
}

impl ReconcileSettings {
    /// Binds and validates the `[DEFAULT]`, `[dates]` and `[columns]` keys.
    /// Dataset file names are joined onto `file_path`.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, ReconcileError> {
        let base = PathBuf::from(config.require("default:file_path")?);

        let target_raw = config.require("default:target_date")?;
        let target_date = target_raw
            .parse::<TargetDate>()
            .map_err(|reason| ReconcileError::invalid_setting("default:target_date", target_raw, reason))?;

        let retention_days: i64 = config.parse_or("default:backup_retention_days", DEFAULT_RETENTION_DAYS)?;
        if retention_days < 0 {
            return Err(ReconcileError::invalid_setting(
                "default:backup_retention_days",
                &retention_days.to_string(),
                "must not be negative",
            ));
        }

        Ok(Self {
            new_file: base.join(config.require("default:new_file")?),
            old_file: base.join(config.require("default:old_file")?),
            output_file: base.join(config.require("default:output_file")?),
            exclude_file: PathBuf::from(config.get_or("default:exclude_file", DEFAULT_EXCLUDE_FILE)),
            target_date,
            backup_dir: PathBuf::from(config.require("default:bkup_path")?),
            retention_days,
            encoding: resolve_encoding(config.get_or("default:encoding", DEFAULT_ENCODING))?,
            engine: EngineSettings::from_config(config)?,
        })
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: i64,
    pub logfile: Option<PathBuf>,
    pub max_bytes: u64,
    pub backup_count: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: LEVEL_INFO,
            logfile: None,
            max_bytes: DEFAULT_MAX_BYTES,
            backup_count: DEFAULT_BACKUP_COUNT,
        }
    }
}

impl LogSettings {
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, RuntimeConfigError> {
        let level = match config.get("logging:level") {
            None => LEVEL_INFO,
            Some(name) => level_from_name(name).ok_or_else(|| RuntimeConfigError::InvalidValue {
                key: "logging:level".to_string(),
                value: name.to_string(),
                reason: "unknown level name".to_string(),
            })?,
        };

        Ok(Self {
            level,
            logfile: config.get("logging:logfile").map(PathBuf::from),
            max_bytes: config.parse_or("logging:max_bytes", DEFAULT_MAX_BYTES)?,
            backup_count: config.parse_or("logging:backup_count", DEFAULT_BACKUP_COUNT)?,
        })
    }

    pub fn options(&self) -> LoggerLocalOptions {
        let levels = levels_from(self.level);
        LoggerLocalOptions {
            use_tty: Some(levels.clone()),
            use_file: self.logfile.as_ref().map(|_| levels),
            use_memory: None,
            log_file: self.logfile.clone(),
            max_bytes: self.max_bytes,
            backup_count: self.backup_count,
        }
    }

    pub fn build_logger(&self, app_name: &str) -> LoggerLocal {
        LoggerLocal::new(app_name.to_string(), Some(self.options()))
    }
}

/// `[other]` section used by the application counter.
#[derive(Debug, Clone)]
pub struct CountSettings {
    pub input_file: PathBuf,
    pub count_file: PathBuf,
    pub output_file: PathBuf,
    pub encoding: &'static Encoding,
    pub dates: DateNormalizer,
}

impl CountSettings {
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, ReconcileError> {
        Ok(Self {
            input_file: PathBuf::from(config.require("other:input_file_path")?),
            count_file: PathBuf::from(config.require("other:count_file_path")?),
            output_file: PathBuf::from(config.require("other:output_file_path")?),
            encoding: resolve_encoding(config.get_or("other:encoding", DEFAULT_ENCODING))?,
            dates: date_normalizer(config)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loggers::logrecord::LEVEL_DEBUG;

    fn base_pairs() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DEFAULT:file_path", "/data"),
            ("DEFAULT:new_file", "new.csv"),
            ("DEFAULT:old_file", "old.csv"),
            ("DEFAULT:output_file", "merged.csv"),
            ("DEFAULT:target_date", "2024-05-01"),
            ("DEFAULT:bkup_path", "/data/bkup"),
        ]
    }

    fn config_with(extra: &[(&'static str, &'static str)]) -> RuntimeConfig {
        let mut pairs = base_pairs();
        pairs.extend_from_slice(extra);
        RuntimeConfig::from_pairs(pairs)
    }

    #[test]
    fn test_target_date_forms() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 24).unwrap();
        assert_eq!("Yesterday".parse::<TargetDate>().unwrap().resolve(today), NaiveDate::from_ymd_opt(2024, 5, 23).unwrap());
        assert_eq!(
            "2024-05-01".parse::<TargetDate>().unwrap(),
            TargetDate::Fixed(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())
        );
        assert!("05/01/2024".parse::<TargetDate>().is_err());
    }

    #[test]
    fn test_defaults_and_path_joining() {
        let settings = ReconcileSettings::from_config(&config_with(&[])).unwrap();
        assert_eq!(settings.new_file, PathBuf::from("/data/new.csv"));
        assert_eq!(settings.output_file, PathBuf::from("/data/merged.csv"));
        assert_eq!(settings.exclude_file, PathBuf::from(DEFAULT_EXCLUDE_FILE));
        assert_eq!(settings.retention_days, 14);
        assert_eq!(settings.encoding, encoding_rs::SHIFT_JIS);
        assert_eq!(settings.engine, EngineSettings::default());
    }

    #[test]
    fn test_missing_required_key_is_named() {
        let config = RuntimeConfig::from_pairs(base_pairs().into_iter().filter(|(k, _)| !k.ends_with("bkup_path")));
        let err = ReconcileSettings::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("default:bkup_path"));
    }

    #[test]
    fn test_invalid_values_fail_with_key() {
        for (key, value) in [
            ("DEFAULT:target_date", "tomorrow"),
            ("DEFAULT:duplicate_ids", "last_wins"),
            ("DEFAULT:backup_retention_days", "-1"),
            ("dates:sentinel", "9999/12/31"),
        ] {
            let mut pairs = base_pairs();
            pairs.retain(|(k, _)| *k != key);
            pairs.push((key, value));
            let err = ReconcileSettings::from_config(&RuntimeConfig::from_pairs(pairs)).unwrap_err();
            let bare = key.rsplit(':').next().unwrap();
            assert!(err.to_string().contains(bare), "{} -> {}", key, err);
        }
    }

    #[test]
    fn test_engine_overrides() {
        let config = config_with(&[
            ("DEFAULT:duplicate_ids", "first_wins"),
            ("DEFAULT:fill_blank_baseline", "true"),
            ("DEFAULT:sequence_order_column", "応募日時"),
            ("dates:formats", "%d.%m.%Y"),
            ("dates:sentinel", "none"),
            ("columns:venue_name", "会場名"),
        ]);
        let engine = EngineSettings::from_config(&config).unwrap();
        assert_eq!(engine.duplicate_policy, DuplicatePolicy::FirstWins);
        assert!(engine.merge.fill_blank_baseline);
        assert_eq!(engine.sequence_order, SequenceOrder::ByColumn("応募日時".into()));
        assert_eq!(engine.dates.formats(), &["%d.%m.%Y".to_string()][..]);
        assert_eq!(engine.dates.sentinel(), None);
        assert_eq!(engine.schema.venue_name, "会場名");
    }

    #[test]
    fn test_log_settings() {
        let config = RuntimeConfig::from_pairs([("logging:level", "debug"), ("logging:logfile", "/var/log/app.log")]);
        let settings = LogSettings::from_config(&config).unwrap();
        assert_eq!(settings.level, LEVEL_DEBUG);
        let options = settings.options();
        assert_eq!(options.use_file, options.use_tty);
        assert!(LogSettings::from_config(&RuntimeConfig::from_pairs([("logging:level", "LOUD")])).is_err());
        assert_eq!(LogSettings::from_config(&RuntimeConfig::default()).unwrap(), LogSettings::default());
    }
}
