use super::logrecord::{
    levels_from, Logrecord, LEVEL_DEBUG, LEVEL_ERROR, LEVEL_FATAL, LEVEL_INFO, LEVEL_SILLY,
    LEVEL_TRACE, LEVEL_WARN,
};
use colored::*;
use glob::{glob, Pattern};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Default size threshold before the log file is rotated.
pub const DEFAULT_MAX_BYTES: u64 = 10_000_000;
/// Default number of rotated log files kept next to the active one.
pub const DEFAULT_BACKUP_COUNT: usize = 10;

#[derive(Serialize, Deserialize, Debug, Clone)]
/// # Logger Local Options
///
/// Configuration options for the `LoggerLocal` instance, controlling where and how
/// log messages are output. Each channel carries the list of levels it accepts;
/// `None` disables the channel.
pub struct LoggerLocalOptions {
    /// A list of log levels that should be printed to the TTY (console).
    pub use_tty: Option<Vec<i64>>,
    /// A list of log levels that should be written to the log file.
    pub use_file: Option<Vec<i64>>,
    /// A list of log levels that should be kept in memory (see [`LoggerLocal::captured`]).
    pub use_memory: Option<Vec<i64>>,
    /// Path of the active log file. Required for the file channel.
    pub log_file: Option<PathBuf>,
    /// Size in bytes after which the active file is rotated. `0` disables rotation.
    pub max_bytes: u64,
    /// How many rotated files (`<file>.1` .. `<file>.N`) are kept.
    pub backup_count: usize,
}

impl Default for LoggerLocalOptions {
    fn default() -> Self {
        Self {
            use_tty: None,
            use_file: None,
            use_memory: None,
            log_file: None,
            max_bytes: DEFAULT_MAX_BYTES,
            backup_count: DEFAULT_BACKUP_COUNT,
        }
    }
}

/// # Logger Local
///
/// The diagnostics sink handed to every reconciliation stage. It is created
/// once at process start and passed by reference; there is no global logger.
pub struct LoggerLocal {
    /// The name of the application associated with this logger instance.
    app_name: String,
    /// Configuration options determining logging behavior.
    options: LoggerLocalOptions,
    /// Serializes rotation and appends to the log file.
    file_mutex: Mutex<()>,
    /// Records retained by the memory channel.
    captured: Mutex<Vec<Logrecord>>,
}

impl LoggerLocal {
    /// Shifts `<file>.N-1 -> <file>.N` ... `<file> -> <file>.1`, dropping the
    /// oldest, then deletes any numbered leftovers beyond `backup_count`.
    fn rotate_logs(log_file: &Path, backup_count: usize) {
        let numbered = |n: usize| PathBuf::from(format!("{}.{}", log_file.display(), n));

        if backup_count == 0 {
            if let Err(e) = std::fs::remove_file(log_file) {
                eprintln!("Error truncating log file {}: {}", log_file.display(), e);
            }
        } else {
            let oldest = numbered(backup_count);
            if oldest.exists() {
                let _ = std::fs::remove_file(&oldest);
            }
            for n in (1..backup_count).rev() {
                let source = numbered(n);
                if source.exists() {
                    if let Err(e) = std::fs::rename(&source, numbered(n + 1)) {
                        eprintln!("Error rotating log file {}: {}", source.display(), e);
                    }
                }
            }
            if let Err(e) = std::fs::rename(log_file, numbered(1)) {
                eprintln!("Error rotating log file {}: {}", log_file.display(), e);
            }
        }

        let pattern = format!("{}.*", Pattern::escape(&log_file.display().to_string()));
        let Ok(entries) = glob(&pattern) else {
            return;
        };
        for path in entries.flatten() {
            let surplus = path
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(|ext| ext.parse::<usize>().ok())
                .is_some_and(|n| n > backup_count);
            if surplus {
                if let Err(e) = std::fs::remove_file(&path) {
                    eprintln!("Error deleting old log file {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Creates a new `LoggerLocal` instance.
    ///
    /// If file logging is enabled, the parent directory of the log file is
    /// created. When `options` is `None`, every level goes to the TTY only.
    pub fn new(app_name: String, options: Option<LoggerLocalOptions>) -> Self {
        let default_options = LoggerLocalOptions {
            use_tty: Some(levels_from(LEVEL_SILLY)),
            ..Default::default()
        };
        let opts = options.unwrap_or(default_options);

        if opts.use_file.is_some() {
            if let Some(parent) = opts.log_file.as_deref().and_then(Path::parent) {
                if !parent.as_os_str().is_empty() {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        eprintln!("Error creating log directory {}: {}", parent.display(), e);
                    }
                }
            }
        }

        Self {
            app_name,
            options: opts,
            file_mutex: Mutex::new(()),
            captured: Mutex::new(Vec::new()),
        }
    }

    /// A logger that discards everything.
    pub fn silent(app_name: &str) -> Self {
        Self::new(app_name.to_string(), Some(LoggerLocalOptions::default()))
    }

    /// A logger that only keeps records in memory, for assertions in tests.
    pub fn capturing(app_name: &str) -> Self {
        let options = LoggerLocalOptions {
            use_memory: Some(levels_from(LEVEL_SILLY)),
            ..Default::default()
        };
        Self::new(app_name.to_string(), Some(options))
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.options.log_file.as_deref()
    }

    /// Snapshot of the records retained by the memory channel.
    pub fn captured(&self) -> Vec<Logrecord> {
        self.captured
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Logs a message with a specified level, handling TTY output, file writing
    /// and memory capture based on the logger's configuration.
    ///
    /// # Arguments
    /// * `log_level` - The numeric log level (0 silly .. 6 fatal).
    /// * `log_message` - The main message string to be logged.
    /// * `log_extras` - Additional structured data to include in the log.
    pub fn log(&self, log_level: i64, log_message: &str, log_extras: Option<Value>) {
        let mut record = Logrecord::default();
        record.app.name = self.app_name.clone();
        record.loglevel = log_level;
        record.message.text = log_message.to_string();
        if let Some(extras) = log_extras {
            record.tags = extras;
        }
        let tags_str = if record.has_tags() {
            serde_json::to_string(&record.tags).ok()
        } else {
            None
        };

        if let Some(tty_levels) = &self.options.use_tty {
            if tty_levels.contains(&log_level) {
                let colored_message = match log_level {
                    LEVEL_FATAL => log_message.bright_white().on_bright_red(),
                    LEVEL_ERROR => log_message.bright_red(),
                    LEVEL_WARN => log_message.bright_yellow(),
                    LEVEL_INFO => log_message.bright_green(),
                    LEVEL_DEBUG => log_message.bright_white(),
                    LEVEL_TRACE => log_message.bright_cyan(),
                    _ => log_message.blue(),
                };
                let ts = record.local_ts.as_str().truecolor(128, 128, 128);
                let app_name_colored = format!("[{}]", self.app_name).truecolor(128, 128, 128);

                println!("{}{} {}", ts, app_name_colored, colored_message);
                if let Some(tags) = &tags_str {
                    println!("{}{} {}", ts, app_name_colored, tags.truecolor(128, 128, 128));
                }
            }
        }

        if let Some(file_levels) = &self.options.use_file {
            if file_levels.contains(&log_level) {
                if let Some(log_file_path) = &self.options.log_file {
                    let mut line = record.to_line();
                    if let Some(tags) = &tags_str {
                        line.push(' ');
                        line.push_str(tags);
                    }
                    line.push('\n');
                    self.append_to_file(log_file_path, &line);
                }
            }
        }

        if let Some(memory_levels) = &self.options.use_memory {
            if memory_levels.contains(&log_level) {
                if let Ok(mut records) = self.captured.lock() {
                    records.push(record);
                }
            }
        }
    }

    fn append_to_file(&self, log_file_path: &Path, line: &str) {
        let _guard = self.file_mutex.lock();

        if self.options.max_bytes > 0 {
            let current = std::fs::metadata(log_file_path).map(|m| m.len()).unwrap_or(0);
            if current > 0 && current + line.len() as u64 > self.options.max_bytes {
                LoggerLocal::rotate_logs(log_file_path, self.options.backup_count);
            }
        }

        let _ = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file_path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
    }

    /// Logs a message at the "Silly" (level 0) log level.
    pub fn silly(&self, log_message: &str, log_extras: Option<Value>) {
        self.log(LEVEL_SILLY, log_message, log_extras);
    }

    /// Logs a message at the "Trace" (level 1) log level.
    pub fn trace(&self, log_message: &str, log_extras: Option<Value>) {
        self.log(LEVEL_TRACE, log_message, log_extras);
    }

    /// Logs a message at the "Debug" (level 2) log level.
    ///
    /// Used for per-record detail such as individual field overwrites.
    pub fn debug(&self, log_message: &str, log_extras: Option<Value>) {
        self.log(LEVEL_DEBUG, log_message, log_extras);
    }

    /// Logs a message at the "Info" (level 3) log level.
    pub fn info(&self, log_message: &str, log_extras: Option<Value>) {
        self.log(LEVEL_INFO, log_message, log_extras);
    }

    /// Logs a message at the "Warn" (level 4) log level.
    ///
    /// Used for recovered anomalies: unparsable dates, unmatched candidates,
    /// dropped duplicates.
    pub fn warn(&self, log_message: &str, log_extras: Option<Value>) {
        self.log(LEVEL_WARN, log_message, log_extras);
    }

    /// Logs a message at the "Error" (level 5) log level.
    pub fn error(&self, log_message: &str, log_extras: Option<Value>) {
        self.log(LEVEL_ERROR, log_message, log_extras);
    }

    /// Logs a message at the "Fatal" (level 6) log level.
    pub fn fatal(&self, log_message: &str, log_extras: Option<Value>) {
        self.log(LEVEL_FATAL, log_message, log_extras);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn file_logger(path: &Path, max_bytes: u64, backup_count: usize) -> LoggerLocal {
        let options = LoggerLocalOptions {
            use_file: Some(levels_from(LEVEL_SILLY)),
            log_file: Some(path.to_path_buf()),
            max_bytes,
            backup_count,
            ..Default::default()
        };
        LoggerLocal::new("test_app".to_string(), Some(options))
    }

    #[test]
    fn test_file_channel_writes_lines_and_extras() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("app.log");
        let logger = file_logger(&path, 0, 3);

        logger.info("This is an info message", None);
        logger.warn("This is a warning message", Some(serde_json::json!({"code": 101})));

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("test_app - INFO - This is an info message"));
        assert!(contents.contains("WARNING - This is a warning message"));
        assert!(contents.contains(r#""code":101"#));
    }

    #[test]
    fn test_levels_below_channel_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let logger = LoggerLocal::new(
            "test_app".to_string(),
            Some(LoggerLocalOptions {
                use_file: Some(levels_from(LEVEL_WARN)),
                log_file: Some(path.clone()),
                ..Default::default()
            }),
        );

        logger.debug("hidden", None);
        logger.error("shown", None);

        let contents = fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("hidden"));
        assert!(contents.contains("shown"));
    }

    #[test]
    fn test_rotation_keeps_backup_count_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let logger = file_logger(&path, 120, 2);

        for i in 0..20 {
            logger.info(&format!("message number {:02} with some padding", i), None);
        }

        assert!(path.exists());
        assert!(dir.path().join("app.log.1").exists());
        assert!(dir.path().join("app.log.2").exists());
        assert!(!dir.path().join("app.log.3").exists());
        let newest = fs::read_to_string(&path).unwrap();
        assert!(newest.contains("message number 19"));
    }

    #[test]
    fn test_capturing_logger_keeps_records() {
        let logger = LoggerLocal::capturing("test_app");
        logger.warn("first", None);
        logger.info("second", Some(serde_json::json!({"rows": 2})));

        let records = logger.captured();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].loglevel, LEVEL_WARN);
        assert_eq!(records[1].tags["rows"], 2);
    }

    #[test]
    fn test_silent_logger_keeps_nothing() {
        let logger = LoggerLocal::silent("test_app");
        logger.fatal("nothing", None);
        assert!(logger.captured().is_empty());
    }
}
