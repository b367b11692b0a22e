//! # Backup Rotation
//!
//! Before a new baseline replaces the output file, the previous file is moved
//! to `<bkup_path>/<stem>_<YYYYMMDDHHMMSS>.csv` and backups older than the
//! retention window are deleted.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use encoding_rs::Encoding;
use glob::{glob, Pattern};
use serde_json::json;

use super::errors::ReconcileError;
use super::tabular::{encode_table, Table};
use crate::loggers::loggerlocal::LoggerLocal;
use crate::utils::misc::utils::COMPACT_TIMESTAMP_FORMAT;

/// Default number of days a backup is kept.
pub const DEFAULT_RETENTION_DAYS: i64 = 14;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRotation {
    dir: PathBuf,
    retention: Duration,
}

impl BackupRotation {
    pub fn new(dir: impl Into<PathBuf>, retention_days: i64) -> Self {
        Self {
            dir: dir.into(),
            retention: Duration::days(retention_days),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Backup path for `output` taken at `now`.
    pub fn backup_name(&self, output: &Path, now: NaiveDateTime) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.csv",
            file_stem(output),
            now.format(COMPACT_TIMESTAMP_FORMAT)
        ))
    }

    /// Deletes backups of `output` whose timestamp is older than the retention
    /// window. Files whose suffix is not a timestamp are left alone and
    /// reported. Returns the deleted paths.
    pub fn prune(
        &self,
        output: &Path,
        now: NaiveDateTime,
        logger: &LoggerLocal,
    ) -> Result<Vec<PathBuf>, ReconcileError> {
        let pattern = format!(
            "{}/{}_*.csv",
            Pattern::escape(&self.dir.display().to_string()),
            Pattern::escape(&file_stem(output))
        );
        let entries = glob(&pattern).map_err(|e| {
            ReconcileError::io(
                &self.dir,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
            )
        })?;

        let cutoff = now - self.retention;
        let mut removed = Vec::new();
        for path in entries.flatten() {
            let Some(taken_at) = backup_timestamp(&path) else {
                logger.warn(
                    &format!("Skipping backup with unrecognised name {}", path.display()),
                    None,
                );
                continue;
            };
            if taken_at < cutoff {
                fs::remove_file(&path).map_err(|e| ReconcileError::io(&path, e))?;
                logger.info(&format!("Deleted expired backup {}", path.display()), None);
                removed.push(path);
            }
        }
        Ok(removed)
    }

    /// Prunes expired backups, then moves an existing `output` into the
    /// backup directory. Returns the backup path when a file was moved.
    pub fn backup(
        &self,
        output: &Path,
        now: NaiveDateTime,
        logger: &LoggerLocal,
    ) -> Result<Option<PathBuf>, ReconcileError> {
        fs::create_dir_all(&self.dir).map_err(|e| ReconcileError::io(&self.dir, e))?;
        self.prune(output, now, logger)?;

        if !output.exists() {
            return Ok(None);
        }
        let target = self.backup_name(output, now);
        move_file(output, &target)?;
        logger.info(
            &format!("Backed up {} as {}", output.display(), target.display()),
            Some(json!({ "from": output, "to": &target })),
        );
        Ok(Some(target))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub output: PathBuf,
    pub backup: Option<PathBuf>,
    pub rows: usize,
}

/// Replaces `output` with `table`.
///
/// The table is encoded before anything on disk changes, so an encoding
/// failure leaves both the output and its backups untouched. The bytes go to a
/// temporary file beside `output` that is persisted over it after the previous
/// file has been moved to the backup directory.
pub fn write_with_backup(
    output: &Path,
    table: &Table,
    encoding: &'static Encoding,
    rotation: &BackupRotation,
    now: NaiveDateTime,
    logger: &LoggerLocal,
) -> Result<WriteReport, ReconcileError> {
    let bytes = encode_table(table, encoding, output)?;

    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| ReconcileError::io(&parent, e))?;

    let mut staged = tempfile::Builder::new()
        .prefix(&format!(".{}", file_stem(output)))
        .suffix(".tmp")
        .tempfile_in(&parent)
        .map_err(|e| ReconcileError::io(&parent, e))?;
    staged
        .write_all(&bytes)
        .and_then(|_| staged.flush())
        .map_err(|e| ReconcileError::io(staged.path(), e))?;

    let backup = rotation.backup(output, now, logger)?;
    staged
        .persist(output)
        .map_err(|e| ReconcileError::io(output, e.error))?;

    logger.info(
        &format!("Wrote {} rows to {}", table.len(), output.display()),
        Some(json!({ "rows": table.len(), "encoding": encoding.name() })),
    );

    Ok(WriteReport {
        output: output.to_path_buf(),
        backup,
        rows: table.len(),
    })
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Timestamp encoded in `<stem>_<YYYYMMDDHHMMSS>.csv`.
fn backup_timestamp(path: &Path) -> Option<NaiveDateTime> {
    let stem = path.file_stem()?.to_str()?;
    let (_, suffix) = stem.rsplit_once('_')?;
    NaiveDateTime::parse_from_str(suffix, COMPACT_TIMESTAMP_FORMAT).ok()
}

/// Renames `from` to `to`, falling back to copy and delete across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<(), ReconcileError> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).map_err(|e| ReconcileError::io(to, e))?;
    fs::remove_file(from).map_err(|e| ReconcileError::io(from, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::tabular::{read_table, resolve_encoding};
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn table(value: &str) -> Table {
        Table::new(vec!["応募ID".to_string()], vec![vec![value.to_string()]])
    }

    #[test]
    fn test_backup_name_uses_compact_timestamp() {
        let rotation = BackupRotation::new("/data/bkup", 14);
        let name = rotation.backup_name(Path::new("/data/applicants.csv"), at(2024, 5, 24, 10));
        assert_eq!(name, PathBuf::from("/data/bkup/applicants_20240524100000.csv"));
    }

    #[test]
    fn test_prune_removes_only_expired_backups() {
        let dir = tempfile::tempdir().unwrap();
        let bkup = dir.path().join("bkup");
        fs::create_dir_all(&bkup).unwrap();
        for name in [
            "applicants_20240401000000.csv",
            "applicants_20240520000000.csv",
            "applicants_notatime.csv",
            "others_20240101000000.csv",
        ] {
            fs::write(bkup.join(name), "x").unwrap();
        }
        let rotation = BackupRotation::new(&bkup, 14);
        let logger = LoggerLocal::capturing("t");

        let removed = rotation
            .prune(&dir.path().join("applicants.csv"), at(2024, 5, 24, 0), &logger)
            .unwrap();

        assert_eq!(removed, vec![bkup.join("applicants_20240401000000.csv")]);
        assert!(bkup.join("applicants_20240520000000.csv").exists());
        assert!(bkup.join("applicants_notatime.csv").exists());
        assert!(bkup.join("others_20240101000000.csv").exists());
        assert!(logger
            .captured()
            .iter()
            .any(|r| r.message.text.contains("applicants_notatime.csv")));
    }

    #[test]
    fn test_write_moves_previous_output_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("applicants.csv");
        let rotation = BackupRotation::new(dir.path().join("bkup"), 14);
        let encoding = resolve_encoding("cp932").unwrap();
        let logger = LoggerLocal::silent("t");

        let first = write_with_backup(&output, &table("A1"), encoding, &rotation, at(2024, 5, 23, 9), &logger)
            .unwrap();
        assert_eq!(first.backup, None);

        let second = write_with_backup(&output, &table("A2"), encoding, &rotation, at(2024, 5, 24, 9), &logger)
            .unwrap();
        let backup = second.backup.unwrap();
        assert_eq!(backup.file_name().unwrap(), "applicants_20240524090000.csv");
        assert_eq!(read_table(&backup, encoding).unwrap().rows, vec![vec!["A1".to_string()]]);
        assert_eq!(read_table(&output, encoding).unwrap().rows, vec![vec!["A2".to_string()]]);

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_unencodable_output_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("applicants.csv");
        fs::write(&output, "previous").unwrap();
        let rotation = BackupRotation::new(dir.path().join("bkup"), 14);
        let encoding = resolve_encoding("cp932").unwrap();

        let err = write_with_backup(
            &output,
            &table("😀"),
            encoding,
            &rotation,
            at(2024, 5, 24, 9),
            &LoggerLocal::silent("t"),
        )
        .unwrap_err();

        assert!(matches!(err, ReconcileError::Encoding { .. }));
        assert_eq!(fs::read_to_string(&output).unwrap(), "previous");
        assert!(!dir.path().join("bkup").exists());
    }
}
