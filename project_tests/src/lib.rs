//! # project_tests
//!
//! Fixture helpers for the end-to-end tests under `tests/`. A [`Fixture`] owns
//! a temporary directory holding CP932 datasets, a block-list and a
//! `settings.ini`, so each test exercises the same file paths a real run does.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use lib_common::configs::config_sys::load_runtime_config;
use lib_common::reconcile::schema::{
    COL_APPLICATION_ID, COL_MEMBER_ID, COL_SEGMENT_FLAG, COL_SEQUENCE_NUMBER, COL_VENUE_NAME,
    TRACKED_COLUMNS,
};
use lib_common::reconcile::settings::ReconcileSettings;
use lib_common::reconcile::tabular::{read_table, resolve_encoding, write_table, Table};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const EXTRACT_FILE: &str = "new.csv";
pub const BASELINE_FILE: &str = "old.csv";
pub const OUTPUT_FILE: &str = "merged.csv";
pub const BLOCK_LIST_FILE: &str = "exclude_words.txt";

/// Column layout of the applicant export used by the fixtures.
pub fn export_columns() -> Vec<String> {
    let mut columns = vec![
        COL_APPLICATION_ID.to_string(),
        COL_MEMBER_ID.to_string(),
        "氏名".to_string(),
        COL_VENUE_NAME.to_string(),
    ];
    columns.extend(TRACKED_COLUMNS.iter().map(|c| c.to_string()));
    columns.push(COL_SEQUENCE_NUMBER.to_string());
    columns.push(COL_SEGMENT_FLAG.to_string());
    columns
}

/// One applicant row under construction. Unset columns are blank.
#[derive(Debug, Clone)]
pub struct Applicant {
    fields: HashMap<String, String>,
}

impl Applicant {
    pub fn new(id: &str, member: &str, venue: &str) -> Self {
        Self {
            fields: HashMap::new(),
        }
        .with(COL_APPLICATION_ID, id)
        .with(COL_MEMBER_ID, member)
        .with(COL_VENUE_NAME, venue)
        .with("氏名", "山田")
        .with("提出ステータス", "Pending")
        .with("更新日", "2024/04/01 09:00:00")
    }

    pub fn with(mut self, column: &str, value: &str) -> Self {
        self.fields.insert(column.to_string(), value.to_string());
        self
    }

    pub fn row(&self, columns: &[String]) -> Vec<String> {
        columns
            .iter()
            .map(|c| self.fields.get(c).cloned().unwrap_or_default())
            .collect()
    }
}

/// A temporary working directory laid out like a production data folder.
pub struct Fixture {
    dir: TempDir,
    /// Wall-clock time handed to the run.
    pub now: NaiveDateTime,
}

impl Fixture {
    pub fn new() -> Result<Self> {
        let now = NaiveDate::from_ymd_opt(2024, 5, 24)
            .and_then(|d| d.and_hms_opt(10, 54, 55))
            .context("fixture clock")?;
        Ok(Self {
            dir: tempfile::tempdir().context("Failed to create temporary directory")?,
            now,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.path("bkup")
    }

    /// Writes `records` as a CP932 CSV with the given header.
    pub fn write_dataset(&self, name: &str, columns: &[String], records: &[Applicant]) -> Result<PathBuf> {
        let table = Table::new(
            columns.to_vec(),
            records.iter().map(|r| r.row(columns)).collect(),
        );
        let path = self.path(name);
        write_table(&path, &table, resolve_encoding("cp932")?)?;
        Ok(path)
    }

    pub fn write_block_list(&self, patterns: &[&str]) -> Result<PathBuf> {
        let path = self.path(BLOCK_LIST_FILE);
        fs::write(&path, patterns.join("\n"))?;
        Ok(path)
    }

    /// Writes `settings.ini`. `extra` entries are `(section, key, value)`.
    pub fn write_settings(&self, target_date: &str, extra: &[(&str, &str, &str)]) -> Result<PathBuf> {
        let mut sections: BTreeMap<&str, Vec<(String, String)>> = BTreeMap::new();
        let defaults = [
            ("file_path", self.root().display().to_string()),
            ("new_file", EXTRACT_FILE.to_string()),
            ("old_file", BASELINE_FILE.to_string()),
            ("output_file", OUTPUT_FILE.to_string()),
            ("target_date", target_date.to_string()),
            ("bkup_path", self.backup_dir().display().to_string()),
            ("exclude_file", self.path(BLOCK_LIST_FILE).display().to_string()),
        ];
        for (key, value) in defaults {
            sections.entry("DEFAULT").or_default().push((key.to_string(), value));
        }
        sections
            .entry("logging")
            .or_default()
            .push(("level".to_string(), "DEBUG".to_string()));
        for &(section, key, value) in extra {
            let entries = sections.entry(section).or_default();
            entries.retain(|(existing, _)| existing != key);
            entries.push((key.to_string(), value.to_string()));
        }

        let mut text = String::new();
        for (section, entries) in &sections {
            text.push_str(&format!("[{}]\n", section));
            for (key, value) in entries {
                text.push_str(&format!("{} = {}\n", key, value));
            }
            text.push('\n');
        }
        let path = self.path("settings.ini");
        fs::write(&path, text)?;
        Ok(path)
    }

    /// Writes `settings.ini` and binds it the way the binary does.
    pub fn settings(&self, target_date: &str, extra: &[(&str, &str, &str)]) -> Result<ReconcileSettings> {
        let path = self.write_settings(target_date, extra)?;
        let config = load_runtime_config(&path)?;
        Ok(ReconcileSettings::from_config(&config)?)
    }

    pub fn read_dataset(&self, name: &str) -> Result<Table> {
        Ok(read_table(&self.path(name), resolve_encoding("cp932")?)?)
    }

    pub fn backups(&self) -> Result<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = match fs::read_dir(self.backup_dir()) {
            Ok(entries) => entries.flatten().map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        };
        paths.sort();
        Ok(paths)
    }
}

/// Values of `column` in row order.
pub fn column<'t>(table: &'t Table, name: &str) -> Vec<&'t str> {
    let position = table.column_position(name).unwrap_or(usize::MAX);
    table
        .rows
        .iter()
        .map(|row| row.get(position).map(String::as_str).unwrap_or_default())
        .collect()
}

/// Value of `name` in the row whose application id is `id`.
pub fn field<'t>(table: &'t Table, id: &str, name: &str) -> Option<&'t str> {
    let id_position = table.column_position(COL_APPLICATION_ID)?;
    let position = table.column_position(name)?;
    table
        .rows
        .iter()
        .find(|row| row[id_position] == id)
        .map(|row| row[position].as_str())
}
