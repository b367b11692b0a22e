//! # Merge Engine
//!
//! Patches baseline records with tracked-field values from extract records
//! modified on or after the target date. One engine serves every run; the
//! column set, date formats and blank-fill behaviour come from settings.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde_json::json;

use super::dates::DateNormalizer;
use super::errors::ReconcileError;
use super::schema::Schema;
use super::store::{is_blank, Record, RecordStore};
use crate::loggers::loggerlocal::LoggerLocal;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Fill blank baseline fields from non-blank extract values.
    pub fill_blank_baseline: bool,
}

/// Decision for one tracked field of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldChange {
    Keep,
    Overwrite(String),
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The patched baseline, column order unchanged.
    pub merged: RecordStore,
    /// Baseline records with at least one overwritten field.
    pub changed_count: usize,
    /// Total overwritten fields across all records.
    pub changed_fields: usize,
    /// Extract records selected for comparison.
    pub candidates: usize,
    /// Candidate ids absent from the baseline.
    pub unmatched: Vec<String>,
    /// Extract ids excluded because their last-modified date did not parse.
    pub invalid_dates: Vec<String>,
}

pub struct MergeEngine<'a> {
    schema: &'a Schema,
    dates: &'a DateNormalizer,
    options: MergeOptions,
}

impl<'a> MergeEngine<'a> {
    pub fn new(schema: &'a Schema, dates: &'a DateNormalizer, options: MergeOptions) -> Self {
        Self {
            schema,
            dates,
            options,
        }
    }

    /// Rows of `extract` modified on or after `target` that are not new.
    /// The second list holds ids whose last-modified text did not parse.
    pub fn candidates(
        &self,
        extract: &RecordStore,
        target: NaiveDate,
        new_ids: &HashSet<String>,
        logger: &LoggerLocal,
    ) -> (Vec<usize>, Vec<String>) {
        let mut rows = Vec::new();
        let mut invalid = Vec::new();

        for record in extract.records() {
            if new_ids.contains(record.id()) {
                continue;
            }
            let raw = record.get(&self.schema.last_modified).unwrap_or_default();
            match self.dates.normalize(raw) {
                Ok(Some(modified)) if modified >= target => rows.push(record.row()),
                Ok(_) => {}
                Err(e) => {
                    logger.warn(
                        &format!(
                            "Excluded application {} from update: {} {}",
                            record.id(),
                            self.schema.last_modified,
                            e
                        ),
                        Some(json!({ "id": record.id(), "value": raw })),
                    );
                    invalid.push(record.id().to_string());
                }
            }
        }

        (rows, invalid)
    }

    /// Compares one tracked field. Blank new values never erase; blank old
    /// values are filled only when enabled; unparsable dates are a no-op.
    pub fn compare_field(&self, column: &str, old: &str, new: &str) -> FieldChange {
        if is_blank(new) {
            return FieldChange::Keep;
        }
        let old_blank = is_blank(old);
        if old_blank && !self.options.fill_blank_baseline {
            return FieldChange::Keep;
        }

        if self.schema.is_date_column(column) {
            let Ok(Some(new_date)) = self.dates.normalize(new) else {
                return FieldChange::Keep;
            };
            if old_blank {
                return FieldChange::Overwrite(self.dates.canonical(new_date));
            }
            return match self.dates.normalize(old) {
                Ok(Some(old_date)) if old_date != new_date => {
                    FieldChange::Overwrite(self.dates.canonical(new_date))
                }
                _ => FieldChange::Keep,
            };
        }

        if old != new {
            FieldChange::Overwrite(new.to_string())
        } else {
            FieldChange::Keep
        }
    }

    /// Applies candidate updates from `extract` to `baseline`.
    pub fn merge(
        &self,
        extract: &RecordStore,
        mut baseline: RecordStore,
        target: NaiveDate,
        new_ids: &HashSet<String>,
        logger: &LoggerLocal,
    ) -> Result<MergeOutcome, ReconcileError> {
        let required = self.schema.merge_columns();
        extract.require_columns(&required)?;
        baseline.require_columns(&required)?;

        let (rows, invalid_dates) = self.candidates(extract, target, new_ids, logger);
        let mut changed_count = 0;
        let mut changed_fields = 0;
        let mut unmatched = Vec::new();

        for &row in &rows {
            let Some(candidate) = extract.record(row) else {
                continue;
            };
            let Some(target_row) = baseline.row_of(candidate.id()) else {
                logger.warn(
                    &format!("Update candidate {} not found in baseline", candidate.id()),
                    Some(json!({ "id": candidate.id() })),
                );
                unmatched.push(candidate.id().to_string());
                continue;
            };

            let changes = self.diff(candidate, &baseline, target_row);
            if changes.is_empty() {
                continue;
            }
            for (column, value) in changes {
                let previous = baseline.set_field(target_row, column, value.clone());
                logger.debug(
                    &format!("Updated {} of application {}", column, candidate.id()),
                    Some(json!({ "id": candidate.id(), "column": column, "old": previous, "new": value })),
                );
                changed_fields += 1;
            }
            changed_count += 1;
        }

        logger.info(
            &format!(
                "Merge: {} candidates since {}, {} records updated ({} fields)",
                rows.len(),
                target,
                changed_count,
                changed_fields
            ),
            None,
        );

        Ok(MergeOutcome {
            merged: baseline,
            changed_count,
            changed_fields,
            candidates: rows.len(),
            unmatched,
            invalid_dates,
        })
    }

    fn diff<'s>(
        &'s self,
        candidate: Record<'_>,
        baseline: &RecordStore,
        row: usize,
    ) -> Vec<(&'s str, String)> {
        self.schema
            .tracked
            .iter()
            .filter_map(|column| {
                let old = baseline.field(row, column).unwrap_or_default();
                let new = candidate.get(column).unwrap_or_default();
                match self.compare_field(column, old, new) {
                    FieldChange::Overwrite(value) => Some((column.as_str(), value)),
                    FieldChange::Keep => None,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::store::DuplicatePolicy;
    use crate::reconcile::tabular::Table;

    const COLUMNS: [&str; 4] = ["応募ID", "提出ステータス", "研修初日", "更新日"];

    fn schema() -> Schema {
        Schema {
            tracked: vec!["提出ステータス".into(), "研修初日".into(), "更新日".into()],
            date_columns: vec!["研修初日".into(), "更新日".into()],
            ..Schema::default()
        }
    }

    fn store(label: &str, rows: &[[&str; 4]]) -> RecordStore {
        let table = Table::new(
            COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|v| v.to_string()).collect())
                .collect(),
        );
        RecordStore::from_table(label, table, "応募ID", DuplicatePolicy::Reject, &LoggerLocal::silent("t"))
            .unwrap()
    }

    fn target() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn test_changed_status_is_overwritten_and_counted() {
        let schema = schema();
        let dates = DateNormalizer::default();
        let engine = MergeEngine::new(&schema, &dates, MergeOptions::default());
        let baseline = store("baseline", &[["A3", "Pending", "2024/04/01", "2024/04/20"]]);
        let extract = store("extract", &[["A3", "Approved", "2024-04-01", "2024/05/02 09:00:00"]]);

        let outcome = engine
            .merge(&extract, baseline, target(), &HashSet::new(), &LoggerLocal::silent("t"))
            .unwrap();

        assert_eq!(outcome.changed_count, 1);
        assert_eq!(outcome.changed_fields, 2);
        let merged = outcome.merged.get("A3").unwrap();
        assert_eq!(merged.get("提出ステータス"), Some("Approved"));
        assert_eq!(merged.get("研修初日"), Some("2024/04/01"), "equal dates keep their text");
        assert_eq!(merged.get("更新日"), Some("2024/05/02"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let schema = schema();
        let dates = DateNormalizer::default();
        let engine = MergeEngine::new(&schema, &dates, MergeOptions::default());
        let baseline = store("baseline", &[["A1", "Pending", "2024/06/01", "2024/04/20"]]);
        let extract = store("extract", &[["A1", "Approved", "9999-12-31", "2024-05-03"]]);
        let logger = LoggerLocal::silent("t");

        let first = engine.merge(&extract, baseline, target(), &HashSet::new(), &logger).unwrap();
        assert_eq!(first.changed_count, 1);
        assert_eq!(first.merged.get("A1").unwrap().get("研修初日"), Some("2100/12/31"));

        let second = engine.merge(&extract, first.merged, target(), &HashSet::new(), &logger).unwrap();
        assert_eq!(second.changed_count, 0);
        assert_eq!(second.changed_fields, 0);
    }

    #[test]
    fn test_blank_new_value_never_erases() {
        let schema = schema();
        let dates = DateNormalizer::default();
        for fill in [false, true] {
            let engine = MergeEngine::new(&schema, &dates, MergeOptions { fill_blank_baseline: fill });
            assert_eq!(engine.compare_field("提出ステータス", "Pending", ""), FieldChange::Keep);
            assert_eq!(engine.compare_field("研修初日", "2024/01/01", " "), FieldChange::Keep);
        }
    }

    #[test]
    fn test_blank_old_value_filled_only_when_enabled() {
        let schema = schema();
        let dates = DateNormalizer::default();
        let strict = MergeEngine::new(&schema, &dates, MergeOptions::default());
        let filling = MergeEngine::new(&schema, &dates, MergeOptions { fill_blank_baseline: true });

        assert_eq!(strict.compare_field("提出ステータス", "", "Approved"), FieldChange::Keep);
        assert_eq!(
            filling.compare_field("提出ステータス", "", "Approved"),
            FieldChange::Overwrite("Approved".into())
        );
        assert_eq!(
            filling.compare_field("研修初日", "", "2024-07-01"),
            FieldChange::Overwrite("2024/07/01".into())
        );
    }

    #[test]
    fn test_unparsable_field_date_is_a_no_op() {
        let schema = schema();
        let dates = DateNormalizer::default();
        let engine = MergeEngine::new(&schema, &dates, MergeOptions { fill_blank_baseline: true });
        assert_eq!(engine.compare_field("研修初日", "2024/01/01", "soon"), FieldChange::Keep);
        assert_eq!(engine.compare_field("研修初日", "unknown", "2024/02/01"), FieldChange::Keep);
    }

    #[test]
    fn test_sentinel_compared_after_normalization() {
        let schema = schema();
        let dates = DateNormalizer::default();
        let engine = MergeEngine::new(&schema, &dates, MergeOptions::default());
        assert_eq!(engine.compare_field("研修初日", "2100/12/31", "9999/12/31"), FieldChange::Keep);
        assert_eq!(
            engine.compare_field("研修初日", "2024/04/01", "9999-12-31"),
            FieldChange::Overwrite("2100/12/31".into())
        );
    }

    #[test]
    fn test_candidate_selection_rules() {
        let schema = schema();
        let dates = DateNormalizer::default();
        let engine = MergeEngine::new(&schema, &dates, MergeOptions::default());
        let extract = store(
            "extract",
            &[
                ["A1", "x", "", "2024/04/30"],
                ["A2", "x", "", "2024/05/01"],
                ["A3", "x", "", "not a date"],
                ["A4", "x", "", ""],
                ["A5", "x", "", "2024/06/01"],
            ],
        );
        let new_ids: HashSet<String> = ["A5".to_string()].into_iter().collect();
        let logger = LoggerLocal::capturing("t");

        let (rows, invalid) = engine.candidates(&extract, target(), &new_ids, &logger);

        assert_eq!(rows, vec![1]);
        assert_eq!(invalid, vec!["A3".to_string()]);
        assert_eq!(logger.captured().len(), 1);
    }

    #[test]
    fn test_unparsable_last_modified_leaves_baseline_untouched() {
        let schema = schema();
        let dates = DateNormalizer::default();
        let engine = MergeEngine::new(&schema, &dates, MergeOptions::default());
        let baseline = store("baseline", &[["A1", "Pending", "", "2024/04/20"]]);
        let extract = store("extract", &[["A1", "Approved", "", "yesterday-ish"]]);
        let before = baseline.clone();

        let outcome = engine
            .merge(&extract, baseline, target(), &HashSet::new(), &LoggerLocal::silent("t"))
            .unwrap();

        assert_eq!(outcome.changed_count, 0);
        assert_eq!(outcome.invalid_dates, vec!["A1".to_string()]);
        assert_eq!(outcome.merged, before);
    }

    #[test]
    fn test_unmatched_candidate_is_reported_not_admitted() {
        let schema = schema();
        let dates = DateNormalizer::default();
        let engine = MergeEngine::new(&schema, &dates, MergeOptions::default());
        let baseline = store("baseline", &[["A1", "Pending", "", "2024/04/20"]]);
        let extract = store("extract", &[["Z9", "Approved", "", "2024/05/20"]]);

        let outcome = engine
            .merge(&extract, baseline, target(), &HashSet::new(), &LoggerLocal::silent("t"))
            .unwrap();

        assert_eq!(outcome.unmatched, vec!["Z9".to_string()]);
        assert_eq!(outcome.merged.len(), 1);
        assert!(!outcome.merged.contains_id("Z9"));
    }

    #[test]
    fn test_missing_tracked_column_is_schema_error() {
        let schema = Schema {
            tracked: vec!["保留月数".into()],
            ..schema()
        };
        let dates = DateNormalizer::default();
        let engine = MergeEngine::new(&schema, &dates, MergeOptions::default());
        let baseline = store("baseline", &[]);
        let extract = store("extract", &[]);
        let err = engine
            .merge(&extract, baseline, target(), &HashSet::new(), &LoggerLocal::silent("t"))
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Schema { ref column, .. } if column == "保留月数"));
    }
}
