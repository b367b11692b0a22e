//! # Admission Filter
//!
//! Drops extract records whose venue name contains a block-listed substring,
//! then finds the ids the baseline has never seen.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde_json::json;

use super::errors::ReconcileError;
use super::schema::Schema;
use super::store::{is_blank, RecordStore};
use crate::loggers::loggerlocal::LoggerLocal;

/// Newline-delimited substrings matched case-sensitively against venue names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockList {
    patterns: Vec<String>,
}

impl BlockList {
    /// Empty lines are ignored; they would otherwise match every venue.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self { patterns }
    }

    /// Reads a UTF-8 block-list file, one substring per line.
    pub fn load(path: &Path) -> Result<Self, ReconcileError> {
        let text = fs::read_to_string(path).map_err(|e| ReconcileError::io(path, e))?;
        Ok(Self::new(text.trim_start_matches('\u{feff}').lines()))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// First pattern contained in `venue`. A blank venue never matches.
    pub fn matching(&self, venue: &str) -> Option<&str> {
        if is_blank(venue) {
            return None;
        }
        self.patterns
            .iter()
            .find(|pattern| venue.contains(pattern.as_str()))
            .map(String::as_str)
    }

    pub fn is_blocked(&self, venue: &str) -> bool {
        self.matching(venue).is_some()
    }
}

/// Result of classifying an extract against the baseline.
#[derive(Debug, Clone)]
pub struct Admission {
    /// Extract records that survived the block-list, in extract order.
    pub admitted: RecordStore,
    /// Admitted records whose id is absent from the baseline, in extract order.
    pub new_records: RecordStore,
    /// Ids of `new_records`.
    pub new_ids: HashSet<String>,
    /// Number of extract records removed by the block-list.
    pub blocked: usize,
}

/// Partitions `extract` into blocked, new and already-known records.
pub fn classify(
    extract: &RecordStore,
    baseline: &RecordStore,
    block_list: &BlockList,
    schema: &Schema,
    logger: &LoggerLocal,
) -> Result<Admission, ReconcileError> {
    let required = schema.admission_columns();
    extract.require_columns(&required)?;
    baseline.require_columns(&required)?;

    let mut blocked = 0;
    let admitted = extract.filtered(extract.label(), |record| {
        let venue = record.get(&schema.venue_name).unwrap_or_default();
        match block_list.matching(venue) {
            Some(pattern) => {
                blocked += 1;
                logger.debug(
                    &format!("Blocked application {} (venue '{}')", record.id(), venue),
                    Some(json!({ "id": record.id(), "venue": venue, "pattern": pattern })),
                );
                false
            }
            None => true,
        }
    });

    let new_ids: HashSet<String> = admitted
        .ids()
        .filter(|id| !baseline.contains_id(id))
        .map(str::to_string)
        .collect();
    let new_records = admitted.filtered("new records", |record| new_ids.contains(record.id()));

    logger.info(
        &format!(
            "Admission: {} extract records, {} blocked, {} new",
            extract.len(),
            blocked,
            new_records.len()
        ),
        None,
    );

    Ok(Admission {
        admitted,
        new_records,
        new_ids,
        blocked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::store::DuplicatePolicy;
    use crate::reconcile::tabular::Table;

    fn store(label: &str, rows: &[(&str, &str)]) -> RecordStore {
        let table = Table::new(
            vec!["応募ID".to_string(), "教室名".to_string()],
            rows.iter()
                .map(|(id, venue)| vec![id.to_string(), venue.to_string()])
                .collect(),
        );
        RecordStore::from_table(label, table, "応募ID", DuplicatePolicy::Reject, &LoggerLocal::silent("t"))
            .unwrap()
    }

    #[test]
    fn test_block_list_ignores_empty_lines_and_blank_venues() {
        let list = BlockList::new(["Blocked", "", "  ", "テスト"]);
        assert_eq!(list.len(), 2);
        assert!(list.is_blocked("Blocked Center"));
        assert!(list.is_blocked("テスト教室"));
        assert!(!list.is_blocked("blocked center"), "match is case-sensitive");
        assert!(!list.is_blocked(""));
        assert!(!BlockList::default().is_blocked("anything"));
    }

    #[test]
    fn test_new_ids_are_filtered_extract_minus_baseline() {
        let baseline = store("baseline", &[("A1", "Tokyo"), ("A9", "Osaka")]);
        let extract = store(
            "extract",
            &[("A1", "Tokyo"), ("A2", "Blocked Center"), ("A3", "Nagoya"), ("A4", "")],
        );
        let list = BlockList::new(["Blocked"]);

        let admission = classify(&extract, &baseline, &list, &Schema::default(), &LoggerLocal::silent("t")).unwrap();

        let expected: HashSet<String> = ["A3", "A4"].iter().map(|s| s.to_string()).collect();
        assert_eq!(admission.new_ids, expected);
        assert_eq!(admission.blocked, 1);
        assert_eq!(admission.admitted.len(), 3);
        assert_eq!(admission.new_records.ids().collect::<Vec<_>>(), vec!["A3", "A4"]);
    }

    #[test]
    fn test_blocked_record_already_in_baseline_is_not_new() {
        let baseline = store("baseline", &[("A2", "Blocked Center")]);
        let extract = store("extract", &[("A2", "Blocked Center")]);
        let admission = classify(
            &extract,
            &baseline,
            &BlockList::new(["Blocked"]),
            &Schema::default(),
            &LoggerLocal::silent("t"),
        )
        .unwrap();
        assert!(admission.new_ids.is_empty());
        assert!(!admission.admitted.contains_id("A2"));
    }

    #[test]
    fn test_missing_venue_column_is_schema_error() {
        let table = Table::new(vec!["応募ID".to_string()], vec![vec!["A1".to_string()]]);
        let extract =
            RecordStore::from_table("extract", table, "応募ID", DuplicatePolicy::Reject, &LoggerLocal::silent("t"))
                .unwrap();
        let baseline = store("baseline", &[]);
        let err = classify(&extract, &baseline, &BlockList::default(), &Schema::default(), &LoggerLocal::silent("t"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Column '教室名' is missing from extract");
    }

    #[test]
    fn test_load_strips_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exclude_words.txt");
        fs::write(&path, "\u{feff}Blocked\r\n\r\nテスト\n").unwrap();
        let list = BlockList::load(&path).unwrap();
        assert_eq!(list.patterns(), &["Blocked".to_string(), "テスト".to_string()][..]);
    }
}
