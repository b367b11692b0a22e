//! # Application Counting
//!
//! Numbers every application of a member by submission time and attaches the
//! running and total counts to the full export.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde_json::json;

use super::dates::DateNormalizer;
use super::errors::ReconcileError;
use super::store::is_blank;
use super::tabular::Table;
use crate::loggers::loggerlocal::LoggerLocal;

pub const COL_APPLIED_AT: &str = "応募日時";
pub const COL_APPLIED_ON: &str = "応募日";
pub const COL_RUNNING_COUNT: &str = "何回目応募か";
pub const COL_TOTAL_COUNT: &str = "累積応募回数";

/// Column names read and written by [`count_applications`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountColumns {
    pub applied_at: String,
    pub application_id: String,
    pub member_id: String,
    pub applied_on: String,
    pub running_count: String,
    pub total_count: String,
}

impl Default for CountColumns {
    fn default() -> Self {
        Self {
            applied_at: COL_APPLIED_AT.to_string(),
            application_id: super::schema::COL_APPLICATION_ID.to_string(),
            member_id: super::schema::COL_MEMBER_ID.to_string(),
            applied_on: COL_APPLIED_ON.to_string(),
            running_count: COL_RUNNING_COUNT.to_string(),
            total_count: COL_TOTAL_COUNT.to_string(),
        }
    }
}

impl CountColumns {
    fn inputs(&self) -> [&str; 3] {
        [
            self.applied_at.as_str(),
            self.application_id.as_str(),
            self.member_id.as_str(),
        ]
    }
}

struct CountRow {
    values: Vec<String>,
    applied_at: Option<NaiveDateTime>,
}

/// Builds the count table from `input`.
///
/// Rows whose application id occurs more than once are dropped entirely. The
/// survivors are ordered by submission time (stable, unparsable times last)
/// and receive a 1-based running count and a total per member. Rows without a
/// member id get blank counts.
pub fn count_applications(
    input: &Table,
    columns: &CountColumns,
    dates: &DateNormalizer,
    logger: &LoggerLocal,
) -> Result<Table, ReconcileError> {
    input.require_columns("count input", &columns.inputs())?;

    // Input columns keep their file order, as a column-subset read would.
    let positions: Vec<usize> = input
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| columns.inputs().contains(&name.as_str()))
        .map(|(position, _)| position)
        .collect();
    let local = |name: &str| {
        positions
            .iter()
            .position(|&p| input.columns[p] == name)
            .unwrap_or_default()
    };
    let (at_index, id_index, member_index) = (
        local(&columns.applied_at),
        local(&columns.application_id),
        local(&columns.member_id),
    );

    let mut occurrences: HashMap<&str, usize> = HashMap::new();
    for row in &input.rows {
        let id = row
            .get(positions[id_index])
            .map(String::as_str)
            .unwrap_or_default();
        *occurrences.entry(id).or_default() += 1;
    }

    let mut rows: Vec<CountRow> = Vec::new();
    let mut dropped = 0;
    for (index, row) in input.rows.iter().enumerate() {
        let values: Vec<String> = positions
            .iter()
            .map(|&p| row.get(p).cloned().unwrap_or_default())
            .collect();
        if occurrences.get(values[id_index].as_str()).copied().unwrap_or_default() > 1 {
            dropped += 1;
            continue;
        }
        let applied_at = match dates.parse_datetime(&values[at_index]) {
            Ok(parsed) => parsed,
            Err(e) => {
                logger.warn(
                    &format!("Row {} of count input: {}", index + 2, e),
                    Some(json!({ "id": values[id_index], "raw": e.raw })),
                );
                None
            }
        };
        rows.push(CountRow { values, applied_at });
    }
    rows.sort_by_key(|row| (row.applied_at.is_none(), row.applied_at));

    let mut totals: HashMap<String, usize> = HashMap::new();
    for row in &rows {
        let member = row.values[member_index].trim();
        if !member.is_empty() {
            *totals.entry(member.to_string()).or_default() += 1;
        }
    }

    let mut running: HashMap<String, usize> = HashMap::new();
    let mut output_rows = Vec::with_capacity(rows.len());
    for row in rows {
        let member = row.values[member_index].trim().to_string();
        let applied_on = row
            .applied_at
            .map(|at| dates.canonical(at.date()))
            .unwrap_or_default();
        let (nth, total) = if member.is_empty() {
            (String::new(), String::new())
        } else {
            let nth = running.entry(member.clone()).or_default();
            *nth += 1;
            (nth.to_string(), totals[&member].to_string())
        };

        let mut values = row.values;
        values.extend([applied_on, nth, total]);
        output_rows.push(values);
    }

    let mut header: Vec<String> = positions.iter().map(|&p| input.columns[p].clone()).collect();
    header.extend([
        columns.applied_on.clone(),
        columns.running_count.clone(),
        columns.total_count.clone(),
    ]);

    logger.info(
        &format!(
            "Counted {} applications of {} members, {} dropped as duplicated ids",
            output_rows.len(),
            totals.len(),
            dropped
        ),
        None,
    );

    Ok(Table::new(header, output_rows))
}

/// Left-joins the count columns of `counts` onto `input` by application id.
/// Input rows and column order are kept; the running and total counts are
/// appended (or overwritten when present) and the application date is only
/// added when the input lacks it.
pub fn attach_counts(
    input: &Table,
    counts: &Table,
    columns: &CountColumns,
) -> Result<Table, ReconcileError> {
    input.require_columns("count input", &[columns.application_id.as_str()])?;
    counts.require_columns(
        "count table",
        &[
            columns.application_id.as_str(),
            columns.applied_on.as_str(),
            columns.running_count.as_str(),
            columns.total_count.as_str(),
        ],
    )?;

    let mut joined: Vec<&str> = Vec::new();
    if input.column_position(&columns.applied_on).is_none() {
        joined.push(&columns.applied_on);
    }
    joined.push(&columns.running_count);
    joined.push(&columns.total_count);

    let count_id = counts.column_position(&columns.application_id).unwrap_or_default();
    let count_sources: Vec<usize> = joined
        .iter()
        .filter_map(|name| counts.column_position(name))
        .collect();
    let by_id: HashMap<&str, &Vec<String>> = counts
        .rows
        .iter()
        .map(|row| (row[count_id].as_str(), row))
        .collect();

    let mut header = input.columns.clone();
    let targets: Vec<usize> = joined
        .iter()
        .map(|name| match input.column_position(name) {
            Some(position) => position,
            None => {
                header.push(name.to_string());
                header.len() - 1
            }
        })
        .collect();

    let input_id = input.column_position(&columns.application_id).unwrap_or_default();
    let rows = input
        .rows
        .iter()
        .map(|row| {
            let mut values = row.clone();
            values.resize(header.len(), String::new());
            let matched = row
                .get(input_id)
                .filter(|id| !is_blank(id))
                .and_then(|id| by_id.get(id.as_str()));
            for (&target, &source) in targets.iter().zip(&count_sources) {
                values[target] = matched
                    .and_then(|count_row| count_row.get(source).cloned())
                    .unwrap_or_default();
            }
            values
        })
        .collect();

    Ok(Table::new(header, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|v| v.to_string()).collect())
                .collect(),
        )
    }

    fn input() -> Table {
        table(
            &["応募ID", "氏名", "応募日時", "会員ID"],
            &[
                &["A1", "Sato", "2024/05/03 10:00:00", "M1"],
                &["A2", "Sato", "2024/05/01 09:00:00", "M1"],
                &["A3", "Kato", "2024/05/02 12:00:00", ""],
                &["A4", "Ito", "2024/05/02 08:00:00", "M2"],
                &["A5", "Ito", "2024/05/04 08:00:00", "M2"],
                &["A5", "Ito", "2024/05/04 08:00:00", "M2"],
            ],
        )
    }

    fn column<'t>(table: &'t Table, name: &str) -> Vec<&'t str> {
        let position = table.column_position(name).unwrap();
        table.rows.iter().map(|row| row[position].as_str()).collect()
    }

    #[test]
    fn test_counts_follow_submission_time() {
        let counts = count_applications(
            &input(),
            &CountColumns::default(),
            &DateNormalizer::default(),
            &LoggerLocal::silent("t"),
        )
        .unwrap();

        assert_eq!(
            counts.columns,
            vec!["応募ID", "応募日時", "会員ID", "応募日", "何回目応募か", "累積応募回数"]
        );
        assert_eq!(column(&counts, "応募ID"), vec!["A2", "A4", "A3", "A1"]);
        assert_eq!(column(&counts, "何回目応募か"), vec!["1", "1", "", "2"]);
        assert_eq!(column(&counts, "累積応募回数"), vec!["2", "1", "", "2"]);
        assert_eq!(column(&counts, "応募日"), vec!["2024/05/01", "2024/05/02", "2024/05/02", "2024/05/03"]);
    }

    #[test]
    fn test_unparsable_time_sorts_last_and_is_logged() {
        let source = table(
            &["応募日時", "応募ID", "会員ID"],
            &[&["someday", "B1", "M1"], &["2024/05/01", "B2", "M1"]],
        );
        let logger = LoggerLocal::capturing("t");
        let counts =
            count_applications(&source, &CountColumns::default(), &DateNormalizer::default(), &logger).unwrap();

        assert_eq!(column(&counts, "応募ID"), vec!["B2", "B1"]);
        assert_eq!(column(&counts, "何回目応募か"), vec!["1", "2"]);
        assert_eq!(column(&counts, "応募日"), vec!["2024/05/01", ""]);
        assert_eq!(logger.captured().len(), 2);
    }

    #[test]
    fn test_attach_counts_keeps_input_rows_and_order() {
        let source = input();
        let columns = CountColumns::default();
        let counts =
            count_applications(&source, &columns, &DateNormalizer::default(), &LoggerLocal::silent("t")).unwrap();
        let output = attach_counts(&source, &counts, &columns).unwrap();

        assert_eq!(
            output.columns,
            vec!["応募ID", "氏名", "応募日時", "会員ID", "応募日", "何回目応募か", "累積応募回数"]
        );
        assert_eq!(output.len(), 6);
        assert_eq!(column(&output, "何回目応募か"), vec!["2", "1", "", "1", "", ""]);
        assert_eq!(column(&output, "累積応募回数"), vec!["2", "2", "", "1", "", ""]);
    }

    #[test]
    fn test_attach_counts_overwrites_existing_count_columns() {
        let source = table(
            &["応募ID", "応募日時", "会員ID", "応募日", "何回目応募か"],
            &[&["A1", "2024/05/01 10:00", "M1", "keep me", "99"]],
        );
        let columns = CountColumns::default();
        let counts =
            count_applications(&source, &columns, &DateNormalizer::default(), &LoggerLocal::silent("t")).unwrap();
        let output = attach_counts(&source, &counts, &columns).unwrap();

        assert_eq!(
            output.columns,
            vec!["応募ID", "応募日時", "会員ID", "応募日", "何回目応募か", "累積応募回数"]
        );
        assert_eq!(output.rows[0], vec!["A1", "2024/05/01 10:00", "M1", "keep me", "1", "1"]);
    }

    #[test]
    fn test_missing_input_column_is_schema_error() {
        let source = table(&["応募ID", "会員ID"], &[&["A1", "M1"]]);
        let err = count_applications(
            &source,
            &CountColumns::default(),
            &DateNormalizer::default(),
            &LoggerLocal::silent("t"),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Column '応募日時' is missing from count input");
    }
}
