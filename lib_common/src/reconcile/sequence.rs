//! # Sequence Assigner
//!
//! Numbers newly admitted applications per member, continuing from the
//! highest number the member already holds, and derives the segment flag.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde_json::json;

use super::dates::DateNormalizer;
use super::errors::ReconcileError;
use super::schema::Schema;
use super::store::RecordStore;
use crate::loggers::loggerlocal::LoggerLocal;

/// First application (sequence number 0) or a repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentFlag {
    First = 1,
    Repeat = 2,
}

impl SegmentFlag {
    pub fn from_sequence(sequence: u32) -> Self {
        if sequence == 0 {
            Self::First
        } else {
            Self::Repeat
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }
}

impl fmt::Display for SegmentFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Order in which one member's new applications receive numbers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SequenceOrder {
    /// Row order of the extract.
    #[default]
    ExtractRow,
    /// Ascending date in the named column; ties and unparsable dates keep row
    /// order, unparsable dates last.
    ByColumn(String),
}

/// Reads a stored sequence number. Integral decimals such as `"2.0"` are
/// accepted because spreadsheet round-trips produce them. Negative or
/// out-of-range values are not sequence numbers.
pub fn parse_sequence(raw: &str) -> Option<u32> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<u32>().ok().or_else(|| {
        text.parse::<f64>()
            .ok()
            .filter(|value| value.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(value))
            .map(|value| value as u32)
    })
}

#[derive(Debug, Clone)]
pub struct SequenceOutcome {
    pub store: RecordStore,
    /// New records numbered from their member's history.
    pub assigned: usize,
    /// New records that fell back to 0 (no member id).
    pub defaulted: usize,
}

pub struct SequenceAssigner<'a> {
    schema: &'a Schema,
    dates: &'a DateNormalizer,
    order: SequenceOrder,
}

impl<'a> SequenceAssigner<'a> {
    pub fn new(schema: &'a Schema, dates: &'a DateNormalizer, order: SequenceOrder) -> Self {
        Self {
            schema,
            dates,
            order,
        }
    }

    /// Assigns sequence numbers and segment flags to the rows of `store`
    /// whose id is in `new_ids`. Other rows are never modified.
    pub fn assign(
        &self,
        mut store: RecordStore,
        new_ids: &HashSet<String>,
        logger: &LoggerLocal,
    ) -> Result<SequenceOutcome, ReconcileError> {
        store.require_columns(&self.schema.sequence_columns())?;
        if let SequenceOrder::ByColumn(column) = &self.order {
            store.require_columns(&[column.as_str()])?;
        }

        let seq_column = self.schema.sequence_number.as_str();
        let member_column = self.schema.member_id.as_str();

        let mut last_counts: HashMap<String, u32> = HashMap::new();
        let mut members: Vec<String> = Vec::new();
        let mut new_rows_by_member: HashMap<String, Vec<usize>> = HashMap::new();
        let mut new_rows: Vec<usize> = Vec::new();

        for record in store.records() {
            let member = record.get(member_column).unwrap_or_default().trim();
            let is_new = new_ids.contains(record.id());
            if is_new {
                new_rows.push(record.row());
            }
            if member.is_empty() {
                continue;
            }
            let raw = record.get(seq_column).unwrap_or_default();
            match parse_sequence(raw) {
                Some(sequence) => {
                    let last = last_counts.entry(member.to_string()).or_insert(sequence);
                    *last = (*last).max(sequence);
                }
                None if !raw.trim().is_empty() => logger.warn(
                    &format!(
                        "Ignoring unreadable sequence number '{}' of {} in {}",
                        raw,
                        record.id(),
                        store.label()
                    ),
                    Some(json!({ "id": record.id(), "member": member, "value": raw })),
                ),
                None => {}
            }
            if is_new {
                new_rows_by_member
                    .entry(member.to_string())
                    .or_insert_with(|| {
                        members.push(member.to_string());
                        Vec::new()
                    })
                    .push(record.row());
            }
        }

        let mut assigned = 0;
        for member in &members {
            let mut rows = new_rows_by_member.remove(member).unwrap_or_default();
            self.sort_rows(&store, &mut rows);

            let mut last_count = last_counts.get(member).copied();
            for row in rows {
                let current = store.field(row, seq_column).and_then(parse_sequence);
                let sequence = match current {
                    Some(existing) => existing,
                    None => {
                        let next = match last_count {
                            Some(last) => last
                                .checked_add(1)
                                .ok_or_else(|| ReconcileError::sequence_overflow(store.label(), member, last))?,
                            None => 0,
                        };
                        last_count = Some(next);
                        assigned += 1;
                        next
                    }
                };
                store.set_field(row, seq_column, sequence.to_string());
            }
        }

        let mut defaulted = 0;
        for &row in &new_rows {
            let sequence = match store.field(row, seq_column).and_then(parse_sequence) {
                Some(sequence) => sequence,
                None => {
                    defaulted += 1;
                    store.set_field(row, seq_column, "0".to_string());
                    0
                }
            };
            store.set_field(
                row,
                &self.schema.segment_flag,
                SegmentFlag::from_sequence(sequence).to_string(),
            );
        }

        logger.info(
            &format!(
                "Sequence: {} new records across {} members, {} numbered, {} defaulted to 0",
                new_rows.len(),
                members.len(),
                assigned,
                defaulted
            ),
            Some(json!({ "members": members.len(), "assigned": assigned, "defaulted": defaulted })),
        );

        Ok(SequenceOutcome {
            store,
            assigned,
            defaulted,
        })
    }

    fn sort_rows(&self, store: &RecordStore, rows: &mut [usize]) {
        let SequenceOrder::ByColumn(column) = &self.order else {
            return;
        };
        // Stable sort: equal keys keep row order, `None` sorts after any date.
        rows.sort_by_key(|&row| {
            let key = store
                .field(row, column)
                .and_then(|raw| self.dates.parse_datetime(raw).ok().flatten());
            (key.is_none(), key)
        });
    }
}
