//! # Record Store
//!
//! An owned, ordered collection of text records keyed by the application id.
//! Every stage of the run takes a store by value (or by shared reference for
//! read-only inputs) and hands back the store it produced; nothing is aliased.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde_json::json;

use super::errors::ReconcileError;
use super::tabular::Table;
use crate::loggers::loggerlocal::LoggerLocal;

/// True when a field carries no value. Whitespace-only text counts as blank.
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// What to do when two rows of one dataset share an application id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Fail the run with [`ReconcileError::DuplicateId`].
    #[default]
    Reject,
    /// Keep the first row and log every dropped duplicate.
    FirstWins,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" | "error" => Ok(Self::Reject),
            "first_wins" | "first" => Ok(Self::FirstWins),
            other => Err(format!("expected 'reject' or 'first_wins', got '{}'", other)),
        }
    }
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reject => write!(f, "reject"),
            Self::FirstWins => write!(f, "first_wins"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordStore {
    label: String,
    columns: Vec<String>,
    positions: HashMap<String, usize>,
    key_column: usize,
    rows: Vec<Vec<String>>,
    index: HashMap<String, usize>,
}

/// Borrowed view of one row.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    store: &'a RecordStore,
    row: usize,
}

impl<'a> Record<'a> {
    pub fn row(&self) -> usize {
        self.row
    }

    pub fn id(&self) -> &'a str {
        &self.store.rows[self.row][self.store.key_column]
    }

    /// Value of `column`, or `None` when the store has no such column.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.store
            .positions
            .get(column)
            .map(|&position| self.store.rows[self.row][position].as_str())
    }

    pub fn values(&self) -> &'a [String] {
        &self.store.rows[self.row]
    }
}

impl RecordStore {
    /// Empty store with the given header. `label` names the dataset in errors
    /// and diagnostics.
    pub fn new(label: &str, columns: Vec<String>, key: &str) -> Result<Self, ReconcileError> {
        let positions: HashMap<String, usize> = columns
            .iter()
            .enumerate()
            .map(|(position, name)| (name.clone(), position))
            .collect();
        let key_column = *positions
            .get(key)
            .ok_or_else(|| ReconcileError::schema(label, key))?;

        Ok(Self {
            label: label.to_string(),
            columns,
            positions,
            key_column,
            rows: Vec::new(),
            index: HashMap::new(),
        })
    }

    /// Builds a keyed store from a table, applying `policy` to repeated ids.
    pub fn from_table(
        label: &str,
        table: Table,
        key: &str,
        policy: DuplicatePolicy,
        logger: &LoggerLocal,
    ) -> Result<Self, ReconcileError> {
        let mut store = Self::new(label, table.columns, key)?;
        store.rows.reserve(table.rows.len());

        for (source_row, mut values) in table.rows.into_iter().enumerate() {
            values.resize(store.columns.len(), String::new());
            let id = values[store.key_column].clone();
            if let Some(&first_row) = store.index.get(&id) {
                match policy {
                    DuplicatePolicy::Reject => {
                        return Err(ReconcileError::DuplicateId {
                            dataset: label.to_string(),
                            id,
                            first_row: first_row + 1,
                            duplicate_row: source_row + 1,
                        });
                    }
                    DuplicatePolicy::FirstWins => {
                        logger.warn(
                            &format!("Dropped duplicate application id {} in {}", id, label),
                            Some(json!({ "dataset": label, "id": id, "row": source_row + 1 })),
                        );
                        continue;
                    }
                }
            }
            store.push_row(values)?;
        }

        Ok(store)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn key_column(&self) -> &str {
        &self.columns[self.key_column]
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.positions.contains_key(column)
    }

    /// Fails with a schema error naming this dataset for the first missing column.
    pub fn require_columns(&self, columns: &[&str]) -> Result<(), ReconcileError> {
        match columns.iter().find(|c| !self.has_column(c)) {
            Some(missing) => Err(ReconcileError::schema(&self.label, missing)),
            None => Ok(()),
        }
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn row_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn record(&self, row: usize) -> Option<Record<'_>> {
        (row < self.rows.len()).then_some(Record { store: self, row })
    }

    pub fn get(&self, id: &str) -> Option<Record<'_>> {
        self.row_of(id).map(|row| Record { store: self, row })
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        (0..self.rows.len()).map(move |row| Record { store: self, row })
    }

    /// Application ids in row order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(move |row| row[self.key_column].as_str())
    }

    pub fn field(&self, row: usize, column: &str) -> Option<&str> {
        let position = *self.positions.get(column)?;
        self.rows.get(row).map(|values| values[position].as_str())
    }

    /// Overwrites one field and returns the previous value. Returns `None`
    /// (and changes nothing) when the row or column does not exist or when
    /// the column is the key.
    pub fn set_field(&mut self, row: usize, column: &str, value: String) -> Option<String> {
        let position = *self.positions.get(column)?;
        if position == self.key_column {
            return None;
        }
        let values = self.rows.get_mut(row)?;
        Some(std::mem::replace(&mut values[position], value))
    }

    /// Values of one column in row order.
    pub fn project(&self, column: &str) -> Option<Vec<&str>> {
        let position = *self.positions.get(column)?;
        Some(self.rows.iter().map(|row| row[position].as_str()).collect())
    }

    /// Appends a row laid out in this store's column order. Short rows are
    /// padded with blanks, long rows truncated.
    pub fn push_row(&mut self, mut values: Vec<String>) -> Result<usize, ReconcileError> {
        values.resize(self.columns.len(), String::new());
        let id = values[self.key_column].clone();
        if let Some(&first_row) = self.index.get(&id) {
            return Err(ReconcileError::DuplicateId {
                dataset: self.label.clone(),
                id,
                first_row: first_row + 1,
                duplicate_row: self.rows.len() + 1,
            });
        }
        let row = self.rows.len();
        self.rows.push(values);
        self.index.insert(id, row);
        Ok(row)
    }

    /// Appends a record from another store, mapping fields by column name.
    /// Columns this store lacks are dropped; columns the record lacks are blank.
    pub fn append(&mut self, record: Record<'_>) -> Result<usize, ReconcileError> {
        let values = self
            .columns
            .iter()
            .map(|column| record.get(column).unwrap_or_default().to_string())
            .collect();
        self.push_row(values)
    }

    /// Appends every record of `other` in its row order.
    pub fn append_all(&mut self, other: &RecordStore) -> Result<usize, ReconcileError> {
        for record in other.records() {
            self.append(record)?;
        }
        Ok(other.len())
    }

    /// New store with the same header holding the records that satisfy `keep`.
    pub fn filtered<F>(&self, label: &str, mut keep: F) -> RecordStore
    where
        F: FnMut(Record<'_>) -> bool,
    {
        let mut rows = Vec::new();
        let mut index = HashMap::new();
        for record in self.records() {
            if keep(record) {
                index.insert(record.id().to_string(), rows.len());
                rows.push(record.values().to_vec());
            }
        }
        RecordStore {
            label: label.to_string(),
            columns: self.columns.clone(),
            positions: self.positions.clone(),
            key_column: self.key_column,
            rows,
            index,
        }
    }

    pub fn into_table(self) -> Table {
        Table::new(self.columns, self.rows)
    }
}
