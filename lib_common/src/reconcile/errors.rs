use std::path::PathBuf;

use thiserror::Error;

use crate::configs::config_sys::RuntimeConfigError;

/// Fatal errors of a reconciliation run. Any of these aborts the run before a
/// new baseline is written.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A required column is absent from an input dataset.
    #[error("Column '{column}' is missing from {dataset}")]
    Schema { dataset: String, column: String },

    /// Two rows of one dataset share an application id.
    #[error("Duplicate application id '{id}' in {dataset} (rows {first_row} and {duplicate_row})")]
    DuplicateId {
        dataset: String,
        id: String,
        first_row: usize,
        duplicate_row: usize,
    },

    /// A member's next sequence number does not fit the number type.
    #[error("Sequence number of member '{member}' in {dataset} cannot go past {last}")]
    SequenceOverflow { dataset: String, member: String, last: u32 },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Row {row} of {path} has {found} fields but the header has {expected}")]
    RaggedRow {
        path: PathBuf,
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("{path} could not be {action} as {encoding}")]
    Encoding {
        path: PathBuf,
        encoding: String,
        action: &'static str,
    },

    #[error("Unknown character encoding '{0}'")]
    UnknownEncoding(String),

    #[error(transparent)]
    Config(#[from] RuntimeConfigError),
}

impl ReconcileError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn schema(dataset: &str, column: &str) -> Self {
        Self::Schema {
            dataset: dataset.to_string(),
            column: column.to_string(),
        }
    }

    pub fn sequence_overflow(dataset: &str, member: &str, last: u32) -> Self {
        Self::SequenceOverflow {
            dataset: dataset.to_string(),
            member: member.to_string(),
            last,
        }
    }

    pub fn invalid_setting(key: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::Config(RuntimeConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        })
    }
}
