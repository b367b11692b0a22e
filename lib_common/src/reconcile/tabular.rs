//! Delimited text I/O. Every field is loaded as text; typed interpretation
//! happens in the component that needs it.

use std::fs;
use std::path::Path;

use encoding_rs::Encoding;

use super::errors::ReconcileError;

/// Default encoding of the applicant exports.
pub const DEFAULT_ENCODING: &str = "cp932";

/// A header plus rows of text fields, as read from a CSV file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Fails with a schema error naming `dataset` for the first missing column.
    pub fn require_columns(&self, dataset: &str, columns: &[&str]) -> Result<(), ReconcileError> {
        match columns.iter().find(|c| self.column_position(c).is_none()) {
            Some(missing) => Err(ReconcileError::schema(dataset, missing)),
            None => Ok(()),
        }
    }
}

/// Resolves an encoding label. `cp932` and `shift_jis` both map to
/// Windows-31J, which is what the exporting system actually writes.
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding, ReconcileError> {
    let normalized = label.trim().to_ascii_lowercase();
    let lookup = match normalized.as_str() {
        "cp932" | "ms932" | "mskanji" => "windows-31j",
        "utf-8-sig" | "utf8-sig" | "utf8" => "utf-8",
        other => other,
    };
    Encoding::for_label(lookup.as_bytes())
        .ok_or_else(|| ReconcileError::UnknownEncoding(label.to_string()))
}

/// Parses CSV bytes in `encoding`. `path` is only used for error context.
pub fn decode_table(
    bytes: &[u8],
    encoding: &'static Encoding,
    path: &Path,
) -> Result<Table, ReconcileError> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(ReconcileError::Encoding {
            path: path.to_path_buf(),
            encoding: encoding.name().to_string(),
            action: "decoded",
        });
    }

    let csv_error = |source: csv::Error| ReconcileError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result.map_err(csv_error)?;
        if record.len() > columns.len() {
            return Err(ReconcileError::RaggedRow {
                path: path.to_path_buf(),
                row: index + 2,
                expected: columns.len(),
                found: record.len(),
            });
        }
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(columns.len(), String::new());
        rows.push(row);
    }

    Ok(Table::new(columns, rows))
}

pub fn read_table(path: &Path, encoding: &'static Encoding) -> Result<Table, ReconcileError> {
    let bytes = fs::read(path).map_err(|e| ReconcileError::io(path, e))?;
    decode_table(&bytes, encoding, path)
}

/// Serializes `table` into CSV bytes in `encoding`. Characters the encoding
/// cannot represent are an error rather than being replaced.
pub fn encode_table(
    table: &Table,
    encoding: &'static Encoding,
    path: &Path,
) -> Result<Vec<u8>, ReconcileError> {
    let csv_error = |source: csv::Error| ReconcileError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&table.columns).map_err(csv_error)?;
    for row in &table.rows {
        writer.write_record(row).map_err(csv_error)?;
    }
    let buffer = writer
        .into_inner()
        .map_err(|e| ReconcileError::io(path, e.into_error()))?;
    let text = String::from_utf8(buffer).map_err(|e| {
        ReconcileError::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;

    let (bytes, _, had_errors) = encoding.encode(&text);
    if had_errors {
        return Err(ReconcileError::Encoding {
            path: path.to_path_buf(),
            encoding: encoding.name().to_string(),
            action: "encoded",
        });
    }
    Ok(bytes.into_owned())
}

/// Writes `table` straight to `path`, replacing any existing file.
pub fn write_table(
    path: &Path,
    table: &Table,
    encoding: &'static Encoding,
) -> Result<(), ReconcileError> {
    let bytes = encode_table(table, encoding, path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ReconcileError::io(parent, e))?;
    }
    fs::write(path, bytes).map_err(|e| ReconcileError::io(path, e))
}
