//! In-memory table and source metadata.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a table was read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
    /// File name without path.
    pub file: String,
    pub path: PathBuf,
    /// SHA-256 of the raw file contents, prefixed with `sha256:`.
    pub hash: String,
    pub size_bytes: u64,
    /// Detected format (csv, tsv, ...).
    pub format: String,
    pub row_count: usize,
    pub column_count: usize,
    pub loaded_at: DateTime<Utc>,
}

impl SourceMetadata {
    pub fn new(path: PathBuf, hash: String, size_bytes: u64, table: &DataTable) -> Self {
        let file = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            file,
            path,
            hash,
            size_bytes,
            format: format_name(table.delimiter).to_string(),
            row_count: table.row_count(),
            column_count: table.column_count(),
            loaded_at: Utc::now(),
        }
    }
}

/// Conventional name of a delimited format.
pub fn format_name(delimiter: u8) -> &'static str {
    match delimiter {
        b'\t' => "tsv",
        b',' => "csv",
        b';' => "csv-semicolon",
        b'|' => "psv",
        _ => "delimited",
    }
}

/// Headers and string rows, as handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTable {
    pub headers: Vec<String>,
    /// Row-major cell values.
    pub rows: Vec<Vec<String>>,
    /// Delimiter the table was read with, reused when writing it back.
    pub delimiter: u8,
}

impl DataTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>, delimiter: u8) -> Self {
        Self {
            headers,
            rows,
            delimiter,
        }
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}
