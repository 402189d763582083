//! Error types for the MagicRows library.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for MagicRows operations outside of an enrichment run.
///
/// A run itself never fails with this type: per-row, per-output and
/// run-level failures are reported inside [`crate::EnrichmentResult`].
#[derive(Debug, Error)]
pub enum EnrichError {
    /// Error reading or writing a file.
    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error from the CSV library.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Empty file or no data to enrich.
    #[error("Empty data: {0}")]
    EmptyData(String),

    /// Preset file could not be interpreted.
    #[error("Invalid preset '{path}': {message}")]
    Preset { path: PathBuf, message: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A spawned run panicked or was aborted.
    #[error("Run task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type alias for MagicRows operations.
pub type Result<T> = std::result::Result<T, EnrichError>;

/// Classification of a recorded run error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// The configuration or dataset failed validation.
    Config,
    /// The backend rejected the credential, or none could be resolved.
    Auth,
    /// The backend throttled the request.
    RateLimited,
    /// The request exceeded its deadline.
    Timeout,
    /// The response did not satisfy the structured-output contract.
    Malformed,
    /// Transport failure or unexpected HTTP status.
    Network,
    /// The unit was never dispatched because the budget would be exceeded.
    BudgetExceeded,
    /// The run was cancelled by the caller.
    Cancelled,
}

/// One failed unit of work, or a run-level failure when `row_index` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    /// Zero-based index of the source row.
    pub row_index: Option<usize>,

    /// Output the error applies to, when outputs were requested separately.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,

    /// Failure category.
    pub kind: ErrorKind,

    /// Human-readable detail from the provider or validator.
    pub message: String,
}

impl RowError {
    /// Create an error attached to a source row.
    pub fn row(row_index: usize, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            row_index: Some(row_index),
            output_name: None,
            kind,
            message: message.into(),
        }
    }

    /// Create a run-level error not attached to any row.
    pub fn run(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            row_index: None,
            output_name: None,
            kind,
            message: message.into(),
        }
    }

    /// Attach the output name.
    pub fn with_output(mut self, output_name: Option<String>) -> Self {
        self.output_name = output_name;
        self
    }
}
