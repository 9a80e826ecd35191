//! Error types for the upload ingestion path.

use serde::Serialize;
use thiserror::Error;

/// The uploaded content could not be read as CSV at all.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Content is not valid UTF-8.
    #[error("file is not valid UTF-8 (invalid byte at offset {offset})")]
    Encoding { offset: usize },

    /// Header line could not be tokenized.
    #[error("could not read CSV header: {0}")]
    Header(String),

    /// Row width differs from the header and ragged rows are not tolerated.
    #[error("row on line {line} has {found} columns, expected {expected}")]
    RaggedRow {
        line: usize,
        expected: usize,
        found: usize,
    },
}

/// The file's headers match none of the configured schemas.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("CSV headers do not match any known table schema")]
pub struct ClassificationError {
    /// Headers as they appeared in the upload.
    pub detected_headers: Vec<String>,
    /// `(destination table, required columns)` in declaration order, which
    /// is also tie-break order.
    pub allowed_schemas: Vec<(String, Vec<String>)>,
}

/// Bulk insert was rejected by the warehouse.
///
/// `message` and `details` are the upstream values, unmodified.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Database insert failed: {message}. Details: {}", .details.as_deref().unwrap_or("none"))]
pub struct InsertError {
    pub table: String,
    pub message: String,
    pub details: Option<String>,
}

/// Backup copy could not be written. Ingestion continues.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[error("backup to '{path}' failed: {message}")]
pub struct BackupWarning {
    pub path: String,
    pub message: String,
}

/// Fatal outcomes of an upload.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error(transparent)]
    Insert(#[from] InsertError),
}
