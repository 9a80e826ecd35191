//! Error types for dataset registry construction.

use super::validation::IdentifierError;
use thiserror::Error;

/// Errors raised while building a [`super::DatasetRegistry`] from configuration.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// No datasets were configured.
    #[error("at least one dataset must be configured")]
    Empty,

    /// Two datasets share the same type tag.
    #[error("dataset '{0}' is configured more than once")]
    DuplicateName(String),

    /// Two datasets route to the same destination table.
    #[error("table '{table}' is used by both '{first}' and '{second}'")]
    DuplicateTable {
        table: String,
        first: String,
        second: String,
    },

    /// Dataset type tag is not a valid identifier.
    #[error("invalid dataset name '{name}': {error}")]
    InvalidName {
        name: String,
        error: IdentifierError,
    },

    /// Destination table is not a valid identifier.
    #[error("invalid table '{table}' for dataset '{dataset}': {error}")]
    InvalidTable {
        dataset: String,
        table: String,
        error: IdentifierError,
    },

    /// A dataset has no required columns, so it would match any file.
    #[error("dataset '{0}' must declare at least one required column")]
    NoRequiredColumns(String),
}
