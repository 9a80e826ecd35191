//! Error types for warehouse operations

use std::time::Duration;
use thiserror::Error;

/// PostgreSQL SQLSTATE for `undefined_function`.
pub const UNDEFINED_FUNCTION: &str = "42883";

/// Errors reported by the external warehouse
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WarehouseError {
    /// The database rejected the statement. Fields are the upstream values.
    #[error("{message}")]
    Database {
        code: Option<String>,
        message: String,
        details: Option<String>,
    },

    /// The named procedure does not exist
    #[error("procedure not found: {0}")]
    ProcedureNotFound(String),

    /// Could not reach the database or obtain a connection
    #[error("connection failed: {0}")]
    Connection(String),

    /// The call did not finish before its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// Result could not be decoded
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl WarehouseError {
    /// True when the error means the called procedure does not exist.
    pub fn is_missing_procedure(&self) -> bool {
        match self {
            Self::ProcedureNotFound(_) => true,
            Self::Database { code, .. } => code.as_deref() == Some(UNDEFINED_FUNCTION),
            _ => false,
        }
    }

    /// Upstream detail string, when the database supplied one.
    pub fn details(&self) -> Option<&str> {
        match self {
            Self::Database { details, .. } => details.as_deref(),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for WarehouseError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) => {
                let details = db
                    .try_downcast_ref::<sqlx::postgres::PgDatabaseError>()
                    .and_then(|pg| pg.detail())
                    .map(str::to_string);
                WarehouseError::Database {
                    code: db.code().map(|c| c.into_owned()),
                    message: db.message().to_string(),
                    details,
                }
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                WarehouseError::Decode(e.to_string())
            }
            _ => WarehouseError::Connection(e.to_string()),
        }
    }
}
