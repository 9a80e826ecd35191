//! Narrow interface to the external warehouse database.
//!
//! The service only needs three things from the warehouse: bulk inserts into
//! raw tables, stored procedure calls, and reads over the audit tables. Each
//! is a separate trait so components depend on exactly what they use.
//! [`PostgresWarehouse`] implements all three against PostgreSQL and
//! [`MockWarehouse`] implements them in memory for tests.

pub mod error;
pub mod mock;
pub mod postgres;

pub use error::WarehouseError;
pub use mock::MockWarehouse;
pub use postgres::PostgresWarehouse;

use crate::ingest::DecodedCsv;
use crate::procedures::ProcedureCall;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

/// What the warehouse reported back for a bulk insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertReceipt {
    /// Rows the warehouse confirmed, when it echoes them.
    pub rows_confirmed: Option<u64>,
}

#[async_trait]
pub trait RawTableSink: Debug + Send + Sync {
    /// Insert every record of `csv` into `table` as one statement.
    ///
    /// Column names are the file's headers, passed through unchanged.
    async fn insert_records(
        &self,
        table: &str,
        csv: &DecodedCsv,
    ) -> Result<InsertReceipt, WarehouseError>;
}

#[async_trait]
pub trait ProcedureRunner: Debug + Send + Sync {
    /// Invoke a stored procedure and return its result as JSON.
    async fn call(&self, call: &ProcedureCall) -> Result<Value, WarehouseError>;
}

/// Read-only access to the audit tables.
#[async_trait]
pub trait AuditSource: Debug + Send + Sync {
    /// Master log rows, newest first, optionally filtered by dataset type.
    async fn master_logs(
        &self,
        dataset_type: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Value>, WarehouseError>;

    /// Error log rows, newest first.
    async fn error_logs(&self, limit: u32) -> Result<Vec<Value>, WarehouseError>;

    /// Master log rows whose status marks a successful load.
    async fn count_successful_loads(&self) -> Result<u64, WarehouseError>;

    /// All error log rows.
    async fn count_errors(&self) -> Result<u64, WarehouseError>;
}

/// Run one external call under a deadline.
pub async fn bounded<T, F>(timeout: Duration, operation: &str, call: F) -> Result<T, WarehouseError>
where
    F: Future<Output = Result<T, WarehouseError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(WarehouseError::Timeout {
            operation: operation.to_string(),
            after: timeout,
        }),
    }
}
