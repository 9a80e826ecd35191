//! Mock warehouse implementation for testing.
//!
//! Provides a configurable in-memory implementation of every warehouse trait
//! so ingestion, dispatch and audit paths can be exercised without a database.
//! Calls are counted and recorded for assertions.

use super::{AuditSource, InsertReceipt, ProcedureRunner, RawTableSink, WarehouseError};
use crate::ingest::DecodedCsv;
use crate::procedures::ProcedureCall;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Mock warehouse that can be configured to fail for testing error handling.
#[derive(Debug)]
pub struct MockWarehouse {
    inserted: Mutex<Vec<(String, usize)>>,
    insert_calls: AtomicUsize,
    insert_failure: Mutex<Option<WarehouseError>>,
    echo_rows: AtomicBool,
    procedure_calls: Mutex<Vec<ProcedureCall>>,
    missing_procedures: Mutex<HashSet<String>>,
    failing_procedures: Mutex<HashMap<String, String>>,
    procedure_results: Mutex<HashMap<String, Value>>,
    master_logs: Mutex<Vec<Value>>,
    error_logs: Mutex<Vec<Value>>,
    fail_audit: AtomicBool,
}

impl MockWarehouse {
    pub fn new() -> Self {
        Self {
            inserted: Mutex::new(Vec::new()),
            insert_calls: AtomicUsize::new(0),
            insert_failure: Mutex::new(None),
            echo_rows: AtomicBool::new(true),
            procedure_calls: Mutex::new(Vec::new()),
            missing_procedures: Mutex::new(HashSet::new()),
            failing_procedures: Mutex::new(HashMap::new()),
            procedure_results: Mutex::new(HashMap::new()),
            master_logs: Mutex::new(Vec::new()),
            error_logs: Mutex::new(Vec::new()),
            fail_audit: AtomicBool::new(false),
        }
    }

    /// Make every insert fail with the given upstream message and details.
    pub fn fail_inserts_with(&self, message: &str, details: Option<&str>) {
        *self.insert_failure.lock().unwrap() = Some(WarehouseError::Database {
            code: Some("42703".to_string()),
            message: message.to_string(),
            details: details.map(str::to_string),
        });
    }

    /// Whether inserts report a confirmed row count (default true).
    pub fn set_echo_rows(&self, echo: bool) {
        self.echo_rows.store(echo, Ordering::SeqCst);
    }

    /// Calls to `procedure` fail as if it did not exist.
    pub fn mark_procedure_missing(&self, procedure: &str) {
        self.missing_procedures
            .lock()
            .unwrap()
            .insert(procedure.to_string());
    }

    /// Calls to `procedure` fail with a database error.
    pub fn fail_procedure(&self, procedure: &str, message: &str) {
        self.failing_procedures
            .lock()
            .unwrap()
            .insert(procedure.to_string(), message.to_string());
    }

    /// Value returned by successful calls to `procedure` (default `null`).
    pub fn set_procedure_result(&self, procedure: &str, result: Value) {
        self.procedure_results
            .lock()
            .unwrap()
            .insert(procedure.to_string(), result);
    }

    /// Append a master log row. Rows should carry `created_at`, `status`
    /// and `dataset_type`.
    pub fn push_master_log(&self, row: Value) {
        self.master_logs.lock().unwrap().push(row);
    }

    pub fn push_error_log(&self, row: Value) {
        self.error_logs.lock().unwrap().push(row);
    }

    /// Configure whether audit reads should fail.
    pub fn set_fail_audit(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// Successful inserts as `(table, row count)`, in call order.
    pub fn inserted(&self) -> Vec<(String, usize)> {
        self.inserted.lock().unwrap().clone()
    }

    /// Every procedure call, in call order.
    pub fn procedure_calls(&self) -> Vec<ProcedureCall> {
        self.procedure_calls.lock().unwrap().clone()
    }

    fn audit_guard(&self) -> Result<(), WarehouseError> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(WarehouseError::Connection(
                "Simulated audit read failure".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MockWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

/// Newest first by `created_at`, compared as strings (RFC 3339 sorts correctly).
fn newest_first(rows: &[Value], limit: u32) -> Vec<Value> {
    let mut rows = rows.to_vec();
    rows.sort_by(|a, b| {
        let a = a.get("created_at").and_then(Value::as_str).unwrap_or("");
        let b = b.get("created_at").and_then(Value::as_str).unwrap_or("");
        b.cmp(a)
    });
    rows.truncate(limit as usize);
    rows
}

#[async_trait]
impl RawTableSink for MockWarehouse {
    async fn insert_records(
        &self,
        table: &str,
        csv: &DecodedCsv,
    ) -> Result<InsertReceipt, WarehouseError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.insert_failure.lock().unwrap().clone() {
            return Err(err);
        }
        self.inserted
            .lock()
            .unwrap()
            .push((table.to_string(), csv.len()));
        let rows_confirmed = self
            .echo_rows
            .load(Ordering::SeqCst)
            .then_some(csv.len() as u64);
        Ok(InsertReceipt { rows_confirmed })
    }
}

#[async_trait]
impl ProcedureRunner for MockWarehouse {
    async fn call(&self, call: &ProcedureCall) -> Result<Value, WarehouseError> {
        self.procedure_calls.lock().unwrap().push(call.clone());

        if self
            .missing_procedures
            .lock()
            .unwrap()
            .contains(&call.procedure)
        {
            return Err(WarehouseError::ProcedureNotFound(call.procedure.clone()));
        }
        if let Some(message) = self.failing_procedures.lock().unwrap().get(&call.procedure) {
            return Err(WarehouseError::Database {
                code: Some("P0001".to_string()),
                message: message.clone(),
                details: None,
            });
        }

        Ok(self
            .procedure_results
            .lock()
            .unwrap()
            .get(&call.procedure)
            .cloned()
            .unwrap_or(Value::Null))
    }
}

#[async_trait]
impl AuditSource for MockWarehouse {
    async fn master_logs(
        &self,
        dataset_type: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Value>, WarehouseError> {
        self.audit_guard()?;
        let rows: Vec<Value> = self
            .master_logs
            .lock()
            .unwrap()
            .iter()
            .filter(|row| match dataset_type {
                Some(t) => row.get("dataset_type").and_then(Value::as_str) == Some(t),
                None => true,
            })
            .cloned()
            .collect();
        Ok(newest_first(&rows, limit))
    }

    async fn error_logs(&self, limit: u32) -> Result<Vec<Value>, WarehouseError> {
        self.audit_guard()?;
        Ok(newest_first(&self.error_logs.lock().unwrap(), limit))
    }

    async fn count_successful_loads(&self) -> Result<u64, WarehouseError> {
        self.audit_guard()?;
        Ok(self
            .master_logs
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.get("status").and_then(Value::as_str) == Some("SUCCESS"))
            .count() as u64)
    }

    async fn count_errors(&self) -> Result<u64, WarehouseError> {
        self.audit_guard()?;
        Ok(self.error_logs.lock().unwrap().len() as u64)
    }
}
