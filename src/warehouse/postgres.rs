use crate::audit::AuditConfig;
use crate::config::DatabaseConfig;
use crate::datasets::quote_identifier;
use crate::ingest::DecodedCsv;
use crate::procedures::ProcedureCall;
use crate::warehouse::{AuditSource, InsertReceipt, ProcedureRunner, RawTableSink, WarehouseError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use std::fmt::{self, Debug, Formatter};
use std::time::Duration;

/// Warehouse backed by a PostgreSQL database.
///
/// Raw tables, stored procedures and audit tables all live in the same
/// database; the service never creates or migrates any of them.
pub struct PostgresWarehouse {
    pool: PgPool,
    audit: AuditConfig,
}

impl PostgresWarehouse {
    pub async fn connect(config: &DatabaseConfig, audit: AuditConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .context("database.url must be set")?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(url)
            .await
            .context("Failed to connect to warehouse database")?;

        Ok(Self::from_pool(pool, audit))
    }

    fn from_pool(pool: PgPool, audit: AuditConfig) -> Self {
        Self { pool, audit }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Single-statement bulk insert that reports how many rows landed.
///
/// Rows travel as one JSONB array and are expanded server-side against the
/// table's row type, so PostgreSQL performs the text-to-column casts.
fn insert_sql(table: &str, columns: &[String]) -> String {
    let table = quote_identifier(table);
    let columns = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "WITH inserted AS (\
            INSERT INTO {table} ({columns}) \
            SELECT {columns} FROM jsonb_populate_recordset(NULL::{table}, $1) \
            RETURNING 1\
        ) SELECT COUNT(*) FROM inserted"
    )
}

fn procedure_sql(call: &ProcedureCall) -> String {
    let args = if call.dataset_type.is_some() {
        "dataset_type => $1"
    } else {
        ""
    };
    format!(
        "SELECT COALESCE(jsonb_agg(to_jsonb(r)), '[]'::jsonb) \
         FROM (SELECT * FROM {}({})) AS r",
        quote_identifier(&call.procedure),
        args
    )
}

fn recent_rows_sql(table: &str, filter_by_dataset: bool) -> String {
    if filter_by_dataset {
        format!(
            "SELECT to_jsonb(t) FROM {} AS t \
             WHERE t.dataset_type = $1 \
             ORDER BY t.created_at DESC LIMIT $2",
            quote_identifier(table)
        )
    } else {
        format!(
            "SELECT to_jsonb(t) FROM {} AS t \
             ORDER BY t.created_at DESC LIMIT $1",
            quote_identifier(table)
        )
    }
}

/// Collapse a one-row, one-column procedure result to its bare value, the way
/// a scalar function result is usually consumed.
fn unwrap_scalar(rows: Value) -> Value {
    match rows {
        Value::Array(mut rows) if rows.len() == 1 => match rows.pop() {
            Some(Value::Object(row)) if row.len() == 1 => {
                row.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null)
            }
            Some(row) => Value::Array(vec![row]),
            None => Value::Null,
        },
        other => other,
    }
}

#[async_trait]
impl RawTableSink for PostgresWarehouse {
    async fn insert_records(
        &self,
        table: &str,
        csv: &DecodedCsv,
    ) -> Result<InsertReceipt, WarehouseError> {
        if csv.is_empty() {
            return Ok(InsertReceipt {
                rows_confirmed: Some(0),
            });
        }

        let sql = insert_sql(table, csv.headers());
        let inserted: i64 = sqlx::query_scalar(&sql)
            .bind(Json(csv.records()))
            .fetch_one(&self.pool)
            .await?;

        Ok(InsertReceipt {
            rows_confirmed: u64::try_from(inserted).ok(),
        })
    }
}

#[async_trait]
impl ProcedureRunner for PostgresWarehouse {
    async fn call(&self, call: &ProcedureCall) -> Result<Value, WarehouseError> {
        let sql = procedure_sql(call);
        let mut query = sqlx::query_scalar::<_, Value>(&sql);
        if let Some(dataset_type) = &call.dataset_type {
            query = query.bind(dataset_type);
        }
        let rows = query.fetch_one(&self.pool).await?;
        Ok(unwrap_scalar(rows))
    }
}

#[async_trait]
impl AuditSource for PostgresWarehouse {
    async fn master_logs(
        &self,
        dataset_type: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Value>, WarehouseError> {
        let sql = recent_rows_sql(&self.audit.master_table, dataset_type.is_some());
        let mut query = sqlx::query_scalar::<_, Value>(&sql);
        if let Some(dataset_type) = dataset_type {
            query = query.bind(dataset_type);
        }
        Ok(query.bind(i64::from(limit)).fetch_all(&self.pool).await?)
    }

    async fn error_logs(&self, limit: u32) -> Result<Vec<Value>, WarehouseError> {
        let sql = recent_rows_sql(&self.audit.error_table, false);
        Ok(sqlx::query_scalar::<_, Value>(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_successful_loads(&self) -> Result<u64, WarehouseError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE status = $1",
            quote_identifier(&self.audit.master_table)
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(&self.audit.success_status)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn count_errors(&self) -> Result<u64, WarehouseError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}",
            quote_identifier(&self.audit.error_table)
        );
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }
}

impl Debug for PostgresWarehouse {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresWarehouse")
            .field("pool", &self.pool)
            .field("audit", &self.audit)
            .finish()
    }
}
