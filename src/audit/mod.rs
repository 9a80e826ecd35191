//! Read-only views over the warehouse audit tables.

use crate::warehouse::{bounded, AuditSource, WarehouseError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 1000;

/// Names of the audit tables and the status that marks a successful load.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AuditConfig {
    #[serde(default = "default_master_table")]
    pub master_table: String,
    #[serde(default = "default_error_table")]
    pub error_table: String,
    #[serde(default = "default_success_status")]
    pub success_status: String,
}

fn default_master_table() -> String {
    "AUDIT_MASTER".to_string()
}

fn default_error_table() -> String {
    "GARBAGE_LOGS".to_string()
}

fn default_success_status() -> String {
    "SUCCESS".to_string()
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            master_table: default_master_table(),
            error_table: default_error_table(),
            success_status: default_success_status(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LimitError {
    #[error("limit must be a positive integer, got '{0}'")]
    NotANumber(String),
    #[error("limit must be greater than zero")]
    NotPositive,
}

/// Parse the `limit` query parameter.
///
/// Missing means [`DEFAULT_LIMIT`]; values above [`MAX_LIMIT`] are clamped.
pub fn parse_limit(raw: Option<&str>) -> Result<u32, LimitError> {
    let Some(raw) = raw.map(str::trim) else {
        return Ok(DEFAULT_LIMIT);
    };
    if raw.is_empty() {
        return Ok(DEFAULT_LIMIT);
    }
    let value: i64 = raw
        .parse()
        .map_err(|_| LimitError::NotANumber(raw.to_string()))?;
    if value <= 0 {
        return Err(LimitError::NotPositive);
    }
    Ok(value.min(i64::from(MAX_LIMIT)) as u32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    pub successful_loads: u64,
    pub total_errors: u64,
}

#[derive(Debug, Clone)]
pub struct AuditReader {
    source: Arc<dyn AuditSource>,
    call_timeout: Duration,
}

impl AuditReader {
    pub fn new(source: Arc<dyn AuditSource>, call_timeout: Duration) -> Self {
        Self {
            source,
            call_timeout,
        }
    }

    /// Most recent master log rows, optionally for one dataset type.
    pub async fn recent_logs(
        &self,
        dataset_type: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Value>, WarehouseError> {
        bounded(
            self.call_timeout,
            "audit log read",
            self.source.master_logs(dataset_type, limit),
        )
        .await
    }

    pub async fn recent_errors(&self, limit: u32) -> Result<Vec<Value>, WarehouseError> {
        bounded(
            self.call_timeout,
            "error log read",
            self.source.error_logs(limit),
        )
        .await
    }

    /// Both counts are fetched concurrently; either failing fails the whole.
    pub async fn stats(&self) -> Result<AuditStats, WarehouseError> {
        let (successful_loads, total_errors) = futures::try_join!(
            bounded(
                self.call_timeout,
                "successful load count",
                self.source.count_successful_loads()
            ),
            bounded(
                self.call_timeout,
                "error count",
                self.source.count_errors()
            ),
        )?;
        Ok(AuditStats {
            successful_loads,
            total_errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::MockWarehouse;
    use serde_json::json;

    fn reader(warehouse: &Arc<MockWarehouse>) -> AuditReader {
        AuditReader::new(warehouse.clone(), Duration::from_secs(5))
    }

    fn seeded() -> Arc<MockWarehouse> {
        let warehouse = Arc::new(MockWarehouse::new());
        warehouse.push_master_log(json!({
            "dataset_type": "sales", "status": "SUCCESS", "created_at": "2024-03-01T10:00:00Z"
        }));
        warehouse.push_master_log(json!({
            "dataset_type": "flights", "status": "FAILED", "created_at": "2024-03-02T10:00:00Z"
        }));
        warehouse.push_master_log(json!({
            "dataset_type": "sales", "status": "SUCCESS", "created_at": "2024-03-03T10:00:00Z"
        }));
        warehouse.push_error_log(json!({ "reason": "bad price", "created_at": "2024-03-01T11:00:00Z" }));
        warehouse
    }

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(None), Ok(50));
        assert_eq!(parse_limit(Some("")), Ok(50));
        assert_eq!(parse_limit(Some("20")), Ok(20));
        assert_eq!(parse_limit(Some("5000")), Ok(1000));
        assert_eq!(parse_limit(Some("0")), Err(LimitError::NotPositive));
        assert_eq!(parse_limit(Some("-3")), Err(LimitError::NotPositive));
        assert_eq!(
            parse_limit(Some("ten")),
            Err(LimitError::NotANumber("ten".to_string()))
        );
    }

    #[tokio::test]
    async fn test_recent_logs_newest_first_and_filtered() {
        let warehouse = seeded();
        let rows = reader(&warehouse).recent_logs(Some("sales"), 50).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["created_at"], "2024-03-03T10:00:00Z");

        let rows = reader(&warehouse).recent_logs(None, 1).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["dataset_type"], "sales");
    }

    #[tokio::test]
    async fn test_stats_counts_successes_and_errors() {
        let stats = reader(&seeded()).stats().await.unwrap();
        assert_eq!(
            stats,
            AuditStats {
                successful_loads: 2,
                total_errors: 1
            }
        );
        assert_eq!(
            serde_json::to_value(stats).unwrap(),
            json!({ "successful_loads": 2, "total_errors": 1 })
        );
    }

    #[tokio::test]
    async fn test_stats_propagates_failure() {
        let warehouse = seeded();
        warehouse.set_fail_audit(true);
        assert!(reader(&warehouse).stats().await.is_err());
        assert!(reader(&warehouse).recent_errors(10).await.is_err());
    }
}
