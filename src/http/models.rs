use crate::audit::AuditStats;
use crate::procedures::BatchOutcome;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Response body for GET /health
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// Response body for GET /
#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub message: String,
    pub version: String,
    pub endpoints: BTreeMap<&'static str, String>,
}

/// File metadata echoed back after an upload
#[derive(Debug, Serialize)]
pub struct UploadedFile {
    pub name: String,
    pub target_table: Option<String>,
}

/// Response body for POST /upload
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub file: UploadedFile,
    pub rows_inserted: u64,
    /// Malformed rows skipped while decoding.
    pub rows_dropped: usize,
    pub backup_path: Option<String>,
    pub backup_warning: Option<String>,
}

/// Response body for POST /process/clean and /process/load
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub success: bool,
    pub message: String,
    pub results: Vec<BatchOutcome>,
}

/// One successful master pipeline run
#[derive(Debug, Serialize)]
pub struct PipelineResult {
    #[serde(rename = "type")]
    pub dataset_type: String,
    pub data: Value,
}

/// Response body for POST /process
#[derive(Debug, Serialize)]
pub struct PipelineResponse {
    pub success: bool,
    pub message: String,
    pub results: Vec<PipelineResult>,
}

/// Response body for POST /process/denormalize
#[derive(Debug, Serialize)]
pub struct DenormalizeResponse {
    pub success: bool,
    pub message: String,
    pub data: Value,
}

/// Query parameters for GET /audit/logs
#[derive(Debug, Deserialize)]
pub struct AuditLogsParams {
    pub limit: Option<String>,
    pub dataset_type: Option<String>,
}

/// Query parameters for GET /audit/errors
#[derive(Debug, Deserialize)]
pub struct AuditErrorsParams {
    pub limit: Option<String>,
}

/// Response body for GET /audit/logs
#[derive(Debug, Serialize)]
pub struct AuditLogsResponse {
    pub success: bool,
    pub count: usize,
    pub logs: Vec<Value>,
}

/// Response body for GET /audit/errors
#[derive(Debug, Serialize)]
pub struct AuditErrorsResponse {
    pub success: bool,
    pub count: usize,
    pub errors: Vec<Value>,
}

/// Response body for GET /audit/stats
#[derive(Debug, Serialize)]
pub struct AuditStatsResponse {
    pub success: bool,
    pub stats: AuditStats,
}
