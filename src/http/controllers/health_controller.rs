use crate::http::models::{HealthResponse, IndexResponse};
use axum::{http::StatusCode, Json};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Handler for GET /health
pub async fn health_handler() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            message: "Server is running",
        }),
    )
}

/// Handler for GET /
pub async fn index_handler(api_prefix: Arc<str>) -> Json<IndexResponse> {
    let endpoints = BTreeMap::from([
        ("health", "/health".to_string()),
        ("upload", format!("POST {}/upload", api_prefix)),
        ("process", format!("POST {}/process", api_prefix)),
        ("clean", format!("POST {}/process/clean", api_prefix)),
        ("load", format!("POST {}/process/load", api_prefix)),
        ("denormalize", format!("POST {}/process/denormalize", api_prefix)),
        ("auditLogs", format!("GET {}/audit/logs", api_prefix)),
        ("errors", format!("GET {}/audit/errors", api_prefix)),
        ("stats", format!("GET {}/audit/stats", api_prefix)),
    ]);

    Json(IndexResponse {
        message: "Airline ETL API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints,
    })
}
