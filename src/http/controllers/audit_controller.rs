use crate::audit::parse_limit;
use crate::http::error::ApiError;
use crate::http::models::{
    AuditErrorsParams, AuditErrorsResponse, AuditLogsParams, AuditLogsResponse,
    AuditStatsResponse,
};
use crate::EtlEngine;
use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

/// Handler for GET /audit/logs
#[tracing::instrument(
    name = "handler_audit_logs",
    skip(engine, params),
    fields(etl.dataset_type = tracing::field::Empty)
)]
pub async fn logs_handler(
    State(engine): State<Arc<EtlEngine>>,
    Query(params): Query<AuditLogsParams>,
) -> Result<Json<AuditLogsResponse>, ApiError> {
    let limit = parse_limit(params.limit.as_deref())?;
    let dataset_type = params.dataset_type.as_deref().filter(|t| !t.is_empty());
    if let Some(dataset_type) = dataset_type {
        tracing::Span::current().record("etl.dataset_type", dataset_type);
    }

    let logs = engine
        .recent_logs(dataset_type, limit)
        .await
        .map_err(|e| ApiError::upstream("Failed to fetch audit logs", &e))?;

    Ok(Json(AuditLogsResponse {
        success: true,
        count: logs.len(),
        logs,
    }))
}

/// Handler for GET /audit/errors
#[tracing::instrument(name = "handler_audit_errors", skip(engine, params))]
pub async fn errors_handler(
    State(engine): State<Arc<EtlEngine>>,
    Query(params): Query<AuditErrorsParams>,
) -> Result<Json<AuditErrorsResponse>, ApiError> {
    let limit = parse_limit(params.limit.as_deref())?;

    let errors = engine
        .recent_errors(limit)
        .await
        .map_err(|e| ApiError::upstream("Failed to fetch error logs", &e))?;

    Ok(Json(AuditErrorsResponse {
        success: true,
        count: errors.len(),
        errors,
    }))
}

/// Handler for GET /audit/stats
#[tracing::instrument(name = "handler_audit_stats", skip(engine))]
pub async fn stats_handler(
    State(engine): State<Arc<EtlEngine>>,
) -> Result<Json<AuditStatsResponse>, ApiError> {
    let stats = engine
        .audit_stats()
        .await
        .map_err(|e| ApiError::upstream("Failed to fetch stats", &e))?;

    Ok(Json(AuditStatsResponse {
        success: true,
        stats,
    }))
}
