use crate::http::error::ApiError;
use crate::http::models::{BatchResponse, DenormalizeResponse, PipelineResponse, PipelineResult};
use crate::procedures::{BatchAction, OutcomeStatus};
use crate::EtlEngine;
use axum::{extract::State, Json};
use std::sync::Arc;

/// Handler for POST /process/clean
#[tracing::instrument(name = "handler_process_clean", skip(engine))]
pub async fn clean_handler(State(engine): State<Arc<EtlEngine>>) -> Json<BatchResponse> {
    Json(BatchResponse {
        success: true,
        message: "Batch cleaning finished".to_string(),
        results: engine.run_batch(BatchAction::Clean).await,
    })
}

/// Handler for POST /process/load
#[tracing::instrument(name = "handler_process_load", skip(engine))]
pub async fn load_handler(State(engine): State<Arc<EtlEngine>>) -> Json<BatchResponse> {
    Json(BatchResponse {
        success: true,
        message: "Batch loading finished".to_string(),
        results: engine.run_batch(BatchAction::Load).await,
    })
}

/// Handler for POST /process/denormalize
#[tracing::instrument(name = "handler_process_denormalize", skip(engine))]
pub async fn denormalize_handler(
    State(engine): State<Arc<EtlEngine>>,
) -> Result<Json<DenormalizeResponse>, ApiError> {
    let data = engine
        .denormalize()
        .await
        .map_err(|e| ApiError::internal_error(e.to_string()).with_field("success", false))?;

    Ok(Json(DenormalizeResponse {
        success: true,
        message: "Denormalized table built successfully".to_string(),
        data,
    }))
}

/// Handler for POST /process
#[tracing::instrument(name = "handler_process_pipeline", skip(engine))]
pub async fn pipeline_handler(State(engine): State<Arc<EtlEngine>>) -> Json<PipelineResponse> {
    let results = engine
        .run_master_pipeline()
        .await
        .into_iter()
        .filter_map(|outcome| match outcome.status {
            OutcomeStatus::Success { data } => Some(PipelineResult {
                dataset_type: outcome.dataset_type,
                data,
            }),
            _ => None,
        })
        .collect();

    Json(PipelineResponse {
        success: true,
        message: "Master pipelines finished".to_string(),
        results,
    })
}
