use crate::http::error::ApiError;
use crate::http::models::{UploadResponse, UploadedFile};
use crate::EtlEngine;
use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, State},
    Json,
};
use std::sync::Arc;

/// Multipart field that carries the CSV.
pub const FILE_FIELD: &str = "file";

/// Handler for POST /upload
#[tracing::instrument(
    name = "handler_upload_file",
    skip(engine, multipart),
    fields(
        etl.filename = tracing::field::Empty,
        etl.size_bytes = tracing::field::Empty,
        etl.target_table = tracing::field::Empty,
    )
)]
pub async fn upload_handler(
    State(engine): State<Arc<EtlEngine>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let (filename, content) = read_file_field(&mut multipart)
        .await?
        .ok_or_else(|| ApiError::bad_request("No file uploaded"))?;

    tracing::Span::current()
        .record("etl.filename", filename.as_str())
        .record("etl.size_bytes", content.len());

    let report = engine.ingest_upload(&filename, content).await?;

    let message = match &report.target_table {
        Some(table) => {
            tracing::Span::current().record("etl.target_table", table.as_str());
            format!(
                "Successfully uploaded and inserted {} rows into {}",
                report.rows_inserted, table
            )
        }
        None => "File uploaded but CSV was empty.".to_string(),
    };

    Ok(Json(UploadResponse {
        success: true,
        message,
        file: UploadedFile {
            name: filename,
            target_table: report.target_table,
        },
        rows_inserted: report.rows_inserted,
        rows_dropped: report.rows_dropped,
        backup_path: report.backup_path,
        backup_warning: report.backup_warning.map(|w| w.to_string()),
    }))
}

/// Name and bytes of the first `file` field, if any.
async fn read_file_field(multipart: &mut Multipart) -> Result<Option<(String, Bytes)>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload.csv").to_string();
        let content = field.bytes().await.map_err(multipart_error)?;
        return Ok(Some((filename, content)));
    }
    Ok(None)
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::new(err.status(), err.body_text())
}
