use crate::audit::LimitError;
use crate::ingest::IngestError;
use crate::warehouse::WarehouseError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{Map, Value};

/// API error with HTTP status code.
///
/// Serialized as a flat object: `{"error": <message>, ...fields}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub fields: Map<String, Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            fields: Map::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// 500 for a failed warehouse read; the upstream message goes in `details`.
    pub fn upstream(context: impl Into<String>, err: &WarehouseError) -> Self {
        Self::internal_error(context).with_field("details", err.to_string())
    }

    /// Attach an extra top-level field to the response body.
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "Request failed");
        }

        let mut body = Map::with_capacity(self.fields.len() + 1);
        body.insert("error".to_string(), Value::String(self.message));
        body.extend(self.fields);

        (self.status, Json(Value::Object(body))).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Decode(e) => ApiError::bad_request(e.to_string()),
            IngestError::Classification(e) => {
                let allowed: Map<String, Value> = e
                    .allowed_schemas
                    .iter()
                    .map(|(table, columns)| (table.clone(), Value::from(columns.clone())))
                    .collect();
                ApiError::bad_request(e.to_string())
                    .with_field("detected_headers", e.detected_headers)
                    .with_field("allowed_schemas", Value::Object(allowed))
            }
            IngestError::Insert(e) => {
                let details = e.details.clone();
                ApiError::internal_error(e.to_string()).with_field("details", details)
            }
        }
    }
}

impl From<LimitError> for ApiError {
    fn from(err: LimitError) -> Self {
        ApiError::bad_request(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{ClassificationError, InsertError};

    #[test]
    fn test_classification_error_lists_headers_and_schemas() {
        let err = ApiError::from(IngestError::Classification(ClassificationError {
            detected_headers: vec!["Foo".to_string(), "Bar".to_string()],
            allowed_schemas: vec![
                ("raw_sales".to_string(), vec!["SaleKey".to_string()]),
                ("raw_airlines".to_string(), vec!["AirlineKey".to_string()]),
            ],
        }));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.fields["detected_headers"], serde_json::json!(["Foo", "Bar"]));
        assert_eq!(
            err.fields["allowed_schemas"],
            serde_json::json!({ "raw_sales": ["SaleKey"], "raw_airlines": ["AirlineKey"] })
        );
        let order: Vec<&String> = err.fields["allowed_schemas"]
            .as_object()
            .unwrap()
            .keys()
            .collect();
        assert_eq!(order, ["raw_sales", "raw_airlines"]);
    }

    #[test]
    fn test_insert_error_is_server_error_with_details() {
        let err = ApiError::from(IngestError::Insert(InsertError {
            table: "raw_sales".to_string(),
            message: "invalid input syntax for type numeric".to_string(),
            details: None,
        }));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.message,
            "Database insert failed: invalid input syntax for type numeric. Details: none"
        );
        assert_eq!(err.fields["details"], Value::Null);
    }
}
