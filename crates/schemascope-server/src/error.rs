//! Mapping from graph errors to HTTP responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use schemascope_core::GraphError;

/// Wrapper so handlers can `?` a `GraphError` into a response.
#[derive(Debug)]
pub struct ApiError(pub GraphError);

impl From<GraphError> for ApiError {
    fn from(error: GraphError) -> Self {
        ApiError(error)
    }
}

pub fn status_for(error: &GraphError) -> StatusCode {
    match error {
        GraphError::InvalidSource(_) | GraphError::InvalidMode(_) | GraphError::InvalidRequest(_) => {
            StatusCode::BAD_REQUEST
        }
        GraphError::SchemaNotFound { .. } => StatusCode::NOT_FOUND,
        GraphError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        GraphError::Connection { .. } | GraphError::Remote { .. } => StatusCode::BAD_GATEWAY,
        GraphError::SourceUnavailable(_) | GraphError::Cache(_) => StatusCode::SERVICE_UNAVAILABLE,
        GraphError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        GraphError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::warn!("Request failed with {}: {}", status, self.0);
        } else {
            tracing::debug!("Request rejected with {}: {}", status, self.0);
        }
        let body = json!({
            "error": {
                "code": self.0.code(),
                "message": self.0.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}
