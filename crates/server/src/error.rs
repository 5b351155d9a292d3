//! HTTP-facing error wrapper — the kind-to-status mapping axum's analogue
//! of the teacher's `ApiError::extend`/`map_docker_error`: internal-detail
//! variants are logged in full server-side and sanitized for the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use orchestrator_core::OrchestratorError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub OrchestratorError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            OrchestratorError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            OrchestratorError::AuthError => (StatusCode::UNAUTHORIZED, "missing or invalid bearer token".to_string()),
            OrchestratorError::PortExhausted(range) => {
                (StatusCode::SERVICE_UNAVAILABLE, format!("no free ports in range {range}"))
            }
            OrchestratorError::RuntimeTransient(detail) => {
                tracing::warn!(error = %detail, "transient runtime error");
                (StatusCode::SERVICE_UNAVAILABLE, "container runtime is temporarily unavailable".to_string())
            }
            OrchestratorError::RuntimeFatal(detail) => {
                tracing::error!(error = %detail, "fatal runtime error");
                (StatusCode::INTERNAL_SERVER_ERROR, "an internal error occurred".to_string())
            }
            OrchestratorError::StartupTimeout(secs) => {
                (StatusCode::GATEWAY_TIMEOUT, format!("container did not reach running state within {secs}s"))
            }
            OrchestratorError::StartupFailed(detail) => {
                tracing::error!(error = %detail, "container exited before reaching running state");
                (StatusCode::INTERNAL_SERVER_ERROR, "container failed to start".to_string())
            }
            OrchestratorError::NotFound(what) => (StatusCode::NOT_FOUND, format!("not found: {what}")),
            OrchestratorError::PersistenceError(detail) => {
                tracing::error!(error = %detail, "persistence error");
                (StatusCode::INTERNAL_SERVER_ERROR, "an internal error occurred".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
