//! Bearer-token gate for protected routes, grounded in the teacher's
//! layered `ServiceBuilder` construction (a middleware applied to one
//! route group, not the whole router) rather than the JWT extractor the
//! pack's admin-api uses — this system has a single static `API_KEY`,
//! not per-user sessions.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use orchestrator_core::OrchestratorError;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn require_bearer(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, ApiError> {
    let expected = state.ctx.config.api_key.as_deref().ok_or(OrchestratorError::AuthError)?;

    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected => Ok(next.run(req).await),
        _ => Err(ApiError::from(OrchestratorError::AuthError)),
    }
}
