//! `GET /health`, `GET /ready`, `GET /metrics` — ambient additions every
//! service the teacher ships exposes, grounded in the pack's admin-api
//! `health.rs` (liveness always ok; readiness probes the dependencies the
//! Boot Sequencer itself needs: the database and the container daemon).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let (label_key, label_value) = state.ctx.config.management_label();
    let docker_ok = state.ctx.runtime.list_by_label(&label_key, &label_value).await.is_ok();
    let db_ok = state.ctx.registry.db_ping().await;

    let ready = docker_ok && db_ok;
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(json!({
            "status": if ready { "ready" } else { "not_ready" },
            "db": db_ok,
            "docker": docker_ok,
        })),
    )
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics_handle.render()
}
