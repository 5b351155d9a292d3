//! `GET /by-label`, `POST /gc`, `POST /scale/{demand}`.

use axum::extract::{Path, Query, State};
use axum::response::Json;
use orchestrator_core::runtime::ContainerSummary;
use orchestrator_core::OrchestratorError;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ByLabelQuery {
    pub key: String,
    pub value: String,
}

pub async fn by_label(State(state): State<AppState>, Query(q): Query<ByLabelQuery>) -> Result<Json<Vec<ContainerSummary>>, ApiError> {
    let containers = state.ctx.runtime.list_by_label(&q.key, &q.value).await.map_err(OrchestratorError::from)?;
    Ok(Json(containers))
}

#[derive(Debug, Serialize)]
pub struct GcResponse {
    pub reclaimed: u32,
}

/// Placeholder for inactivity-based reclamation driven by `IDLE_TTL_S`.
/// The policy (what counts as idle, what is removed) is left undecided,
/// so this returns a literal no-op rather than guessing at one.
pub async fn gc() -> Json<GcResponse> {
    Json(GcResponse { reclaimed: 0 })
}

#[derive(Debug, Serialize)]
pub struct ScaleResponse {
    pub target: u32,
    pub current: u32,
}

pub async fn scale(State(state): State<AppState>, Path(demand): Path<u32>) -> Result<Json<ScaleResponse>, ApiError> {
    let (target, current) = state.ctx.autoscaler.scale_to(demand).await?;
    Ok(Json(ScaleResponse { target, current }))
}
