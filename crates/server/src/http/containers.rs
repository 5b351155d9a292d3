//! `GET /containers/{container_id}` and `DELETE /containers/{container_id}`.

use axum::extract::{Path, State};
use axum::response::Json;
use orchestrator_core::runtime::RuntimeState;
use orchestrator_core::OrchestratorError;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn inspect_container(State(state): State<AppState>, Path(container_id): Path<String>) -> Result<Json<RuntimeState>, ApiError> {
    let state_info = state.ctx.runtime.inspect(&container_id).await.map_err(OrchestratorError::from)?;
    Ok(Json(state_info))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

pub async fn delete_container(State(state): State<AppState>, Path(container_id): Path<String>) -> Result<Json<DeleteResponse>, ApiError> {
    state.ctx.runtime.remove(&container_id, true).await.map_err(OrchestratorError::from)?;
    if let Some(engine) = state.ctx.registry.get_engine_by_container_id(&container_id).await {
        state.ctx.registry.remove_engine(&engine.engine_key).await?;
    }
    Ok(Json(DeleteResponse { deleted: true }))
}
