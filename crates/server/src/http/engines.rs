//! `GET /engines` and `GET /engines/{container_id}`.

use axum::extract::{Path, State};
use axum::response::Json;
use orchestrator_core::model::{Engine, Stream};
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn list_engines(State(state): State<AppState>) -> Json<Vec<Engine>> {
    Json(state.ctx.registry.list_engines().await)
}

#[derive(Debug, Serialize)]
pub struct EngineDetail {
    pub engine: Engine,
    pub streams: Vec<Stream>,
}

pub async fn get_engine(State(state): State<AppState>, Path(container_id): Path<String>) -> Result<Json<EngineDetail>, ApiError> {
    let engine = state
        .ctx
        .registry
        .get_engine_by_container_id(&container_id)
        .await
        .ok_or_else(|| orchestrator_core::OrchestratorError::NotFound(format!("engine for container {container_id}")))?;
    let streams = state.ctx.registry.streams_for_engine(&engine.engine_key).await;
    Ok(Json(EngineDetail { engine, streams }))
}
