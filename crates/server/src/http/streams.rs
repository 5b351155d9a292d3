//! `GET /streams` and `GET /streams/{id}/stats`.

use axum::extract::{Path, Query, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use orchestrator_core::model::{Stream, StreamStatSample, StreamStatus};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListStreamsQuery {
    pub status: Option<String>,
    pub container_id: Option<String>,
}

pub async fn list_streams(State(state): State<AppState>, Query(q): Query<ListStreamsQuery>) -> Result<Json<Vec<Stream>>, ApiError> {
    let status = match q.status.as_deref() {
        Some("started") => Some(StreamStatus::Started),
        Some("ended") => Some(StreamStatus::Ended),
        Some(other) => {
            return Err(ApiError::from(orchestrator_core::OrchestratorError::ValidationError(format!(
                "unknown status filter: {other}"
            ))))
        }
        None => None,
    };
    let streams = state.ctx.registry.list_streams(status, q.container_id.as_deref()).await;
    Ok(Json(streams))
}

#[derive(Debug, Deserialize)]
pub struct StreamStatsQuery {
    pub since: Option<DateTime<Utc>>,
}

pub async fn stream_stats(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    Query(q): Query<StreamStatsQuery>,
) -> Result<Json<Vec<StreamStatSample>>, ApiError> {
    let samples = match q.since {
        Some(since) => state.ctx.registry.stats_since(&stream_id, since).await?,
        None => state.ctx.registry.recent_stats(&stream_id).await,
    };
    Ok(Json(samples))
}
