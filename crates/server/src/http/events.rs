//! `POST /events/stream_started` and `POST /events/stream_ended`.

use axum::extract::State;
use axum::response::Json;
use orchestrator_core::events::{StreamEndedEvent, StreamEndedResult, StreamStartedEvent};
use orchestrator_core::model::Stream;

use crate::error::ApiError;
use crate::metrics;
use crate::state::AppState;

pub async fn stream_started(State(state): State<AppState>, Json(evt): Json<StreamStartedEvent>) -> Result<Json<Stream>, ApiError> {
    let stream = state.ctx.ingestor.on_stream_started(evt).await?;
    metrics::record_event_started();
    metrics::set_streams_active(state.ctx.registry.started_streams().await.len() as u64);
    Ok(Json(stream))
}

pub async fn stream_ended(State(state): State<AppState>, Json(evt): Json<StreamEndedEvent>) -> Result<Json<StreamEndedResult>, ApiError> {
    let result = state.ctx.ingestor.on_stream_ended(evt).await?;
    if result.updated {
        metrics::record_event_ended();
        metrics::set_streams_active(state.ctx.registry.started_streams().await.len() as u64);
    }
    Ok(Json(result))
}
