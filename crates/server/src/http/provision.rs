//! `POST /provision` and `POST /provision/acestream`.

use std::collections::HashMap;

use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    pub image: String,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub ports: HashMap<String, u16>,
}

#[derive(Debug, Serialize)]
pub struct ProvisionResponse {
    pub container_id: String,
}

pub async fn provision(State(state): State<AppState>, Json(req): Json<ProvisionRequest>) -> Result<Json<ProvisionResponse>, ApiError> {
    // A single port binding has an obvious engine key; with zero or several,
    // there's no canonical one to key on, so `provision_generic` falls back
    // to keying on the container id instead.
    let host_port = if req.ports.len() == 1 { req.ports.values().copied().next() } else { None };
    let container_id = state
        .ctx
        .provisioner
        .provision_generic(&req.image, req.env, req.labels, req.ports, Vec::new(), host_port)
        .await?;
    metrics::record_provision("generic");
    Ok(Json(ProvisionResponse { container_id }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProvisionAcestreamRequest {
    pub image: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub env: Vec<String>,
    pub host_port: Option<u16>,
}

#[derive(Debug, Serialize)]
pub struct ProvisionAcestreamResponse {
    pub container_id: String,
    pub host_http_port: u16,
    pub container_http_port: u16,
    pub container_https_port: u16,
}

pub async fn provision_acestream(
    State(state): State<AppState>,
    Json(req): Json<ProvisionAcestreamRequest>,
) -> Result<Json<ProvisionAcestreamResponse>, ApiError> {
    let result = state
        .ctx
        .provisioner
        .provision_acestream(req.image.as_deref(), req.labels, req.env, req.host_port)
        .await?;
    metrics::record_provision("acestream");
    Ok(Json(ProvisionAcestreamResponse {
        container_id: result.container_id,
        host_http_port: result.host_http_port,
        container_http_port: result.container_http_port,
        container_https_port: result.container_https_port,
    }))
}
