//! The HTTP surface: route table, grouped into a public router and a
//! bearer-gated protected router merged together, grounded in the
//! teacher's `build_router` split between the always-on health/metrics
//! routes and the conditionally-mounted agent-registration API.

mod auth;
mod containers;
mod engines;
mod events;
mod health;
mod ops;
mod provision;
mod streams;

use std::time::Duration;

use axum::http::{header, Method, StatusCode};
use axum::routing::{delete, get, post};
use axum::{middleware, Router};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::state::AppState;

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let cors = if config.enable_cors {
        if config.cors_origins.iter().any(|o| o == "*") {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        } else {
            let origins = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse::<axum::http::HeaderValue>().ok())
                .collect::<Vec<_>>();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        }
    } else {
        CorsLayer::new()
    };

    let request_timeout = Duration::from_secs(config.request_timeout_secs);

    let public = Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/metrics", get(health::metrics))
        .route("/engines", get(engines::list_engines))
        .route("/engines/{container_id}", get(engines::get_engine))
        .route("/streams", get(streams::list_streams))
        .route("/streams/{id}/stats", get(streams::stream_stats))
        .route("/containers/{container_id}", get(containers::inspect_container));

    let protected = Router::new()
        .route("/provision", post(provision::provision))
        .route("/provision/acestream", post(provision::provision_acestream))
        .route("/events/stream_started", post(events::stream_started))
        .route("/events/stream_ended", post(events::stream_ended))
        .route("/by-label", get(ops::by_label))
        .route("/containers/{container_id}", delete(containers::delete_container))
        .route("/gc", post(ops::gc))
        .route("/scale/{demand}", post(ops::scale))
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_bearer));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
                .layer(cors),
        )
        .with_state(state)
}
