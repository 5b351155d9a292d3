//! Router-level integration tests, exercising the assembled axum app
//! with `tower::ServiceExt::oneshot` against a `FakeRuntime`-backed
//! context, the way the pack's admin-api drives its `create_test_router`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use orchestrator_core::config::{Config, PortRange};
use orchestrator_core::runtime::{FakeRuntime, RuntimeAdapter};
use orchestrator_core::OrchestratorContext;
use orchestrator_server::config::ServerConfig;
use orchestrator_server::state::AppState;
use orchestrator_server::{http, metrics};
use serde_json::{json, Value};
use tower::ServiceExt;

const API_KEY: &str = "test-api-key";

fn server_config() -> ServerConfig {
    ServerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        request_timeout_secs: 5,
        enable_cors: true,
        cors_origins: vec!["*".to_string()],
    }
}

async fn test_app() -> axum::Router {
    let config = Config {
        db_url: "sqlite::memory:".to_string(),
        port_range_host: PortRange { lo: 24000, hi: 24005 },
        ace_http_range: PortRange { lo: 44000, hi: 44005 },
        ace_https_range: PortRange { lo: 49000, hi: 49005 },
        api_key: Some(API_KEY.to_string()),
        ..Config::default()
    };
    let runtime: Arc<dyn RuntimeAdapter> = Arc::new(FakeRuntime::new());
    let ctx = Arc::new(OrchestratorContext::new(config, runtime).unwrap());
    ctx.boot().await.unwrap();
    let state = AppState { ctx, metrics_handle: metrics::test_handle() };
    http::build_router(state, &server_config())
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_public_and_always_ok() {
    let app = test_app().await;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn ready_reports_docker_and_db_health() {
    let app = test_app().await;
    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["db"], true);
    assert_eq!(body["docker"], true);
}

#[tokio::test]
async fn provision_without_bearer_token_is_rejected() {
    let app = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/provision/acestream")
                .header("content-type", "application/json")
                .body(Body::from(json!({}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn provision_with_bearer_token_creates_an_engine() {
    let app = test_app().await;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/provision/acestream")
                .header("authorization", format!("Bearer {API_KEY}"))
                .header("content-type", "application/json")
                .body(Body::from(json!({}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["container_id"].is_string());

    let list_response = app
        .oneshot(Request::builder().uri("/engines").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(list_response.status(), StatusCode::OK);
    let engines = json_body(list_response).await;
    assert_eq!(engines.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn stream_started_then_ended_round_trips_through_http() {
    let app = test_app().await;

    let provision_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/provision/acestream")
                .header("authorization", format!("Bearer {API_KEY}"))
                .header("content-type", "application/json")
                .body(Body::from(json!({}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let provisioned = json_body(provision_response).await;
    let host_port = provisioned["host_http_port"].as_u64().unwrap();

    let started_payload = json!({
        "engine": {"host": "localhost", "port": host_port},
        "stream": {"key_type": "content_id", "key": "abc"},
        "session": {
            "playback_session_id": "sess-1",
            "stat_url": "http://localhost/stat",
            "command_url": "http://localhost/cmd",
        },
        "labels": {"stream_id": "http-stream-1"},
    });
    let started_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/events/stream_started")
                .header("authorization", format!("Bearer {API_KEY}"))
                .header("content-type", "application/json")
                .body(Body::from(started_payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(started_response.status(), StatusCode::OK);

    let ended_payload = json!({"stream_id": "http-stream-1"});
    let ended_response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/events/stream_ended")
                .header("authorization", format!("Bearer {API_KEY}"))
                .header("content-type", "application/json")
                .body(Body::from(ended_payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(ended_response.status(), StatusCode::OK);
    let ended_body = json_body(ended_response).await;
    assert_eq!(ended_body["updated"], true);
}

#[tokio::test]
async fn unknown_stream_status_filter_is_a_validation_error() {
    let app = test_app().await;
    let response = app
        .oneshot(Request::builder().uri("/streams?status=bogus").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn scale_requires_authentication_but_then_provisions() {
    let app = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/scale/2")
                .header("authorization", format!("Bearer {API_KEY}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["target"], 2);
    assert_eq!(body["current"], 2);
}
