//! End-to-end coverage of the boot -> provision -> event -> reclaim path
//! against `FakeRuntime` and an in-memory database, the way the teacher's
//! own crates exercise their assembled `AppState` rather than only the
//! individual components.

use std::collections::HashMap;
use std::sync::Arc;

use orchestrator_core::config::{Config, PortRange};
use orchestrator_core::error::OrchestratorError;
use orchestrator_core::events::{StreamEndedEvent, StreamStartedEngine, StreamStartedEvent, StreamStartedSession, StreamStartedStream};
use orchestrator_core::model::StreamStatus;
use orchestrator_core::runtime::{FakeRuntime, RuntimeAdapter};
use orchestrator_core::OrchestratorContext;

fn test_config() -> Config {
    Config {
        db_url: "sqlite::memory:".to_string(),
        port_range_host: PortRange { lo: 23000, hi: 23005 },
        ace_http_range: PortRange { lo: 43000, hi: 43005 },
        ace_https_range: PortRange { lo: 48000, hi: 48005 },
        startup_timeout_s: 5,
        ..Config::default()
    }
}

async fn context(config: Config) -> (Arc<OrchestratorContext>, Arc<FakeRuntime>) {
    let fake = Arc::new(FakeRuntime::new());
    let runtime: Arc<dyn RuntimeAdapter> = fake.clone();
    let ctx = Arc::new(OrchestratorContext::new(config, runtime).unwrap());
    (ctx, fake)
}

fn started_event(stream_id: &str, host: &str, port: u16) -> StreamStartedEvent {
    let mut labels = HashMap::new();
    labels.insert("stream_id".to_string(), stream_id.to_string());
    StreamStartedEvent {
        engine: StreamStartedEngine { host: host.to_string(), port },
        stream: StreamStartedStream { key_type: "content_id".into(), key: "movie-1".into() },
        session: StreamStartedSession {
            playback_session_id: "session-1".into(),
            stat_url: format!("http://{host}:{port}/stat"),
            command_url: format!("http://{host}:{port}/cmd"),
            is_live: false,
        },
        labels,
    }
}

#[tokio::test]
async fn happy_path_provision_start_end() {
    let (ctx, _fake) = context(test_config()).await;
    ctx.boot().await.unwrap();

    let result = ctx
        .provisioner
        .provision_acestream(None, HashMap::new(), vec![], None)
        .await
        .unwrap();
    assert_eq!(result.host_http_port, 23000);
    assert_eq!(ctx.registry.engine_count().await, 1);

    let stream = ctx
        .ingestor
        .on_stream_started(started_event("stream-1", &ctx.config.advertised_host, result.host_http_port))
        .await
        .unwrap();
    assert_eq!(stream.status, StreamStatus::Started);

    let ended = ctx
        .ingestor
        .on_stream_ended(StreamEndedEvent {
            container_id: None,
            stream_id: Some("stream-1".to_string()),
            host: None,
            reason: None,
        })
        .await
        .unwrap();
    assert!(ended.updated);
    assert_eq!(ended.stream.unwrap().status, StreamStatus::Ended);

    ctx.shutdown().await;
}

#[tokio::test]
async fn port_exhaustion_surfaces_as_orchestrator_error() {
    let mut config = test_config();
    config.port_range_host = PortRange { lo: 23100, hi: 23101 };
    let (ctx, _fake) = context(config).await;
    ctx.boot().await.unwrap();

    ctx.provisioner.provision_acestream(None, HashMap::new(), vec![], None).await.unwrap();
    ctx.provisioner.provision_acestream(None, HashMap::new(), vec![], None).await.unwrap();
    let third = ctx.provisioner.provision_acestream(None, HashMap::new(), vec![], None).await;
    assert!(matches!(third, Err(OrchestratorError::PortExhausted(_))));
    assert_eq!(ctx.registry.engine_count().await, 2);
}

#[tokio::test]
async fn ending_a_stream_twice_is_idempotent() {
    let (ctx, _fake) = context(test_config()).await;
    ctx.boot().await.unwrap();
    let result = ctx.provisioner.provision_acestream(None, HashMap::new(), vec![], None).await.unwrap();
    ctx.ingestor.on_stream_started(started_event("stream-1", &ctx.config.advertised_host, result.host_http_port)).await.unwrap();

    let end_evt = || StreamEndedEvent { container_id: None, stream_id: Some("stream-1".to_string()), host: None, reason: None };
    let first = ctx.ingestor.on_stream_ended(end_evt()).await.unwrap();
    assert!(first.updated);
    let second = ctx.ingestor.on_stream_ended(end_evt()).await.unwrap();
    assert!(!second.updated);
}

#[tokio::test]
async fn boot_reindexes_preexisting_managed_containers() {
    let fake = Arc::new(FakeRuntime::new());
    let mut labels = HashMap::new();
    labels.insert("ondemand.app".to_string(), "myservice".to_string());
    labels.insert("host.http_port".to_string(), "23200".to_string());
    labels.insert("acestream.http_port".to_string(), "43200".to_string());
    labels.insert("acestream.https_port".to_string(), "48200".to_string());
    fake.seed("preexisting-container", labels);

    let runtime: Arc<dyn RuntimeAdapter> = fake;
    let ctx = OrchestratorContext::new(test_config(), runtime).unwrap();
    ctx.boot().await.unwrap();

    assert_eq!(ctx.registry.engine_count().await, 1);
    let engines = ctx.registry.list_engines().await;
    assert_eq!(engines[0].container_id, "preexisting-container");

    ctx.shutdown().await;
}

#[tokio::test]
async fn scale_to_provisions_additional_engines_on_demand() {
    let (ctx, _fake) = context(test_config()).await;
    ctx.boot().await.unwrap();

    let (target, current) = ctx.autoscaler.scale_to(3).await.unwrap();
    assert_eq!(target, 3);
    assert_eq!(current, 3);
    assert_eq!(ctx.registry.engine_count().await, 3);
}
