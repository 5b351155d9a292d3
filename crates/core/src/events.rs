//! Event Ingestor — idempotent handlers for `stream_started` /
//! `stream_ended`, with optional auto-delete on bounded retry.
//!
//! Per-`stream_id` ordering falls out of routing every mutation through
//! the registry's single write lock; the auto-delete retry schedule is
//! a detached task so the event handler itself returns immediately,
//! grounded in the same "background task, logs at each threshold" shape
//! used for periodic background sync elsewhere in this codebase.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::model::{Engine, KeyType, Stream, StreamStatus};
use crate::registry::Registry;
use crate::runtime::RuntimeAdapter;

const AUTO_DELETE_BACKOFF: [Duration; 3] = [Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(3)];

#[derive(Debug, Deserialize)]
pub struct StreamStartedEngine {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct StreamStartedStream {
    pub key_type: String,
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct StreamStartedSession {
    pub playback_session_id: String,
    pub stat_url: String,
    pub command_url: String,
    #[serde(default)]
    pub is_live: bool,
}

#[derive(Debug, Deserialize)]
pub struct StreamStartedEvent {
    pub engine: StreamStartedEngine,
    pub stream: StreamStartedStream,
    pub session: StreamStartedSession,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct StreamEndedEvent {
    pub container_id: Option<String>,
    pub stream_id: Option<String>,
    pub host: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StreamEndedResult {
    pub updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<Stream>,
}

pub struct EventIngestor {
    registry: Arc<Registry>,
    runtime: Arc<dyn RuntimeAdapter>,
    config: Config,
}

impl EventIngestor {
    pub fn new(registry: Arc<Registry>, runtime: Arc<dyn RuntimeAdapter>, config: Config) -> Self {
        Self { registry, runtime, config }
    }

    pub async fn on_stream_started(&self, evt: StreamStartedEvent) -> OrchestratorResult<Stream> {
        if evt.engine.host.is_empty() {
            return Err(OrchestratorError::ValidationError("engine.host is required".into()));
        }
        if evt.engine.port == 0 {
            return Err(OrchestratorError::ValidationError("engine.port is required".into()));
        }
        let key_type = KeyType::parse(&evt.stream.key_type)
            .ok_or_else(|| OrchestratorError::ValidationError(format!("unknown stream.key_type: {}", evt.stream.key_type)))?;
        if evt.stream.key.is_empty() {
            return Err(OrchestratorError::ValidationError("stream.key is required".into()));
        }
        if evt.session.playback_session_id.is_empty() {
            return Err(OrchestratorError::ValidationError("session.playback_session_id is required".into()));
        }
        if evt.session.stat_url.is_empty() {
            return Err(OrchestratorError::ValidationError("session.stat_url is required".into()));
        }
        if evt.session.command_url.is_empty() {
            return Err(OrchestratorError::ValidationError("session.command_url is required".into()));
        }

        let engine_key = Engine::key_for(&evt.engine.host, evt.engine.port);
        let now = Utc::now();

        match self.registry.get_engine(&engine_key).await {
            Some(mut existing) => {
                existing.last_seen = now;
                existing.labels.extend(evt.labels.clone());
                self.registry.upsert_engine(existing).await?;
            }
            None => {
                let engine = Engine {
                    engine_key: engine_key.clone(),
                    container_id: String::new(),
                    host: evt.engine.host.clone(),
                    port: evt.engine.port,
                    labels: evt.labels.clone(),
                    first_seen: now,
                    last_seen: now,
                };
                self.registry.upsert_engine(engine).await?;
            }
        }

        let stream_id = evt
            .labels
            .get("stream_id")
            .cloned()
            .unwrap_or_else(|| format!("{}|{}", evt.stream.key, evt.session.playback_session_id));

        let started_at = match self.registry.get_stream(&stream_id).await {
            Some(existing) if existing.status == StreamStatus::Started => existing.started_at,
            _ => now,
        };

        let stream = Stream {
            id: stream_id,
            engine_key,
            key_type,
            key: evt.stream.key,
            playback_session_id: evt.session.playback_session_id,
            stat_url: evt.session.stat_url,
            command_url: evt.session.command_url,
            is_live: evt.session.is_live,
            started_at,
            ended_at: None,
            status: StreamStatus::Started,
        };

        self.registry.upsert_stream(stream).await
    }

    pub async fn on_stream_ended(&self, evt: StreamEndedEvent) -> OrchestratorResult<StreamEndedResult> {
        let resolved = self.resolve_stream(&evt).await;
        let Some(stream) = resolved else {
            return Ok(StreamEndedResult { updated: false, stream: None });
        };

        if stream.status == StreamStatus::Ended {
            return Ok(StreamEndedResult { updated: false, stream: Some(stream) });
        }

        let now = Utc::now();
        let ended = Stream { ended_at: Some(now), status: StreamStatus::Ended, ..stream };
        let committed = self.registry.upsert_stream(ended).await?;

        if self.config.auto_delete {
            let remaining = self
                .registry
                .streams_for_engine(&committed.engine_key)
                .await
                .into_iter()
                .filter(|s| s.status == StreamStatus::Started)
                .count();

            if remaining == 0 {
                if let Some(engine) = self.registry.get_engine(&committed.engine_key).await {
                    self.spawn_auto_delete(engine.container_id, engine.engine_key);
                }
            }
        }

        Ok(StreamEndedResult { updated: true, stream: Some(committed) })
    }

    async fn resolve_stream(&self, evt: &StreamEndedEvent) -> Option<Stream> {
        if let Some(stream_id) = &evt.stream_id {
            if let Some(stream) = self.registry.get_stream(stream_id).await {
                return Some(stream);
            }
        }

        if let Some(container_id) = &evt.container_id {
            if let Some(engine) = self.registry.get_engine_by_container_id(container_id).await {
                if let Some(stream) = self
                    .registry
                    .streams_for_engine(&engine.engine_key)
                    .await
                    .into_iter()
                    .find(|s| s.status == StreamStatus::Started)
                {
                    return Some(stream);
                }
            }
        }

        if let Some(port) = evt.host.as_ref().and_then(|h| extract_port(h)) {
            let engine_key = Engine::key_for(&self.config.advertised_host, port);
            if let Some(engine) = self.registry.get_engine(&engine_key).await {
                return self
                    .registry
                    .streams_for_engine(&engine.engine_key)
                    .await
                    .into_iter()
                    .find(|s| s.status == StreamStatus::Started);
            }
        }

        None
    }

    fn spawn_auto_delete(&self, container_id: String, engine_key: String) {
        let runtime = self.runtime.clone();
        let registry = self.registry.clone();
        tokio::spawn(async move {
            for (attempt, delay) in AUTO_DELETE_BACKOFF.iter().enumerate() {
                tokio::time::sleep(*delay).await;
                match runtime.remove(&container_id, true).await {
                    Ok(()) => {
                        if let Err(err) = registry.remove_engine(&engine_key).await {
                            error!(engine_key, error = %err, "auto-delete succeeded but failed to drop engine from registry");
                        } else {
                            info!(engine_key, container_id, attempt, "auto-delete removed idle engine");
                        }
                        return;
                    }
                    Err(err) => {
                        warn!(engine_key, container_id, attempt, error = %err, "auto-delete attempt failed");
                    }
                }
            }
            warn!(engine_key, container_id, "auto-delete exhausted retries, leaving engine for next GC cycle");
        });
    }
}

/// Parses a `host:port` string. The event's `host` field is documented
/// as derived from the engine's stat_url; we only need the port out of it.
fn extract_port(host_with_port: &str) -> Option<u16> {
    host_with_port.rsplit_once(':').and_then(|(_, port)| port.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::runtime::FakeRuntime;

    async fn ingestor(config: Config) -> (EventIngestor, Arc<Registry>, Arc<FakeRuntime>) {
        let db = Db::in_memory().await.unwrap();
        let registry = Arc::new(Registry::new(db, config.stats_history_max));
        let fake = Arc::new(FakeRuntime::new());
        let runtime: Arc<dyn RuntimeAdapter> = fake.clone();
        (EventIngestor::new(registry.clone(), runtime, config), registry, fake)
    }

    fn started_event(stream_id: Option<&str>) -> StreamStartedEvent {
        let mut labels = HashMap::new();
        if let Some(id) = stream_id {
            labels.insert("stream_id".to_string(), id.to_string());
        }
        StreamStartedEvent {
            engine: StreamStartedEngine { host: "localhost".into(), port: 19000 },
            stream: StreamStartedStream { key_type: "content_id".into(), key: "abc".into() },
            session: StreamStartedSession {
                playback_session_id: "sess1".into(),
                stat_url: "http://localhost:40000/stat".into(),
                command_url: "http://localhost:40000/cmd".into(),
                is_live: false,
            },
            labels,
        }
    }

    #[tokio::test]
    async fn stream_started_creates_engine_and_stream() {
        let (ing, registry, _fake) = ingestor(Config::default()).await;
        let stream = ing.on_stream_started(started_event(Some("S"))).await.unwrap();
        assert_eq!(stream.id, "S");
        assert_eq!(stream.status, StreamStatus::Started);
        assert!(registry.get_engine("localhost:19000").await.is_some());
    }

    #[tokio::test]
    async fn repeated_start_is_idempotent_on_started_at() {
        let (ing, _registry, _fake) = ingestor(Config::default()).await;
        let first = ing.on_stream_started(started_event(Some("S"))).await.unwrap();
        let second = ing.on_stream_started(started_event(Some("S"))).await.unwrap();
        assert_eq!(first.started_at, second.started_at);
    }

    #[tokio::test]
    async fn stream_ended_then_started_reopens_record() {
        let (ing, _registry, _fake) = ingestor(Config::default()).await;
        ing.on_stream_started(started_event(Some("S"))).await.unwrap();
        let end = ing.on_stream_ended(StreamEndedEvent { container_id: None, stream_id: Some("S".into()), host: None, reason: None }).await.unwrap();
        assert!(end.updated);

        let reopened = ing.on_stream_started(started_event(Some("S"))).await.unwrap();
        assert_eq!(reopened.status, StreamStatus::Started);
        assert!(reopened.ended_at.is_none());
    }

    #[tokio::test]
    async fn ending_unknown_stream_reports_not_updated() {
        let (ing, _registry, _fake) = ingestor(Config::default()).await;
        let result = ing
            .on_stream_ended(StreamEndedEvent { container_id: None, stream_id: Some("nope".into()), host: None, reason: None })
            .await
            .unwrap();
        assert!(!result.updated);
    }

    #[tokio::test]
    async fn ending_already_ended_stream_is_a_no_op() {
        let (ing, _registry, _fake) = ingestor(Config::default()).await;
        ing.on_stream_started(started_event(Some("S"))).await.unwrap();
        let first = ing
            .on_stream_ended(StreamEndedEvent { container_id: None, stream_id: Some("S".into()), host: None, reason: None })
            .await
            .unwrap();
        assert!(first.updated);
        let second = ing
            .on_stream_ended(StreamEndedEvent { container_id: None, stream_id: Some("S".into()), host: None, reason: None })
            .await
            .unwrap();
        assert!(!second.updated);
    }

    #[tokio::test]
    async fn rejects_unknown_key_type() {
        let (ing, _registry, _fake) = ingestor(Config::default()).await;
        let mut evt = started_event(Some("S"));
        evt.stream.key_type = "bogus".into();
        assert!(matches!(ing.on_stream_started(evt).await, Err(OrchestratorError::ValidationError(_))));
    }
}
