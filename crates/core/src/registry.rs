//! State Registry — in-memory index of live engines and their streams.
//!
//! Grounded in the teacher's `AgentState`/`DashMap` inventory pattern,
//! but widened to a single `tokio::sync::RwLock`-guarded struct: the
//! cross-table invariants here (engine<->stream secondary indices, the
//! one-way `ended` transition) need atomicity a sharded map can't give
//! across keys, so one write lock covers all four maps. Every mutation
//! is mirrored to Persistence inside the guard (§5 "compute, release,
//! I/O, re-acquire to commit" is honored by callers: the guard is only
//! ever held across the in-memory update plus the Persistence write
//! that immediately follows it, never across daemon or network I/O).

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use tokio::sync::RwLock;

use crate::db::Db;
use crate::error::OrchestratorError;
use crate::model::{Engine, Stream, StreamStatSample, StreamStatus};

#[derive(Default)]
struct RegistryInner {
    engines: HashMap<String, Engine>,
    container_id_to_engine_key: HashMap<String, String>,
    streams: HashMap<String, Stream>,
    engine_to_stream_ids: HashMap<String, HashSet<String>>,
    stats: HashMap<String, VecDeque<StreamStatSample>>,
}

pub struct Registry {
    inner: RwLock<RegistryInner>,
    db: Db,
    stats_history_max: usize,
}

impl Registry {
    pub fn new(db: Db, stats_history_max: usize) -> Self {
        Self { inner: RwLock::new(RegistryInner::default()), db, stats_history_max }
    }

    /// Create tables/indexes if absent. The first real I/O against the
    /// lazily-opened pool; called once by the Boot Sequencer before
    /// `rehydrate`.
    pub async fn create_schema(&self) -> Result<(), OrchestratorError> {
        self.db.create_schema().await
    }

    /// Load engines and non-ended streams from Persistence, as the Boot
    /// Sequencer does on startup.
    pub async fn rehydrate(&self) -> Result<(), OrchestratorError> {
        let engines = self.db.load_engines().await?;
        let streams = self.db.load_non_ended_streams().await?;

        let mut inner = self.inner.write().await;
        for engine in engines {
            inner.container_id_to_engine_key.insert(engine.container_id.clone(), engine.engine_key.clone());
            inner.engines.insert(engine.engine_key.clone(), engine);
        }
        for stream in streams {
            inner
                .engine_to_stream_ids
                .entry(stream.engine_key.clone())
                .or_default()
                .insert(stream.id.clone());
            inner.streams.insert(stream.id.clone(), stream);
        }
        Ok(())
    }

    pub async fn get_engine(&self, engine_key: &str) -> Option<Engine> {
        self.inner.read().await.engines.get(engine_key).cloned()
    }

    pub async fn get_engine_by_container_id(&self, container_id: &str) -> Option<Engine> {
        let inner = self.inner.read().await;
        let key = inner.container_id_to_engine_key.get(container_id)?;
        inner.engines.get(key).cloned()
    }

    pub async fn list_engines(&self) -> Vec<Engine> {
        self.inner.read().await.engines.values().cloned().collect()
    }

    pub async fn engine_count(&self) -> usize {
        self.inner.read().await.engines.len()
    }

    /// Cheap connectivity probe for the `/ready` route.
    pub async fn db_ping(&self) -> bool {
        self.db.ping().await
    }

    /// Insert or refresh an engine's `last_seen`/labels. Used by the Event
    /// Ingestor (new/returning engine) and by reindex-on-boot.
    pub async fn upsert_engine(&self, mut engine: Engine) -> Result<Engine, OrchestratorError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.engines.get(&engine.engine_key) {
            engine.first_seen = existing.first_seen;
            let mut merged_labels = existing.labels.clone();
            merged_labels.extend(engine.labels.clone());
            engine.labels = merged_labels;
        }
        self.db.upsert_engine(&engine).await.map_err(|_| {
            OrchestratorError::PersistenceError(format!("failed to persist engine {}", engine.engine_key))
        })?;
        inner.container_id_to_engine_key.insert(engine.container_id.clone(), engine.engine_key.clone());
        inner.engines.insert(engine.engine_key.clone(), engine.clone());
        Ok(engine)
    }

    pub async fn remove_engine(&self, engine_key: &str) -> Result<(), OrchestratorError> {
        let mut inner = self.inner.write().await;
        self.db.delete_engine(engine_key).await?;
        if let Some(engine) = inner.engines.remove(engine_key) {
            inner.container_id_to_engine_key.remove(&engine.container_id);
        }
        if let Some(stream_ids) = inner.engine_to_stream_ids.remove(engine_key) {
            for id in stream_ids {
                inner.streams.remove(&id);
                inner.stats.remove(&id);
            }
        }
        Ok(())
    }

    pub async fn get_stream(&self, stream_id: &str) -> Option<Stream> {
        self.inner.read().await.streams.get(stream_id).cloned()
    }

    pub async fn list_streams(&self, status: Option<StreamStatus>, container_id: Option<&str>) -> Vec<Stream> {
        let inner = self.inner.read().await;
        let engine_key = match container_id {
            Some(cid) => inner.container_id_to_engine_key.get(cid).cloned(),
            None => None,
        };
        inner
            .streams
            .values()
            .filter(|s| status.map(|st| s.status == st).unwrap_or(true))
            .filter(|s| engine_key.as_ref().map(|k| &s.engine_key == k).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub async fn streams_for_engine(&self, engine_key: &str) -> Vec<Stream> {
        let inner = self.inner.read().await;
        inner
            .engine_to_stream_ids
            .get(engine_key)
            .map(|ids| ids.iter().filter_map(|id| inner.streams.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    pub async fn started_streams(&self) -> Vec<Stream> {
        self.inner
            .read()
            .await
            .streams
            .values()
            .filter(|s| s.status == StreamStatus::Started)
            .cloned()
            .collect()
    }

    /// Upsert a stream record as given. The one-way `started` -> `ended`
    /// transition (and the explicit re-open path) is decided by the Event
    /// Ingestor before calling this; the registry just commits it.
    pub async fn upsert_stream(&self, stream: Stream) -> Result<Stream, OrchestratorError> {
        let mut inner = self.inner.write().await;
        self.db.upsert_stream(&stream).await?;
        inner
            .engine_to_stream_ids
            .entry(stream.engine_key.clone())
            .or_default()
            .insert(stream.id.clone());
        inner.streams.insert(stream.id.clone(), stream.clone());
        Ok(stream)
    }

    /// Append a stats sample to the bounded in-memory ring and persist it.
    pub async fn record_stat_sample(&self, sample: StreamStatSample) -> Result<(), OrchestratorError> {
        self.db.insert_stat_sample(&sample).await?;
        let mut inner = self.inner.write().await;
        let ring = inner.stats.entry(sample.stream_id.clone()).or_default();
        ring.push_back(sample);
        while ring.len() > self.stats_history_max {
            ring.pop_front();
        }
        Ok(())
    }

    pub async fn recent_stats(&self, stream_id: &str) -> Vec<StreamStatSample> {
        self.inner
            .read()
            .await
            .stats
            .get(stream_id)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn stats_since(&self, stream_id: &str, since: chrono::DateTime<Utc>) -> Result<Vec<StreamStatSample>, OrchestratorError> {
        self.db.load_stats_since(stream_id, Some(since)).await
    }
}
