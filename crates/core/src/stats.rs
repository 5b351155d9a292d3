//! Stats Collector — periodic, bounded-concurrency poll of every
//! started stream's `stat_url`, grounded directly in the teacher's
//! `background_inventory_sync` shape: a `tokio::time::interval` with
//! `MissedTickBehavior::Skip`, each round's fetches wrapped in
//! `tokio::time::timeout`, and a three-way `Ok(Ok)/Ok(Err)/Err(timeout)`
//! match. Response-to-sample parsing is a pure function tested the way
//! the teacher's `stats/map.rs` tests its pure conversion helpers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{watch, Semaphore};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::events::{EventIngestor, StreamEndedEvent};
use crate::model::{Stream, StreamStatSample};
use crate::registry::Registry;

const COLLECT_CONCURRENCY: usize = 16;
const UNHEALTHY_THRESHOLD: u32 = 3;

/// Raw JSON body an AceStream-compatible engine returns from its stat
/// endpoint.
#[derive(Debug, Deserialize)]
struct EngineStatResponse {
    peers: Option<i64>,
    speed_down: Option<i64>,
    speed_up: Option<i64>,
    downloaded: Option<i64>,
    uploaded: Option<i64>,
    status: Option<String>,
}

const TERMINAL_STATUSES: &[&str] = &["stopped", "finished", "idle", "error"];

/// Convert a parsed response body into a `StreamStatSample`, and decide
/// whether the engine considers this stream terminated.
fn map_response(stream_id: &str, ts: chrono::DateTime<chrono::Utc>, body: &EngineStatResponse) -> (StreamStatSample, bool) {
    let status = body.status.clone().unwrap_or_else(|| "unknown".to_string());
    let terminated = TERMINAL_STATUSES.contains(&status.as_str());
    let sample = StreamStatSample {
        stream_id: stream_id.to_string(),
        ts,
        peers: body.peers.unwrap_or(0),
        speed_down: body.speed_down.unwrap_or(0),
        speed_up: body.speed_up.unwrap_or(0),
        downloaded: body.downloaded.unwrap_or(0),
        uploaded: body.uploaded.unwrap_or(0),
        status,
    };
    (sample, terminated)
}

fn is_terminal_http_status(status: u16) -> bool {
    status == 404 || status == 410
}

pub struct StatsCollector {
    registry: Arc<Registry>,
    ingestor: Arc<EventIngestor>,
    http: reqwest::Client,
    interval_s: u64,
    failure_counts: std::sync::Mutex<HashMap<String, u32>>,
}

impl StatsCollector {
    pub fn new(registry: Arc<Registry>, ingestor: Arc<EventIngestor>, interval_s: u64) -> Self {
        Self {
            registry,
            ingestor,
            http: reqwest::Client::new(),
            interval_s,
            failure_counts: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Run the collector loop until `shutdown` fires. Finishes whatever
    /// round is in flight before returning.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(interval_s = self.interval_s, "starting stats collector");
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_s));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut round: u64 = 0;

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("stats collector received shutdown signal");
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }

            round += 1;
            self.run_once().await;
            if round % 30 == 0 {
                info!(round, "stats collector heartbeat");
            }
        }
    }

    async fn run_once(&self) {
        let streams = self.registry.started_streams().await;
        if streams.is_empty() {
            return;
        }

        let semaphore = Arc::new(Semaphore::new(COLLECT_CONCURRENCY));
        let mut handles = Vec::with_capacity(streams.len());

        for stream in streams {
            let permit = semaphore.clone();
            let http = self.http.clone();
            let timeout = Duration::from_secs(self.interval_s.min(10).max(1));
            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await.ok();
                fetch_one(&http, stream, timeout).await
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(outcome) => self.handle_outcome(outcome).await,
                Err(err) => warn!(error = %err, "stats collector task panicked"),
            }
        }
    }

    async fn handle_outcome(&self, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Sample { stream_id, engine_key, sample, terminated } => {
                self.reset_failures(&engine_key);
                if let Err(err) = self.registry.record_stat_sample(sample).await {
                    warn!(stream_id, error = %err, "failed to persist stats sample");
                }
                if terminated {
                    let evt = StreamEndedEvent {
                        container_id: None,
                        stream_id: Some(stream_id.clone()),
                        host: None,
                        reason: Some("collector_detected".to_string()),
                    };
                    if let Err(err) = self.ingestor.on_stream_ended(evt).await {
                        warn!(stream_id, error = %err, "failed to synthesize stream_ended after collector detected termination");
                    }
                }
            }
            FetchOutcome::Error { stream_id, engine_key, reason } => {
                let failures = self.bump_failures(&engine_key);
                warn!(stream_id, engine_key, failures, reason, "stats fetch failed");
                if failures == UNHEALTHY_THRESHOLD {
                    warn!(engine_key, "engine marked unhealthy after consecutive stats failures");
                }
            }
        }
    }

    fn bump_failures(&self, engine_key: &str) -> u32 {
        let mut counts = self.failure_counts.lock().unwrap();
        let entry = counts.entry(engine_key.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    fn reset_failures(&self, engine_key: &str) {
        self.failure_counts.lock().unwrap().remove(engine_key);
    }
}

enum FetchOutcome {
    Sample { stream_id: String, engine_key: String, sample: StreamStatSample, terminated: bool },
    Error { stream_id: String, engine_key: String, reason: String },
}

async fn fetch_one(client: &reqwest::Client, stream: Stream, timeout: Duration) -> FetchOutcome {
    let fetch = client.get(&stream.stat_url).send();
    match tokio::time::timeout(timeout, fetch).await {
        Ok(Ok(response)) => {
            let status = response.status();
            if is_terminal_http_status(status.as_u16()) {
                return FetchOutcome::Sample {
                    stream_id: stream.id.clone(),
                    engine_key: stream.engine_key.clone(),
                    sample: StreamStatSample {
                        stream_id: stream.id,
                        ts: chrono::Utc::now(),
                        peers: 0,
                        speed_down: 0,
                        speed_up: 0,
                        downloaded: 0,
                        uploaded: 0,
                        status: "gone".to_string(),
                    },
                    terminated: true,
                };
            }
            match response.json::<EngineStatResponse>().await {
                Ok(body) => {
                    let (sample, terminated) = map_response(&stream.id, chrono::Utc::now(), &body);
                    FetchOutcome::Sample { stream_id: stream.id, engine_key: stream.engine_key, sample, terminated }
                }
                Err(err) => FetchOutcome::Error { stream_id: stream.id, engine_key: stream.engine_key, reason: err.to_string() },
            }
        }
        Ok(Err(err)) => FetchOutcome::Error { stream_id: stream.id, engine_key: stream.engine_key, reason: err.to_string() },
        Err(_) => FetchOutcome::Error { stream_id: stream.id, engine_key: stream.engine_key, reason: "timed out".to_string() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_response_extracts_fields() {
        let body = EngineStatResponse {
            peers: Some(5),
            speed_down: Some(1000),
            speed_up: Some(200),
            downloaded: Some(50_000),
            uploaded: Some(1_000),
            status: Some("dl".to_string()),
        };
        let (sample, terminated) = map_response("s1", chrono::Utc::now(), &body);
        assert_eq!(sample.peers, 5);
        assert_eq!(sample.speed_down, 1000);
        assert!(!terminated);
    }

    #[test]
    fn map_response_detects_terminal_status() {
        let body = EngineStatResponse {
            peers: None,
            speed_down: None,
            speed_up: None,
            downloaded: None,
            uploaded: None,
            status: Some("stopped".to_string()),
        };
        let (_, terminated) = map_response("s1", chrono::Utc::now(), &body);
        assert!(terminated);
    }

    #[test]
    fn map_response_defaults_missing_fields_to_zero() {
        let body = EngineStatResponse { peers: None, speed_down: None, speed_up: None, downloaded: None, uploaded: None, status: None };
        let (sample, terminated) = map_response("s1", chrono::Utc::now(), &body);
        assert_eq!(sample.peers, 0);
        assert_eq!(sample.status, "unknown");
        assert!(!terminated);
    }

    #[test]
    fn terminal_http_statuses_are_recognized() {
        assert!(is_terminal_http_status(404));
        assert!(is_terminal_http_status(410));
        assert!(!is_terminal_http_status(200));
        assert!(!is_terminal_http_status(500));
    }
}
