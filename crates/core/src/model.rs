//! Domain types shared by the Registry, Persistence, and HTTP layers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Engine {
    pub engine_key: String,
    pub container_id: String,
    pub host: String,
    pub port: u16,
    pub labels: HashMap<String, String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Engine {
    pub fn key_for(host: &str, port: u16) -> String {
        format!("{host}:{port}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    ContentId,
    Infohash,
    Url,
    Magnet,
}

impl KeyType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "content_id" => Some(KeyType::ContentId),
            "infohash" => Some(KeyType::Infohash),
            "url" => Some(KeyType::Url),
            "magnet" => Some(KeyType::Magnet),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::ContentId => "content_id",
            KeyType::Infohash => "infohash",
            KeyType::Url => "url",
            KeyType::Magnet => "magnet",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Started,
    Ended,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamStatus::Started => "started",
            StreamStatus::Ended => "ended",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    pub id: String,
    pub engine_key: String,
    pub key_type: KeyType,
    pub key: String,
    pub playback_session_id: String,
    pub stat_url: String,
    pub command_url: String,
    pub is_live: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: StreamStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStatSample {
    pub stream_id: String,
    pub ts: DateTime<Utc>,
    pub peers: i64,
    pub speed_down: i64,
    pub speed_up: i64,
    pub downloaded: i64,
    pub uploaded: i64,
    pub status: String,
}
