//! Persistence — embedded SQLite store for engines, streams, and stats
//! samples, and rehydration on boot.
//!
//! Grounded in the connection-pool-plus-health-check shape the pack's
//! webhook-pipeline services use for their database layer, adapted to
//! `sqlite` since this process owns an embedded, single-writer store
//! rather than a shared server database.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::info;

use crate::error::OrchestratorError;
use crate::model::{Engine, KeyType, Stream, StreamStatSample, StreamStatus};

#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Open a lazy connection pool for `db_url`. Synchronous: `connect_lazy`
    /// only parses the URL and configures the pool, it does not touch the
    /// filesystem or network. The pool's first real connection, and schema
    /// creation, happen in `create_schema`, called once during boot.
    ///
    /// `max_connections(1)` pins the pool to a single connection: SQLite
    /// serializes writers at the file level regardless, but pinning keeps
    /// the "single writer per connection" contract explicit rather than
    /// incidental.
    pub fn open(db_url: &str) -> Result<Self, OrchestratorError> {
        info!(db_url, "opening persistence store");
        let connect_url = if db_url.contains(":memory:") || db_url.contains('?') {
            db_url.to_string()
        } else {
            format!("{db_url}?mode=rwc")
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_lazy(&connect_url)
            .map_err(OrchestratorError::from)?;
        Ok(Self { pool })
    }

    /// Cheap connectivity probe for readiness checks.
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await.is_ok()
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, OrchestratorError> {
        let db = Self::open("sqlite::memory:")?;
        db.create_schema().await?;
        Ok(db)
    }

    pub async fn create_schema(&self) -> Result<(), OrchestratorError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS engines (
                engine_key   TEXT PRIMARY KEY,
                container_id TEXT NOT NULL,
                host         TEXT NOT NULL,
                port         INTEGER NOT NULL,
                labels       TEXT NOT NULL,
                first_seen   TEXT NOT NULL,
                last_seen    TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS streams (
                id                  TEXT PRIMARY KEY,
                engine_key          TEXT NOT NULL,
                key_type            TEXT NOT NULL,
                key                 TEXT NOT NULL,
                playback_session_id TEXT NOT NULL,
                stat_url            TEXT NOT NULL,
                command_url         TEXT NOT NULL,
                is_live             INTEGER NOT NULL,
                started_at          TEXT NOT NULL,
                ended_at            TEXT,
                status              TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stream_stats (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                stream_id   TEXT NOT NULL,
                ts          TEXT NOT NULL,
                peers       INTEGER NOT NULL,
                speed_down  INTEGER NOT NULL,
                speed_up    INTEGER NOT NULL,
                downloaded  INTEGER NOT NULL,
                uploaded    INTEGER NOT NULL,
                status      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_stream_stats_stream_id ON stream_stats(stream_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_stream_stats_ts ON stream_stats(ts)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn upsert_engine(&self, engine: &Engine) -> Result<(), OrchestratorError> {
        let labels = serde_json::to_string(&engine.labels).map_err(|e| OrchestratorError::PersistenceError(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO engines (engine_key, container_id, host, port, labels, first_seen, last_seen)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(engine_key) DO UPDATE SET
                container_id = excluded.container_id,
                host = excluded.host,
                port = excluded.port,
                labels = excluded.labels,
                last_seen = excluded.last_seen
            "#,
        )
        .bind(&engine.engine_key)
        .bind(&engine.container_id)
        .bind(&engine.host)
        .bind(engine.port as i64)
        .bind(labels)
        .bind(engine.first_seen.to_rfc3339())
        .bind(engine.last_seen.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_engine(&self, engine_key: &str) -> Result<(), OrchestratorError> {
        sqlx::query("DELETE FROM engines WHERE engine_key = ?")
            .bind(engine_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn load_engines(&self) -> Result<Vec<Engine>, OrchestratorError> {
        let rows = sqlx::query("SELECT engine_key, container_id, host, port, labels, first_seen, last_seen FROM engines")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let labels: String = row.try_get("labels")?;
                let labels: HashMap<String, String> =
                    serde_json::from_str(&labels).unwrap_or_default();
                Ok(Engine {
                    engine_key: row.try_get("engine_key")?,
                    container_id: row.try_get("container_id")?,
                    host: row.try_get("host")?,
                    port: row.try_get::<i64, _>("port")? as u16,
                    labels,
                    first_seen: parse_ts(row.try_get("first_seen")?)?,
                    last_seen: parse_ts(row.try_get("last_seen")?)?,
                })
            })
            .collect::<Result<Vec<_>, OrchestratorError>>()
    }

    /// Upsert a stream, last-writer-wins on every non-key attribute. The
    /// one-way `started` -> `ended` transition is enforced by the Event
    /// Ingestor, the sole writer of stream records; this layer persists
    /// whatever it is given.
    pub async fn upsert_stream(&self, stream: &Stream) -> Result<(), OrchestratorError> {
        sqlx::query(
            r#"
            INSERT INTO streams (id, engine_key, key_type, key, playback_session_id, stat_url, command_url, is_live, started_at, ended_at, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                engine_key = excluded.engine_key,
                key_type = excluded.key_type,
                key = excluded.key,
                playback_session_id = excluded.playback_session_id,
                stat_url = excluded.stat_url,
                command_url = excluded.command_url,
                is_live = excluded.is_live,
                started_at = excluded.started_at,
                ended_at = excluded.ended_at,
                status = excluded.status
            "#,
        )
        .bind(&stream.id)
        .bind(&stream.engine_key)
        .bind(stream.key_type.as_str())
        .bind(&stream.key)
        .bind(&stream.playback_session_id)
        .bind(&stream.stat_url)
        .bind(&stream.command_url)
        .bind(stream.is_live as i64)
        .bind(stream.started_at.to_rfc3339())
        .bind(stream.ended_at.map(|t| t.to_rfc3339()))
        .bind(stream.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_non_ended_streams(&self) -> Result<Vec<Stream>, OrchestratorError> {
        let rows = sqlx::query(
            "SELECT id, engine_key, key_type, key, playback_session_id, stat_url, command_url, is_live, started_at, ended_at, status FROM streams WHERE status != 'ended'",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_stream).collect()
    }

    pub async fn insert_stat_sample(&self, sample: &StreamStatSample) -> Result<(), OrchestratorError> {
        sqlx::query(
            r#"
            INSERT INTO stream_stats (stream_id, ts, peers, speed_down, speed_up, downloaded, uploaded, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&sample.stream_id)
        .bind(sample.ts.to_rfc3339())
        .bind(sample.peers)
        .bind(sample.speed_down)
        .bind(sample.speed_up)
        .bind(sample.downloaded)
        .bind(sample.uploaded)
        .bind(&sample.status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_stats_since(
        &self,
        stream_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<StreamStatSample>, OrchestratorError> {
        let since = since.unwrap_or_else(|| DateTime::<Utc>::MIN_UTC);
        let rows = sqlx::query(
            "SELECT stream_id, ts, peers, speed_down, speed_up, downloaded, uploaded, status FROM stream_stats WHERE stream_id = ? AND ts >= ? ORDER BY ts ASC",
        )
        .bind(stream_id)
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(StreamStatSample {
                    stream_id: row.try_get("stream_id")?,
                    ts: parse_ts(row.try_get("ts")?)?,
                    peers: row.try_get("peers")?,
                    speed_down: row.try_get("speed_down")?,
                    speed_up: row.try_get("speed_up")?,
                    downloaded: row.try_get("downloaded")?,
                    uploaded: row.try_get("uploaded")?,
                    status: row.try_get("status")?,
                })
            })
            .collect::<Result<Vec<_>, OrchestratorError>>()
    }
}

fn row_to_stream(row: sqlx::sqlite::SqliteRow) -> Result<Stream, OrchestratorError> {
    let key_type: String = row.try_get("key_type")?;
    let key_type = KeyType::parse(&key_type)
        .ok_or_else(|| OrchestratorError::PersistenceError(format!("unknown key_type in storage: {key_type}")))?;
    let status: String = row.try_get("status")?;
    let status = match status.as_str() {
        "started" => StreamStatus::Started,
        "ended" => StreamStatus::Ended,
        other => return Err(OrchestratorError::PersistenceError(format!("unknown stream status in storage: {other}"))),
    };
    let ended_at: Option<String> = row.try_get("ended_at")?;

    Ok(Stream {
        id: row.try_get("id")?,
        engine_key: row.try_get("engine_key")?,
        key_type,
        key: row.try_get("key")?,
        playback_session_id: row.try_get("playback_session_id")?,
        stat_url: row.try_get("stat_url")?,
        command_url: row.try_get("command_url")?,
        is_live: row.try_get::<i64, _>("is_live")? != 0,
        started_at: parse_ts(row.try_get("started_at")?)?,
        ended_at: ended_at.map(parse_ts).transpose()?,
        status,
    })
}

fn parse_ts(s: String) -> Result<DateTime<Utc>, OrchestratorError> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| OrchestratorError::PersistenceError(format!("bad timestamp in storage: {e}")))
}
