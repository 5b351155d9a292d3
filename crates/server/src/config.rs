//! HTTP-surface configuration: bind address, CORS, request timeout, and
//! logging. Layered the way the teacher's `ClusterConfig::load()` is —
//! `dotenvy` first, then a `config::Config` builder stacking defaults, an
//! optional TOML file, then environment variables — since these are the
//! only settings this binary owns that the library crate has no business
//! knowing about. Orchestrator settings proper (port ranges, replica
//! bounds, the management label, ...) are loaded separately via
//! `orchestrator_core::Config::from_env`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub request_timeout_secs: u64,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    File { path: String },
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "0.0.0.0:8000".to_string(),
                request_timeout_secs: 30,
                enable_cors: true,
                cors_origins: vec!["*".to_string()],
            },
            logging: LoggingConfig {
                level: "info,orchestrator=debug".to_string(),
                format: LogFormat::Pretty,
                output: LogOutput::Stdout,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from `orchestrator.toml` and environment variables.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = config::Config::try_from(&AppConfig::default())
            .context("failed to serialize default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);

        let config_paths = ["/etc/orchestrator/orchestrator", "config/orchestrator", "crates/server/config/orchestrator"];
        for path in config_paths {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ORCH")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")
    }

    pub fn validate(&self) -> Result<()> {
        self.server
            .bind_address
            .parse::<std::net::SocketAddr>()
            .context("invalid server.bind_address")?;
        Ok(())
    }
}
