//! Core configuration: the fields every orchestrator component needs
//! directly (port ranges, timeouts, replica bounds, the management label).
//!
//! Parsed with the same per-field `env::var(...).ok().and_then(...)`
//! idiom the teacher's `AgentConfig::from_env` uses, rather than the
//! layered `config` crate — this crate has no business depending on a
//! configuration-file format, that concern belongs to the binary.

use std::env;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub lo: u16,
    pub hi: u16,
}

impl PortRange {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let (lo, hi) = s
            .split_once('-')
            .ok_or_else(|| ConfigError::Invalid(format!("malformed port range: {s}")))?;
        let lo: u16 = lo
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("malformed port range: {s}")))?;
        let hi: u16 = hi
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("malformed port range: {s}")))?;
        let range = PortRange { lo, hi };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lo == 0 || self.lo > self.hi {
            return Err(ConfigError::Invalid(format!(
                "invalid port range {}-{}",
                self.lo, self.hi
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        (self.hi - self.lo) as usize + 1
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub docker_network: String,
    pub target_image: String,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub container_label_key: String,
    pub container_label_value: String,
    pub startup_timeout_s: u64,
    pub idle_ttl_s: u64,
    pub collect_interval_s: u64,
    pub stats_history_max: usize,
    pub port_range_host: PortRange,
    pub ace_http_range: PortRange,
    pub ace_https_range: PortRange,
    pub ace_map_https: bool,
    pub api_key: Option<String>,
    pub db_url: String,
    pub auto_delete: bool,
    /// Host address engines are reachable at, recorded as `Engine::host`.
    pub advertised_host: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docker_network: String::new(),
            target_image: "acestream/engine:latest".to_string(),
            min_replicas: 0,
            max_replicas: 20,
            container_label_key: "ondemand.app".to_string(),
            container_label_value: "myservice".to_string(),
            startup_timeout_s: 25,
            idle_ttl_s: 600,
            collect_interval_s: 5,
            stats_history_max: 720,
            port_range_host: PortRange { lo: 19000, hi: 19999 },
            ace_http_range: PortRange { lo: 40000, hi: 44999 },
            ace_https_range: PortRange { lo: 45000, hi: 49999 },
            ace_map_https: false,
            api_key: None,
            db_url: "sqlite://./orchestrator.db".to_string(),
            auto_delete: false,
            advertised_host: "localhost".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Build from environment variables, falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let container_label = env::var("CONTAINER_LABEL")
            .unwrap_or_else(|_| format!("{}={}", defaults.container_label_key, defaults.container_label_value));
        let (container_label_key, container_label_value) = container_label
            .split_once('=')
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "CONTAINER_LABEL must be of the form key=value, got {container_label}"
                ))
            })?;

        let config = Config {
            docker_network: env::var("DOCKER_NETWORK").unwrap_or(defaults.docker_network),
            target_image: env::var("TARGET_IMAGE").unwrap_or(defaults.target_image),
            min_replicas: parse_env_or("MIN_REPLICAS", defaults.min_replicas),
            max_replicas: parse_env_or("MAX_REPLICAS", defaults.max_replicas),
            container_label_key,
            container_label_value,
            startup_timeout_s: parse_env_or("STARTUP_TIMEOUT_S", defaults.startup_timeout_s),
            idle_ttl_s: parse_env_or("IDLE_TTL_S", defaults.idle_ttl_s),
            collect_interval_s: parse_env_or("COLLECT_INTERVAL_S", defaults.collect_interval_s),
            stats_history_max: parse_env_or("STATS_HISTORY_MAX", defaults.stats_history_max),
            port_range_host: env::var("PORT_RANGE_HOST")
                .ok()
                .map(|s| PortRange::parse(&s))
                .transpose()?
                .unwrap_or(defaults.port_range_host),
            ace_http_range: env::var("ACE_HTTP_RANGE")
                .ok()
                .map(|s| PortRange::parse(&s))
                .transpose()?
                .unwrap_or(defaults.ace_http_range),
            ace_https_range: env::var("ACE_HTTPS_RANGE")
                .ok()
                .map(|s| PortRange::parse(&s))
                .transpose()?
                .unwrap_or(defaults.ace_https_range),
            ace_map_https: parse_env_or("ACE_MAP_HTTPS", defaults.ace_map_https),
            api_key: env::var("API_KEY").ok().filter(|s| !s.is_empty()),
            db_url: env::var("DB_URL").unwrap_or(defaults.db_url),
            auto_delete: parse_env_or("AUTO_DELETE", defaults.auto_delete),
            advertised_host: env::var("ADVERTISED_HOST").unwrap_or(defaults.advertised_host),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.port_range_host.validate()?;
        self.ace_http_range.validate()?;
        self.ace_https_range.validate()?;

        if self.min_replicas > self.max_replicas {
            return Err(ConfigError::Invalid(format!(
                "MIN_REPLICAS ({}) > MAX_REPLICAS ({})",
                self.min_replicas, self.max_replicas
            )));
        }
        if self.startup_timeout_s == 0 {
            return Err(ConfigError::Invalid("STARTUP_TIMEOUT_S must be > 0".into()));
        }
        if self.collect_interval_s == 0 {
            return Err(ConfigError::Invalid("COLLECT_INTERVAL_S must be > 0".into()));
        }
        if self.idle_ttl_s == 0 {
            return Err(ConfigError::Invalid("IDLE_TTL_S must be > 0".into()));
        }
        if self.container_label_key.is_empty() {
            return Err(ConfigError::Invalid("CONTAINER_LABEL key must be non-empty".into()));
        }
        Ok(())
    }

    pub fn management_label(&self) -> (String, String) {
        (self.container_label_key.clone(), self.container_label_value.clone())
    }
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_range_parses_valid() {
        let r = PortRange::parse("19000-19999").unwrap();
        assert_eq!(r.lo, 19000);
        assert_eq!(r.hi, 19999);
    }

    #[test]
    fn port_range_rejects_malformed() {
        assert!(PortRange::parse("not-a-range").is_err());
        assert!(PortRange::parse("19000").is_err());
    }

    #[test]
    fn port_range_rejects_inverted() {
        assert!(PortRange::parse("20000-19000").is_err());
    }

    #[test]
    fn port_range_rejects_zero_lo() {
        assert!(PortRange::parse("0-100").is_err());
    }

    #[test]
    fn validate_rejects_min_above_max() {
        let mut cfg = Config::default();
        cfg.min_replicas = 10;
        cfg.max_replicas = 5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_timeouts() {
        let mut cfg = Config::default();
        cfg.startup_timeout_s = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(Config::default().validate().is_ok());
    }
}
