//! Provisioner — composes the Port Allocator, Runtime Adapter, and State
//! Registry into `provision_generic`/`provision_acestream`, plus
//! reindex-on-boot.
//!
//! The wait-for-running poll loop and rollback-on-failure are grounded
//! in the teacher's retry/backoff shape for background inventory sync:
//! poll on a fixed interval, bounded by an overall timeout, tearing
//! down and releasing reservations on any failure path in reverse
//! order of acquisition.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::model::Engine;
use crate::port::{PortAllocator, RangeKind};
use crate::registry::Registry;
use crate::runtime::{ContainerSpec, ContainerState, RuntimeAdapter};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct AcestreamResult {
    pub container_id: String,
    pub host_http_port: u16,
    pub container_http_port: u16,
    pub container_https_port: u16,
}

pub struct Provisioner {
    runtime: Arc<dyn RuntimeAdapter>,
    ports: Arc<PortAllocator>,
    registry: Arc<Registry>,
    config: Config,
}

impl Provisioner {
    pub fn new(runtime: Arc<dyn RuntimeAdapter>, ports: Arc<PortAllocator>, registry: Arc<Registry>, config: Config) -> Self {
        Self { runtime, ports, registry, config }
    }

    fn management_label(&self) -> (String, String) {
        self.config.management_label()
    }

    /// Create, start, and wait for a container to reach `running`, then
    /// register it as an `Engine` in the Registry. On timeout or an
    /// early exit, the container is force-removed before the error is
    /// returned; the caller is responsible for releasing any ports it
    /// reserved.
    ///
    /// `host_port` names the single host-reachable port the resulting
    /// Engine is keyed on (the way `provision_acestream` always has
    /// exactly one). When the caller has no canonical port to key on —
    /// a generic container with zero or more than one port binding —
    /// pass `None`; the engine is then keyed on `host:container_id`
    /// instead, which is still unique and still resolvable by
    /// `get_engine_by_container_id`, just not of the `host:port` shape
    /// the default key uses.
    pub async fn provision_generic(
        &self,
        image: &str,
        env: Vec<String>,
        mut labels: HashMap<String, String>,
        port_bindings: HashMap<String, u16>,
        command: Vec<String>,
        host_port: Option<u16>,
    ) -> OrchestratorResult<String> {
        let (label_key, label_value) = self.management_label();
        labels.insert(label_key, label_value);

        let spec = ContainerSpec {
            image: image.to_string(),
            env,
            labels: labels.clone(),
            port_bindings,
            command,
            network: if self.config.docker_network.is_empty() {
                None
            } else {
                Some(self.config.docker_network.clone())
            },
        };

        let container_id = self.runtime.create(spec).await?;
        if let Err(err) = self.runtime.start(&container_id).await {
            let _ = self.runtime.remove(&container_id, true).await;
            return Err(err.into());
        }

        if let Err(err) = self.wait_for_running(&container_id).await {
            let _ = self.runtime.remove(&container_id, true).await;
            return Err(err);
        }

        let now = Utc::now();
        let engine_key = match host_port {
            Some(port) => Engine::key_for(&self.config.advertised_host, port),
            None => format!("{}:{container_id}", self.config.advertised_host),
        };
        let engine = Engine {
            engine_key,
            container_id: container_id.clone(),
            host: self.config.advertised_host.clone(),
            port: host_port.unwrap_or(0),
            labels,
            first_seen: now,
            last_seen: now,
        };
        self.registry.upsert_engine(engine).await?;

        Ok(container_id)
    }

    async fn wait_for_running(&self, container_id: &str) -> OrchestratorResult<()> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(self.config.startup_timeout_s);
        let mut interval = tokio::time::interval(POLL_INTERVAL);

        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(OrchestratorError::StartupTimeout(self.config.startup_timeout_s));
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let tick = tokio::time::timeout(remaining, interval.tick()).await;
            if tick.is_err() {
                return Err(OrchestratorError::StartupTimeout(self.config.startup_timeout_s));
            }

            let state = self.runtime.inspect(container_id).await?;
            match state.state {
                ContainerState::Running => return Ok(()),
                ContainerState::Exited | ContainerState::Dead => {
                    return Err(OrchestratorError::StartupFailed(format!(
                        "container {container_id} reached {:?} before running",
                        state.state
                    )));
                }
                _ => continue,
            }
        }
    }

    /// Reserve a host port (if not supplied) plus a container http/https
    /// pair, compose the AceStream launch spec, and provision it. Any
    /// port reserved during this call is released if the call fails.
    pub async fn provision_acestream(
        &self,
        image: Option<&str>,
        mut labels: HashMap<String, String>,
        env: Vec<String>,
        host_port: Option<u16>,
    ) -> OrchestratorResult<AcestreamResult> {
        let (host_port, host_port_reserved_by_us) = match host_port {
            Some(p) => (p, false),
            None => (self.ports.allocate_host().await?, true),
        };

        let (container_http_port, container_https_port) = match self.ports.allocate_container_pair() {
            Ok(pair) => pair,
            Err(err) => {
                if host_port_reserved_by_us {
                    self.ports.release(host_port, RangeKind::Host);
                }
                return Err(err);
            }
        };

        let release_all = |ports: &PortAllocator| {
            ports.release(container_https_port, RangeKind::ContainerHttps);
            ports.release(container_http_port, RangeKind::ContainerHttp);
            if host_port_reserved_by_us {
                ports.release(host_port, RangeKind::Host);
            }
        };

        let command = vec![format!("--http-port={container_http_port}"), format!("--https-port={container_https_port}")];

        let mut port_bindings = HashMap::new();
        port_bindings.insert(format!("{container_http_port}/tcp"), host_port);
        let mut host_https_port = None;
        if self.config.ace_map_https {
            let https_host_port = match self.ports.allocate_host().await {
                Ok(p) => p,
                Err(err) => {
                    release_all(&self.ports);
                    return Err(err);
                }
            };
            port_bindings.insert(format!("{container_https_port}/tcp"), https_host_port);
            host_https_port = Some(https_host_port);
        }

        labels.insert("acestream.http_port".to_string(), container_http_port.to_string());
        labels.insert("acestream.https_port".to_string(), container_https_port.to_string());
        labels.insert("host.http_port".to_string(), host_port.to_string());
        if let Some(p) = host_https_port {
            labels.insert("host.https_port".to_string(), p.to_string());
        }

        let image = image.unwrap_or(&self.config.target_image);
        let result = self.provision_generic(image, env, labels, port_bindings, command, Some(host_port)).await;

        match result {
            Ok(container_id) => Ok(AcestreamResult { container_id, host_http_port: host_port, container_http_port, container_https_port }),
            Err(err) => {
                if let Some(p) = host_https_port {
                    self.ports.release(p, RangeKind::Host);
                }
                release_all(&self.ports);
                Err(err)
            }
        }
    }

    /// Query the runtime for all containers carrying the management
    /// label, mark their recorded ports used, and insert them into the
    /// Registry if absent. Containers missing the expected labels are
    /// ignored: they were not managed by us.
    pub async fn reindex_on_boot(&self) -> OrchestratorResult<usize> {
        let (label_key, label_value) = self.management_label();
        let containers = self.runtime.list_by_label(&label_key, &label_value).await?;

        let mut reindexed = 0;
        for summary in containers {
            let host_http_port: Option<u16> = summary.labels.get("host.http_port").and_then(|v| v.parse().ok());
            let container_http_port: Option<u16> = summary.labels.get("acestream.http_port").and_then(|v| v.parse().ok());
            let container_https_port: Option<u16> = summary.labels.get("acestream.https_port").and_then(|v| v.parse().ok());
            let host_https_port: Option<u16> = summary.labels.get("host.https_port").and_then(|v| v.parse().ok());

            let Some(host_port) = host_http_port else {
                warn!(container_id = %summary.id, "skipping reindex: missing host.http_port label");
                continue;
            };

            self.ports.mark_used(host_port, RangeKind::Host);
            if let Some(p) = container_http_port {
                self.ports.mark_used(p, RangeKind::ContainerHttp);
            }
            if let Some(p) = container_https_port {
                self.ports.mark_used(p, RangeKind::ContainerHttps);
            }
            if let Some(p) = host_https_port {
                self.ports.mark_used(p, RangeKind::Host);
            }

            let engine_key = Engine::key_for(&self.config.advertised_host, host_port);
            if self.registry.get_engine(&engine_key).await.is_some() {
                continue;
            }

            let now = Utc::now();
            let engine = Engine {
                engine_key,
                container_id: summary.id.clone(),
                host: self.config.advertised_host.clone(),
                port: host_port,
                labels: summary.labels,
                first_seen: now,
                last_seen: now,
            };
            self.registry.upsert_engine(engine).await?;
            reindexed += 1;
            info!(container_id = %summary.id, host_port, "reindexed managed container on boot");
        }

        Ok(reindexed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortRange;
    use crate::db::Db;
    use crate::runtime::FakeRuntime;

    async fn provisioner(config: Config) -> (Provisioner, Arc<FakeRuntime>) {
        let ports = Arc::new(PortAllocator::new(config.port_range_host, config.ace_http_range, config.ace_https_range));
        let db = Db::in_memory().await.unwrap();
        let registry = Arc::new(Registry::new(db, config.stats_history_max));
        let fake = Arc::new(FakeRuntime::new());
        let runtime: Arc<dyn RuntimeAdapter> = fake.clone();
        (Provisioner::new(runtime, ports, registry, config), fake)
    }

    fn small_config() -> Config {
        Config {
            port_range_host: PortRange { lo: 19000, hi: 19001 },
            ace_http_range: PortRange { lo: 40000, hi: 40001 },
            ace_https_range: PortRange { lo: 45000, hi: 45001 },
            startup_timeout_s: 5,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn provision_acestream_assigns_distinct_ports() {
        let (p, _fake) = provisioner(small_config()).await;
        let result = p.provision_acestream(None, HashMap::new(), vec![], None).await.unwrap();
        assert_eq!(result.host_http_port, 19000);
        assert_eq!(result.container_http_port, 40000);
        assert_eq!(result.container_https_port, 45000);
    }

    #[tokio::test]
    async fn port_exhaustion_releases_all_reservations() {
        let (p, _fake) = provisioner(small_config()).await;
        let _first = p.provision_acestream(None, HashMap::new(), vec![], None).await.unwrap();
        let _second = p.provision_acestream(None, HashMap::new(), vec![], None).await.unwrap();
        let third = p.provision_acestream(None, HashMap::new(), vec![], None).await;
        assert!(matches!(third, Err(OrchestratorError::PortExhausted(_))));
        assert_eq!(p.registry.engine_count().await, 2);
    }

    #[tokio::test]
    async fn provision_generic_registers_an_engine() {
        let (p, _fake) = provisioner(small_config()).await;
        let container_id = p
            .provision_generic("some/image", vec![], HashMap::new(), HashMap::new(), vec![], None)
            .await
            .unwrap();
        assert_eq!(p.registry.engine_count().await, 1);
        let engine = p.registry.get_engine_by_container_id(&container_id).await.unwrap();
        assert_eq!(engine.container_id, container_id);
    }

    #[tokio::test]
    async fn reindex_marks_ports_used_and_skips_duplicates() {
        let (p, fake) = provisioner(small_config()).await;
        let mut labels = HashMap::new();
        labels.insert("ondemand.app".to_string(), "myservice".to_string());
        labels.insert("host.http_port".to_string(), "19100".to_string());
        labels.insert("acestream.http_port".to_string(), "40100".to_string());
        labels.insert("acestream.https_port".to_string(), "45100".to_string());
        fake.seed("preexisting", labels);
        let count = p.reindex_on_boot().await.unwrap();
        assert_eq!(count, 1);
        let count_again = p.reindex_on_boot().await.unwrap();
        assert_eq!(count_again, 0);
    }
}
