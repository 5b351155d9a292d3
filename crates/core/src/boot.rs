//! Boot Sequencer — wires the dependency graph and runs the startup
//! phase, grounded in the teacher's `AppState::new()` +
//! `AppState::initialize()` split: construction is synchronous, taking
//! only a lazily-opened pool handle, `boot()` is the async phase that
//! does the first real I/O (schema creation, rehydration) and spawns
//! background tasks.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::autoscale::Autoscaler;
use crate::config::Config;
use crate::db::Db;
use crate::error::OrchestratorResult;
use crate::events::EventIngestor;
use crate::port::PortAllocator;
use crate::provision::Provisioner;
use crate::registry::Registry;
use crate::runtime::RuntimeAdapter;
use crate::stats::StatsCollector;

/// The single orchestrator context value threaded to every component,
/// in place of ambient singletons (per the "global mutable process
/// state" design note: one value, constructed once, passed down).
pub struct OrchestratorContext {
    pub config: Config,
    pub registry: Arc<Registry>,
    pub ports: Arc<PortAllocator>,
    pub runtime: Arc<dyn RuntimeAdapter>,
    pub provisioner: Arc<Provisioner>,
    pub ingestor: Arc<EventIngestor>,
    pub autoscaler: Arc<Autoscaler>,
    pub collector: Arc<StatsCollector>,
    shutdown_tx: watch::Sender<bool>,
}

impl OrchestratorContext {
    /// Synchronous wiring: opens a lazy pool handle (no network or
    /// filesystem I/O yet) and builds the rest of the dependency graph.
    /// The pool's first real connection, and schema creation, happen in
    /// `boot()`; `Db::open` can still fail on a malformed `db_url`.
    pub fn new(config: Config, runtime: Arc<dyn RuntimeAdapter>) -> OrchestratorResult<Self> {
        let db = Db::open(&config.db_url)?;
        let registry = Arc::new(Registry::new(db, config.stats_history_max));
        let ports = Arc::new(PortAllocator::new(config.port_range_host, config.ace_http_range, config.ace_https_range));
        let provisioner = Arc::new(Provisioner::new(runtime.clone(), ports.clone(), registry.clone(), config.clone()));
        let ingestor = Arc::new(EventIngestor::new(registry.clone(), runtime.clone(), config.clone()));
        let autoscaler = Arc::new(Autoscaler::new(registry.clone(), provisioner.clone(), config.clone()));
        let collector = Arc::new(StatsCollector::new(registry.clone(), ingestor.clone(), config.collect_interval_s));
        let (shutdown_tx, _rx) = watch::channel(false);

        Ok(Self {
            config,
            registry,
            ports,
            runtime,
            provisioner,
            ingestor,
            autoscaler,
            collector,
            shutdown_tx,
        })
    }

    /// The async startup phase: rehydrate from Persistence, reindex
    /// already-running managed containers, start the collector, and
    /// ensure the minimum replica count.
    pub async fn boot(&self) -> OrchestratorResult<()> {
        info!("booting orchestrator");
        self.registry.create_schema().await?;
        self.registry.rehydrate().await?;
        let reindexed = self.provisioner.reindex_on_boot().await?;
        info!(reindexed, "reindex-on-boot complete");

        let collector = self.collector.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            collector.run(shutdown_rx).await;
        });

        let provisioned = self.autoscaler.ensure_minimum().await?;
        info!(provisioned, "boot sequence complete");
        Ok(())
    }

    /// Broadcast shutdown to the collector and any subscribers, then
    /// give them a grace period to finish in-flight work.
    pub async fn shutdown(&self) {
        info!("shutting down orchestrator");
        let _ = self.shutdown_tx.send(true);
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortRange;
    use crate::runtime::FakeRuntime;

    fn test_config() -> Config {
        Config {
            db_url: "sqlite::memory:".to_string(),
            port_range_host: PortRange { lo: 22000, hi: 22005 },
            ace_http_range: PortRange { lo: 42000, hi: 42005 },
            ace_https_range: PortRange { lo: 47000, hi: 47005 },
            min_replicas: 1,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn boot_ensures_minimum_replicas() {
        let runtime: Arc<dyn RuntimeAdapter> = Arc::new(FakeRuntime::new());
        let ctx = OrchestratorContext::new(test_config(), runtime).unwrap();
        ctx.boot().await.unwrap();
        assert_eq!(ctx.registry.engine_count().await, 1);
        ctx.shutdown().await;
    }
}
