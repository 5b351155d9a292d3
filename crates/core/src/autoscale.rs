//! Autoscaler — maintains `MIN_REPLICAS` and honors explicit scale-to
//! demand, bounded above by `MAX_REPLICAS`. Never shrinks: surplus
//! engines are only reclaimed via `stream_ended` + `AUTO_DELETE` or an
//! explicit operator deletion, since engines may be in use.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::error::OrchestratorResult;
use crate::provision::Provisioner;
use crate::registry::Registry;

pub struct Autoscaler {
    registry: Arc<Registry>,
    provisioner: Arc<Provisioner>,
    config: Config,
}

impl Autoscaler {
    pub fn new(registry: Arc<Registry>, provisioner: Arc<Provisioner>, config: Config) -> Self {
        Self { registry, provisioner, config }
    }

    /// Provision enough generic engines to reach `MIN_REPLICAS`.
    pub async fn ensure_minimum(&self) -> OrchestratorResult<u32> {
        self.provision_shortfall(self.config.min_replicas).await
    }

    /// Clamp `demand` to `[MIN_REPLICAS, MAX_REPLICAS]` and provision the
    /// shortfall, if any. Returns `(target, current_after)`.
    pub async fn scale_to(&self, demand: u32) -> OrchestratorResult<(u32, u32)> {
        let target = demand.clamp(self.config.min_replicas, self.config.max_replicas);
        self.provision_shortfall(target).await?;
        let current = self.registry.engine_count().await as u32;
        Ok((target, current))
    }

    async fn provision_shortfall(&self, target: u32) -> OrchestratorResult<u32> {
        let mut current = self.registry.engine_count().await as u32;
        let mut provisioned = 0;
        while current < target {
            self.provisioner
                .provision_generic(&self.config.target_image, Vec::new(), HashMap::new(), HashMap::new(), Vec::new(), None)
                .await?;
            current += 1;
            provisioned += 1;
        }
        if provisioned > 0 {
            info!(provisioned, target, "autoscaler provisioned engines to reach target");
        }
        Ok(provisioned)
    }
}
