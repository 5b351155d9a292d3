//! Shared application state threaded through every handler, grounded in
//! the teacher's `AppState` — a small `Clone`-able bundle of `Arc`s, no
//! ambient singletons.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use orchestrator_core::OrchestratorContext;

#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<OrchestratorContext>,
    pub metrics_handle: PrometheusHandle,
}
