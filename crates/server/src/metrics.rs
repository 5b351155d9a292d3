//! Prometheus metrics exposition via `metrics` + `metrics-exporter-prometheus`,
//! grounded in the pack's `ipcasj-ethhook` admin-api, which carries this
//! exact pair since the teacher has no metrics dependency of its own.
//!
//! Unlike `ipcasj-ethhook`'s `lazy_static!` + `prometheus` registry, this
//! crate uses the newer `metrics` facade: counters/gauges are recorded by
//! name at the call site (`metrics::counter!`, `metrics::gauge!`) and
//! collected by a single process-wide `PrometheusRecorder`, installed once
//! at startup and handed to every handler via `AppState::metrics_handle`.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const EVENTS_STARTED_TOTAL: &str = "orch_events_started_total";
pub const EVENTS_ENDED_TOTAL: &str = "orch_events_ended_total";
pub const COLLECT_ERRORS_TOTAL: &str = "orch_collect_errors_total";
pub const PROVISION_TOTAL: &str = "orch_provision_total";
pub const STREAMS_ACTIVE: &str = "orch_streams_active";

/// Install the process-wide recorder and return a handle that can render
/// the current registry as Prometheus text, for the `/metrics` route.
pub fn install() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install prometheus recorder")
}

/// A standalone handle for tests, which build a router per test function
/// and so cannot share the one process-wide global recorder `install()`
/// sets up. `metrics::counter!`/`gauge!` calls still run against whatever
/// recorder (if any) is globally installed; this handle only needs to be
/// renderable, not wired to those call sites.
pub fn test_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

pub fn record_event_started() {
    metrics::counter!(EVENTS_STARTED_TOTAL).increment(1);
}

pub fn record_event_ended() {
    metrics::counter!(EVENTS_ENDED_TOTAL).increment(1);
}

pub fn record_collect_error() {
    metrics::counter!(COLLECT_ERRORS_TOTAL).increment(1);
}

pub fn record_provision(kind: &'static str) {
    metrics::counter!(PROVISION_TOTAL, "kind" => kind).increment(1);
}

pub fn set_streams_active(count: u64) {
    metrics::gauge!(STREAMS_ACTIVE).set(count as f64);
}
