//! Library surface for the orchestrator HTTP server, split out from the
//! thin `main.rs` binary so integration tests can assemble the router
//! directly, the way the pack's admin-api exposes a `create_test_router`
//! alongside its own binary-only `main.rs`.

pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod state;
