//! Runtime Adapter — the narrow, single-authorized-writer surface over
//! the container daemon.
//!
//! Shaped after the teacher's `DockerOps` trait: object-safe, async,
//! returning boxed futures so both the live `bollard`-backed adapter
//! and a fake test double can implement it without `async-trait`.

mod error;
mod fake;
mod live;

pub use error::RuntimeError;
pub use fake::FakeRuntime;
pub use live::BollardRuntime;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    Created,
    Running,
    Restarting,
    Exited,
    Dead,
    Removing,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeState {
    pub state: ContainerState,
    pub started_at: Option<String>,
    pub labels: HashMap<String, String>,
    pub ports: HashMap<String, u16>,
}

#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    /// container_port/proto -> host_port
    pub port_bindings: HashMap<String, u16>,
    pub command: Vec<String>,
    pub network: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerSummary {
    pub id: String,
    pub labels: HashMap<String, String>,
    pub state: String,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RuntimeError>> + Send + 'a>>;

pub trait RuntimeAdapter: Send + Sync {
    fn create(&self, spec: ContainerSpec) -> BoxFuture<'_, String>;
    fn start(&self, container_id: &str) -> BoxFuture<'_, ()>;
    fn inspect(&self, container_id: &str) -> BoxFuture<'_, RuntimeState>;
    fn list_by_label(&self, key: &str, value: &str) -> BoxFuture<'_, Vec<ContainerSummary>>;
    fn remove(&self, container_id: &str, force: bool) -> BoxFuture<'_, ()>;
}
