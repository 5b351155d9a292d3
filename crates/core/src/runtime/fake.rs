use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::{ContainerSpec, ContainerState, ContainerSummary, RuntimeAdapter, RuntimeError, RuntimeState};

struct FakeContainer {
    spec: ContainerSpec,
    state: ContainerState,
}

/// In-memory `RuntimeAdapter` double for tests, mirroring the teacher's
/// `fake.rs` Docker test double: no daemon required, behavior is
/// entirely scripted by the test.
pub struct FakeRuntime {
    containers: Mutex<HashMap<String, FakeContainer>>,
    next_id: AtomicU64,
    /// remove() fails this many times before succeeding, per container id.
    remove_failures: Mutex<HashMap<String, u32>>,
    /// when true, the next `inspect` observes `exited` instead of `running`.
    pub fail_to_start: Mutex<bool>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self {
            containers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            remove_failures: Mutex::new(HashMap::new()),
            fail_to_start: Mutex::new(false),
        }
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `remove()` to fail `n` times for `container_id` before succeeding.
    pub fn fail_remove_n_times(&self, container_id: &str, n: u32) {
        self.remove_failures.lock().unwrap().insert(container_id.to_string(), n);
    }

    /// Pre-seed a container as if it already existed before boot (for reindex tests).
    pub fn seed(&self, id: &str, labels: HashMap<String, String>) {
        self.containers.lock().unwrap().insert(
            id.to_string(),
            FakeContainer {
                spec: ContainerSpec {
                    image: "seeded".to_string(),
                    env: vec![],
                    labels,
                    port_bindings: HashMap::new(),
                    command: vec![],
                    network: None,
                },
                state: ContainerState::Running,
            },
        );
    }
}

impl RuntimeAdapter for FakeRuntime {
    fn create(&self, spec: ContainerSpec) -> Pin<Box<dyn Future<Output = Result<String, RuntimeError>> + Send + '_>> {
        Box::pin(async move {
            let id = format!("fake-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            self.containers
                .lock()
                .unwrap()
                .insert(id.clone(), FakeContainer { spec, state: ContainerState::Created });
            Ok(id)
        })
    }

    fn start(&self, container_id: &str) -> Pin<Box<dyn Future<Output = Result<(), RuntimeError>> + Send + '_>> {
        let container_id = container_id.to_string();
        Box::pin(async move {
            let mut containers = self.containers.lock().unwrap();
            let c = containers
                .get_mut(&container_id)
                .ok_or_else(|| RuntimeError::NotFound(container_id.clone()))?;
            c.state = if *self.fail_to_start.lock().unwrap() {
                ContainerState::Exited
            } else {
                ContainerState::Running
            };
            Ok(())
        })
    }

    fn inspect(
        &self,
        container_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<RuntimeState, RuntimeError>> + Send + '_>> {
        let container_id = container_id.to_string();
        Box::pin(async move {
            let containers = self.containers.lock().unwrap();
            let c = containers
                .get(&container_id)
                .ok_or_else(|| RuntimeError::NotFound(container_id.clone()))?;
            Ok(RuntimeState {
                state: c.state.clone(),
                started_at: None,
                labels: c.spec.labels.clone(),
                ports: HashMap::new(),
            })
        })
    }

    fn list_by_label(
        &self,
        key: &str,
        value: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ContainerSummary>, RuntimeError>> + Send + '_>> {
        let key = key.to_string();
        let value = value.to_string();
        Box::pin(async move {
            let containers = self.containers.lock().unwrap();
            Ok(containers
                .iter()
                .filter(|(_, c)| c.spec.labels.get(&key).map(|v| v == &value).unwrap_or(false))
                .map(|(id, c)| ContainerSummary {
                    id: id.clone(),
                    labels: c.spec.labels.clone(),
                    state: format!("{:?}", c.state).to_lowercase(),
                })
                .collect())
        })
    }

    fn remove(
        &self,
        container_id: &str,
        _force: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), RuntimeError>> + Send + '_>> {
        let container_id = container_id.to_string();
        Box::pin(async move {
            let remaining = {
                let mut failures = self.remove_failures.lock().unwrap();
                match failures.get_mut(&container_id) {
                    Some(n) if *n > 0 => {
                        *n -= 1;
                        Some(*n)
                    }
                    _ => None,
                }
            };
            if remaining.is_some() {
                return Err(RuntimeError::Transient(format!("simulated remove failure for {container_id}")));
            }

            self.containers
                .lock()
                .unwrap()
                .remove(&container_id)
                .ok_or_else(|| RuntimeError::NotFound(container_id.clone()))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_start_reaches_running() {
        let rt = FakeRuntime::new();
        let id = rt
            .create(ContainerSpec {
                image: "x".into(),
                env: vec![],
                labels: HashMap::new(),
                port_bindings: HashMap::new(),
                command: vec![],
                network: None,
            })
            .await
            .unwrap();
        rt.start(&id).await.unwrap();
        let state = rt.inspect(&id).await.unwrap();
        assert_eq!(state.state, ContainerState::Running);
    }

    #[tokio::test]
    async fn remove_retries_until_success() {
        let rt = FakeRuntime::new();
        let id = rt
            .create(ContainerSpec {
                image: "x".into(),
                env: vec![],
                labels: HashMap::new(),
                port_bindings: HashMap::new(),
                command: vec![],
                network: None,
            })
            .await
            .unwrap();
        rt.fail_remove_n_times(&id, 2);
        assert!(rt.remove(&id, true).await.is_err());
        assert!(rt.remove(&id, true).await.is_err());
        assert!(rt.remove(&id, true).await.is_ok());
    }

    #[tokio::test]
    async fn list_by_label_filters_correctly() {
        let rt = FakeRuntime::new();
        let mut labels = HashMap::new();
        labels.insert("ondemand.app".to_string(), "myservice".to_string());
        rt.seed("pre-existing", labels);
        let found = rt.list_by_label("ondemand.app", "myservice").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "pre-existing");
        let missing = rt.list_by_label("ondemand.app", "other").await.unwrap();
        assert!(missing.is_empty());
    }
}
