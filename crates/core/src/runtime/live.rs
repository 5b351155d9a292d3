use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use bollard::models::{ContainerCreateBody, HostConfig, PortBinding};
use bollard::query_parameters::{
    CreateContainerOptions, InspectContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::Docker;

use super::{ContainerSpec, ContainerState, ContainerSummary, RuntimeAdapter, RuntimeError, RuntimeState};

/// The live, `bollard`-backed Runtime Adapter. The single authorized
/// writer to the container daemon.
#[derive(Clone)]
pub struct BollardRuntime {
    client: Docker,
}

impl BollardRuntime {
    pub fn connect(docker_socket: &str) -> Result<Self, RuntimeError> {
        let client = if docker_socket.is_empty() {
            Docker::connect_with_local_defaults()
        } else {
            let clean = docker_socket.trim_start_matches("unix://");
            Docker::connect_with_socket(clean, 120, bollard::API_DEFAULT_VERSION)
        }
        .map_err(|e| RuntimeError::Fatal(format!("docker connect failed: {e}")))?;

        Ok(Self { client })
    }
}

fn parse_container_state(s: Option<String>) -> ContainerState {
    match s.as_deref() {
        Some("created") => ContainerState::Created,
        Some("running") => ContainerState::Running,
        Some("restarting") => ContainerState::Restarting,
        Some("exited") => ContainerState::Exited,
        Some("dead") => ContainerState::Dead,
        Some("removing") => ContainerState::Removing,
        _ => ContainerState::Exited,
    }
}

impl RuntimeAdapter for BollardRuntime {
    fn create(&self, spec: ContainerSpec) -> Pin<Box<dyn Future<Output = Result<String, RuntimeError>> + Send + '_>> {
        Box::pin(async move {
            let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
            for (container_port, host_port) in &spec.port_bindings {
                port_bindings.insert(
                    container_port.clone(),
                    Some(vec![PortBinding {
                        host_ip: Some("0.0.0.0".to_string()),
                        host_port: Some(host_port.to_string()),
                    }]),
                );
            }

            let host_config = HostConfig {
                port_bindings: Some(port_bindings),
                network_mode: spec.network.clone(),
                ..Default::default()
            };

            let body = ContainerCreateBody {
                image: Some(spec.image.clone()),
                env: Some(spec.env.clone()),
                labels: Some(spec.labels.clone()),
                cmd: if spec.command.is_empty() { None } else { Some(spec.command.clone()) },
                host_config: Some(host_config),
                exposed_ports: Some(
                    spec.port_bindings
                        .keys()
                        .map(|p| (p.clone(), HashMap::new()))
                        .collect(),
                ),
                ..Default::default()
            };

            let options = CreateContainerOptions { name: None, platform: None };
            let response = self
                .client
                .create_container(Some(options), body)
                .await
                .map_err(RuntimeError::from)?;
            Ok(response.id)
        })
    }

    fn start(&self, container_id: &str) -> Pin<Box<dyn Future<Output = Result<(), RuntimeError>> + Send + '_>> {
        let container_id = container_id.to_string();
        Box::pin(async move {
            self.client
                .start_container(&container_id, None::<StartContainerOptions>)
                .await
                .map_err(RuntimeError::from)
        })
    }

    fn inspect(
        &self,
        container_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<RuntimeState, RuntimeError>> + Send + '_>> {
        let container_id = container_id.to_string();
        Box::pin(async move {
            let details = self
                .client
                .inspect_container(&container_id, None::<InspectContainerOptions>)
                .await
                .map_err(RuntimeError::from)?;

            let state = parse_container_state(details.state.as_ref().and_then(|s| s.status.as_ref().map(|v| format!("{v:?}").to_lowercase())));
            let started_at = details.state.as_ref().and_then(|s| s.started_at.clone());
            let labels = details
                .config
                .as_ref()
                .and_then(|c| c.labels.clone())
                .unwrap_or_default();

            let mut ports = HashMap::new();
            if let Some(ns) = details.network_settings.as_ref() {
                if let Some(port_map) = ns.ports.as_ref() {
                    for (container_port, bindings) in port_map {
                        if let Some(bindings) = bindings {
                            if let Some(first) = bindings.first() {
                                if let Some(host_port) = first.host_port.as_ref().and_then(|p| p.parse::<u16>().ok()) {
                                    ports.insert(container_port.clone(), host_port);
                                }
                            }
                        }
                    }
                }
            }

            Ok(RuntimeState { state, started_at, labels, ports })
        })
    }

    fn list_by_label(
        &self,
        key: &str,
        value: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ContainerSummary>, RuntimeError>> + Send + '_>> {
        let filter_value = format!("{key}={value}");
        Box::pin(async move {
            let mut filters = HashMap::new();
            filters.insert("label".to_string(), vec![filter_value]);

            let options = ListContainersOptions { all: true, filters: Some(filters), ..Default::default() };
            let containers = self.client.list_containers(Some(options)).await.map_err(RuntimeError::from)?;

            Ok(containers
                .into_iter()
                .filter_map(|c| {
                    let id = c.id?;
                    Some(ContainerSummary {
                        id,
                        labels: c.labels.unwrap_or_default(),
                        state: c.state.map(|s| format!("{s:?}").to_lowercase()).unwrap_or_default(),
                    })
                })
                .collect())
        })
    }

    fn remove(
        &self,
        container_id: &str,
        force: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), RuntimeError>> + Send + '_>> {
        let container_id = container_id.to_string();
        Box::pin(async move {
            let options = RemoveContainerOptions { force, v: true, ..Default::default() };
            self.client
                .remove_container(&container_id, Some(options))
                .await
                .map_err(RuntimeError::from)
        })
    }
}
