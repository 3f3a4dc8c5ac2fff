//! Engine driver backed by the Docker HTTP API.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{EndpointSettings, HostConfig};
use bollard::network::{ConnectNetworkOptions, DisconnectNetworkOptions};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::StreamExt;
use tracing::debug;

use super::{Engine, MonitorSpec};
use crate::error::EngineError;

const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Driver over a local engine socket.
pub struct DockerDriver {
    docker: Docker,
}

impl DockerDriver {
    pub fn new(socket: &str) -> Result<Self, EngineError> {
        let docker = Docker::connect_with_unix(socket, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)?;
        Ok(DockerDriver { docker })
    }
}

/// Pull engine-reported statuses out of the transport error so callers can
/// branch on the two semantically meaningful ones (404, 403).
fn normalize(err: bollard::errors::Error) -> EngineError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message,
        } => EngineError::NotFound(message),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => EngineError::Api {
            status: status_code,
            message,
        },
        other => EngineError::Transport(other),
    }
}

#[async_trait]
impl Engine for DockerDriver {
    async fn list(&self) -> Result<Vec<String>, EngineError> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await
            .map_err(normalize)?;

        Ok(containers
            .into_iter()
            .filter_map(|c| c.id)
            .collect())
    }

    async fn pull(&self, image: &str) -> Result<(), EngineError> {
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        // The stream carries pull progress; the image is only guaranteed to
        // be present locally once it is exhausted.
        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(step) = progress.next().await {
            let info = step.map_err(normalize)?;
            if let Some(status) = info.status {
                debug!(image = %image, status = %status, "pull progress");
            }
        }

        Ok(())
    }

    async fn create(&self, spec: &MonitorSpec) -> Result<String, EngineError> {
        let (label_key, label_value) = spec.label();
        let labels: HashMap<String, String> =
            HashMap::from([(label_key.to_string(), label_value.to_string())]);

        let config = ContainerConfig::<String> {
            image: Some(spec.image.clone()),
            env: Some(spec.env.clone()),
            labels: Some(labels),
            attach_stdin: Some(false),
            open_stdin: Some(false),
            host_config: Some(HostConfig {
                network_mode: Some(spec.network_mode()),
                cap_add: Some(vec!["NET_ADMIN".to_string(), "NET_RAW".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(normalize)?;

        Ok(response.id)
    }

    async fn start(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container::<String>(id, None)
            .await
            .map_err(normalize)
    }

    async fn stop(&self, id: &str, deadline_secs: i64) -> Result<(), EngineError> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: deadline_secs }))
            .await
            .map_err(normalize)
    }

    async fn remove(&self, id: &str, force: bool) -> Result<(), EngineError> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await
            .map_err(normalize)
    }

    async fn attach_network(&self, container_id: &str, network: &str) -> Result<(), EngineError> {
        self.docker
            .connect_network(
                network,
                ConnectNetworkOptions {
                    container: container_id.to_string(),
                    endpoint_config: EndpointSettings::default(),
                },
            )
            .await
            .map_err(normalize)
    }

    async fn detach_network(&self, container_id: &str, network: &str) -> Result<(), EngineError> {
        self.docker
            .disconnect_network(
                network,
                DisconnectNetworkOptions {
                    container: container_id.to_string(),
                    force: false,
                },
            )
            .await
            .map_err(normalize)
    }
}
