//! [`EngineClient`] implementation backed by a `Bollard` Docker client.
//!
//! Works against Docker and Podman (through its Docker-compatible API).
//! Engine errors are mapped onto [`ContainerError`] variants carrying the
//! container ID so failures can be attributed to a scenario step.

mod create_body;

use std::collections::BTreeMap;

use bollard::Docker;
use bollard::body_full;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerInspectResponse, NetworkConnectRequest, PortMap};
use bollard::query_parameters::{
    InspectContainerOptions, LogsOptionsBuilder, RemoveContainerOptionsBuilder,
    StartContainerOptions, StopContainerOptionsBuilder, UploadToContainerOptionsBuilder,
};
use futures_util::StreamExt;
use tracing::debug;

use super::client::{EngineClient, EngineFuture, LogStream};
use super::inspection::{ContainerInspection, EngineStatus, HostBinding};
use crate::error::ContainerError;
use crate::spec::{ContainerSpec, PortSpec};

pub use create_body::MANAGED_LABEL;

/// Seconds the engine waits for a graceful stop before killing.
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 10;

const HTTP_NOT_MODIFIED: u16 = 304;
const HTTP_NOT_FOUND: u16 = 404;

/// Container engine reached through the Docker API.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    client: Docker,
    stop_timeout_secs: u64,
}

impl DockerEngine {
    /// Wrap a connected client.
    #[must_use]
    pub const fn new(client: Docker) -> Self {
        Self {
            client,
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
        }
    }

    /// Set the graceful stop timeout used during teardown.
    #[must_use]
    pub const fn with_stop_timeout(mut self, seconds: u64) -> Self {
        self.stop_timeout_secs = seconds;
        self
    }

    /// Return the underlying client.
    #[must_use]
    pub const fn client(&self) -> &Docker {
        &self.client
    }

    async fn stop(&self, container_id: &str) -> Result<(), ContainerError> {
        let timeout = i32::try_from(self.stop_timeout_secs).unwrap_or(i32::MAX);
        let options = StopContainerOptionsBuilder::new().t(timeout).build();

        match self.client.stop_container(container_id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(error)
                if has_status(&error, HTTP_NOT_MODIFIED) || has_status(&error, HTTP_NOT_FOUND) =>
            {
                debug!(container_id, %error, "container already stopped");
                Ok(())
            }
            Err(error) => Err(ContainerError::StopFailed {
                container_id: String::from(container_id),
                message: error.to_string(),
            }),
        }
    }

    async fn connect_networks(
        &self,
        container_id: &str,
        networks: &[String],
    ) -> Result<(), BollardError> {
        for network in networks {
            let request = NetworkConnectRequest {
                container: String::from(container_id),
                endpoint_config: None,
            };
            self.client.connect_network(network, request).await?;
            debug!(container_id, network = %network, "attached network");
        }
        Ok(())
    }

    async fn remove(&self, container_id: &str) -> Result<(), ContainerError> {
        let options = RemoveContainerOptionsBuilder::new()
            .force(true)
            .v(true)
            .build();

        match self
            .client
            .remove_container(container_id, Some(options))
            .await
        {
            Ok(()) => Ok(()),
            Err(error) if has_status(&error, HTTP_NOT_FOUND) => {
                debug!(container_id, "container already removed");
                Ok(())
            }
            Err(error) => Err(ContainerError::StopFailed {
                container_id: String::from(container_id),
                message: error.to_string(),
            }),
        }
    }
}

impl EngineClient for DockerEngine {
    fn create_container(&self, spec: &ContainerSpec) -> EngineFuture<'_, String> {
        let options = create_body::build_create_options(spec.name());
        let body = create_body::build_create_body(spec);
        let image = String::from(spec.image());
        let networks = create_body::additional_networks(spec).to_vec();

        Box::pin(async move {
            let response = self
                .client
                .create_container(options, body)
                .await
                .map_err(|error| ContainerError::CreateFailed {
                    image: image.clone(),
                    message: error.to_string(),
                })?;

            if let Err(error) = self.connect_networks(&response.id, &networks).await {
                // The caller never receives the ID, so nothing else would
                // remove this container.
                if let Err(cleanup) = self.remove(&response.id).await {
                    debug!(container_id = %response.id, %cleanup, "cleanup after failed network attach");
                }
                return Err(ContainerError::CreateFailed {
                    image,
                    message: error.to_string(),
                });
            }

            Ok(response.id)
        })
    }

    fn copy_to_container(&self, container_id: &str, archive: Vec<u8>) -> EngineFuture<'_, ()> {
        let owned_id = String::from(container_id);

        Box::pin(async move {
            let options = UploadToContainerOptionsBuilder::new().path("/").build();

            self.client
                .upload_to_container(&owned_id, Some(options), body_full(archive.into()))
                .await
                .map_err(|error| ContainerError::CopyFailed {
                    container_id: owned_id.clone(),
                    message: error.to_string(),
                })
        })
    }

    fn start_container(&self, container_id: &str) -> EngineFuture<'_, ()> {
        let owned_id = String::from(container_id);

        Box::pin(async move {
            self.client
                .start_container(&owned_id, None::<StartContainerOptions>)
                .await
                .map_err(|error| ContainerError::StartFailed {
                    container_id: owned_id.clone(),
                    message: error.to_string(),
                })
        })
    }

    fn stop_and_remove(&self, container_id: &str) -> EngineFuture<'_, ()> {
        let owned_id = String::from(container_id);

        Box::pin(async move {
            // Removal is attempted even when the stop fails; force-removal
            // kills a container that ignored the stop request.
            let stopped = self.stop(&owned_id).await;
            self.remove(&owned_id).await?;
            stopped
        })
    }

    fn inspect_container(&self, container_id: &str) -> EngineFuture<'_, ContainerInspection> {
        let owned_id = String::from(container_id);

        Box::pin(async move {
            let response = self
                .client
                .inspect_container(&owned_id, None::<InspectContainerOptions>)
                .await
                .map_err(|error| map_inspect_error(&owned_id, &error))?;

            Ok(inspection_from_response(&response))
        })
    }

    fn stream_logs(&self, container_id: &str) -> LogStream<'_> {
        let owned_id = String::from(container_id);
        let options = LogsOptionsBuilder::new()
            .stdout(true)
            .stderr(true)
            .follow(false)
            .build();

        let stream = self
            .client
            .logs(container_id, Some(options))
            .map(move |chunk| {
                chunk
                    .map(|output| output.into_bytes().to_vec())
                    .map_err(|error| ContainerError::LogsFailed {
                        container_id: owned_id.clone(),
                        message: error.to_string(),
                    })
            });

        Box::pin(stream)
    }
}

fn has_status(error: &BollardError, expected: u16) -> bool {
    matches!(
        error,
        BollardError::DockerResponseServerError { status_code, .. } if *status_code == expected
    )
}

fn map_inspect_error(container_id: &str, error: &BollardError) -> ContainerError {
    if has_status(error, HTTP_NOT_FOUND) {
        return ContainerError::NotFound {
            container_id: String::from(container_id),
        };
    }

    ContainerError::InspectFailed {
        container_id: String::from(container_id),
        message: error.to_string(),
    }
}

fn inspection_from_response(response: &ContainerInspectResponse) -> ContainerInspection {
    let state = response.state.as_ref();
    let status = state
        .and_then(|value| value.status.as_ref())
        .map_or(EngineStatus::Unknown, |value| {
            EngineStatus::from_engine(&value.to_string())
        });
    let exit_code = state
        .and_then(|value| value.exit_code)
        .filter(|_| status.has_exited());

    let settings = response.network_settings.as_ref();
    let ports = settings
        .and_then(|value| value.ports.as_ref())
        .map(published_ports)
        .unwrap_or_default();
    let ip_address = settings
        .and_then(|value| value.networks.as_ref())
        .and_then(|networks| {
            let mut names: Vec<&String> = networks.keys().collect();
            names.sort_unstable();
            names
                .into_iter()
                .filter_map(|name| networks.get(name))
                .find_map(|endpoint| endpoint.ip_address.clone())
                .filter(|address| !address.is_empty())
        });

    ContainerInspection {
        status,
        exit_code,
        ports,
        ip_address,
    }
}

fn published_ports(port_map: &PortMap) -> BTreeMap<PortSpec, HostBinding> {
    port_map
        .iter()
        .filter_map(|(raw_port, bindings)| {
            let port = PortSpec::parse(raw_port).ok()?;
            let binding = bindings.as_ref()?.iter().find_map(|binding| {
                let host_port = binding.host_port.as_deref()?.parse::<u16>().ok()?;
                Some(HostBinding {
                    host_ip: binding.host_ip.clone().unwrap_or_default(),
                    host_port,
                })
            })?;
            Some((port, binding))
        })
        .collect()
}
