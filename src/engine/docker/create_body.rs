//! Translation of a validated [`ContainerSpec`] into `Bollard` create
//! payloads.

use std::collections::HashMap;

use bollard::models::{ContainerCreateBody, HostConfig, PortBinding};
use bollard::query_parameters::{CreateContainerOptions, CreateContainerOptionsBuilder};

use crate::spec::ContainerSpec;

/// Label attached to every container this crate creates.
pub const MANAGED_LABEL: &str = "dockhand.managed";

pub(super) fn build_create_options(name: Option<&str>) -> Option<CreateContainerOptions> {
    name.filter(|value| !value.trim().is_empty())
        .map(|container_name| {
            CreateContainerOptionsBuilder::new()
                .name(container_name)
                .build()
        })
}

pub(super) fn build_create_body(spec: &ContainerSpec) -> ContainerCreateBody {
    let env = spec.env_entries();

    ContainerCreateBody {
        image: Some(String::from(spec.image())),
        cmd: spec.cmd().map(<[String]>::to_vec),
        env: (!env.is_empty()).then_some(env),
        exposed_ports: build_exposed_ports(spec),
        labels: Some(HashMap::from([(
            String::from(MANAGED_LABEL),
            String::from("true"),
        )])),
        host_config: Some(build_host_config(spec)),
        ..ContainerCreateBody::default()
    }
}

fn build_exposed_ports(spec: &ContainerSpec) -> Option<Vec<String>> {
    (!spec.exposed_ports().is_empty()).then(|| {
        spec.exposed_ports()
            .iter()
            .map(ToString::to_string)
            .collect()
    })
}

/// Networks joined after creation; the first one is the network mode.
pub(super) fn additional_networks(spec: &ContainerSpec) -> &[String] {
    spec.networks().get(1..).unwrap_or_default()
}

fn build_host_config(spec: &ContainerSpec) -> HostConfig {
    // An empty binding asks the engine for an ephemeral host port.
    let port_bindings = (!spec.exposed_ports().is_empty()).then(|| {
        spec.exposed_ports()
            .iter()
            .map(|port| (port.to_string(), Some(vec![PortBinding::default()])))
            .collect()
    });

    HostConfig {
        port_bindings,
        network_mode: spec.networks().first().cloned(),
        ..HostConfig::default()
    }
}
