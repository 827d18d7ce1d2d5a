//! Engine-neutral view of an inspected container.

use std::collections::BTreeMap;

use crate::spec::PortSpec;

const LOCALHOST: &str = "localhost";

/// Runtime status reported by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EngineStatus {
    /// Created but never started.
    Created,
    /// Process running.
    Running,
    /// Paused.
    Paused,
    /// Restarting under a restart policy.
    Restarting,
    /// Being removed.
    Removing,
    /// Process exited.
    Exited,
    /// Dead; the engine failed to stop or remove it cleanly.
    Dead,
    /// Status missing or not recognised.
    #[default]
    Unknown,
}

impl EngineStatus {
    /// Map the engine's status string.
    #[must_use]
    pub fn from_engine(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }

    /// Whether the process is running.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether the process has finished.
    #[must_use]
    pub const fn has_exited(self) -> bool {
        matches!(self, Self::Exited | Self::Dead)
    }
}

/// Where a container port is published on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBinding {
    /// Host interface address, as reported by the engine.
    pub host_ip: String,
    /// Host port.
    pub host_port: u16,
}

impl HostBinding {
    /// Host name clients should dial. Wildcard bindings map to `localhost`.
    #[must_use]
    pub fn dial_host(&self) -> &str {
        match self.host_ip.as_str() {
            "" | "0.0.0.0" | "::" | "[::]" => LOCALHOST,
            other => other,
        }
    }
}

/// Result of inspecting a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerInspection {
    /// Runtime status.
    pub status: EngineStatus,
    /// Exit code, once the process has exited.
    pub exit_code: Option<i64>,
    /// Published ports.
    pub ports: BTreeMap<PortSpec, HostBinding>,
    /// Container address on its first network, when attached.
    pub ip_address: Option<String>,
}

impl ContainerInspection {
    /// Host port published for `port`.
    #[must_use]
    pub fn host_port(&self, port: PortSpec) -> Option<u16> {
        self.ports.get(&port).map(|binding| binding.host_port)
    }

    /// Host name and port to dial `port` from the host.
    #[must_use]
    pub fn endpoint(&self, port: PortSpec) -> Option<(String, u16)> {
        self.ports
            .get(&port)
            .map(|binding| (String::from(binding.dial_host()), binding.host_port))
    }

    /// Collapse the inspection into the address a dependent step consumes.
    #[must_use]
    pub fn address(&self) -> Address {
        let host = self
            .ports
            .values()
            .next()
            .map_or(LOCALHOST, HostBinding::dial_host);

        Address {
            host: String::from(host),
            container_ip: self.ip_address.clone(),
            ports: self
                .ports
                .iter()
                .map(|(port, binding)| (*port, binding.host_port))
                .collect(),
        }
    }
}

/// Network location of a running container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    host: String,
    container_ip: Option<String>,
    ports: BTreeMap<PortSpec, u16>,
}

impl Address {
    /// Create an address.
    #[must_use]
    pub const fn new(
        host: String,
        container_ip: Option<String>,
        ports: BTreeMap<PortSpec, u16>,
    ) -> Self {
        Self {
            host,
            container_ip,
            ports,
        }
    }

    /// Host name to reach published ports from the host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Container IP, reachable from other containers on the same network.
    #[must_use]
    pub fn container_ip(&self) -> Option<&str> {
        self.container_ip.as_deref()
    }

    /// Host port published for a container port.
    #[must_use]
    pub fn mapped_port(&self, port: impl Into<PortSpec>) -> Option<u16> {
        self.ports.get(&port.into()).copied()
    }

    /// All published ports.
    #[must_use]
    pub const fn ports(&self) -> &BTreeMap<PortSpec, u16> {
        &self.ports
    }

    /// `host:port` for a published container port.
    #[must_use]
    pub fn endpoint(&self, port: impl Into<PortSpec>) -> Option<String> {
        self.mapped_port(port)
            .map(|host_port| format!("{}:{host_port}", self.host))
    }
}
