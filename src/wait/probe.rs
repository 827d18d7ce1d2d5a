//! Read-only runtime access for readiness checks.

use crate::engine::{ContainerInspection, EngineClient, EngineFuture, collect_logs};
use crate::spec::PortSpec;

/// Read-only view of a started container used by wait strategies.
///
/// Probes never mutate the container; every call is a fresh query.
pub trait ReadinessProbe: Send + Sync {
    /// Return the container being probed.
    fn container_id(&self) -> &str;

    /// Inspect the container's current state.
    fn inspect(&self) -> EngineFuture<'_, ContainerInspection>;

    /// Read the container's logs from the start.
    fn logs(&self) -> EngineFuture<'_, Vec<u8>>;
}

/// Probe backed by an [`EngineClient`].
#[derive(Debug)]
pub struct EngineProbe<'a, C: ?Sized> {
    client: &'a C,
    container_id: &'a str,
}

impl<'a, C: EngineClient + ?Sized> EngineProbe<'a, C> {
    /// Probe `container_id` through `client`.
    #[must_use]
    pub const fn new(client: &'a C, container_id: &'a str) -> Self {
        Self {
            client,
            container_id,
        }
    }
}

impl<C: EngineClient + ?Sized> ReadinessProbe for EngineProbe<'_, C> {
    fn container_id(&self) -> &str {
        self.container_id
    }

    fn inspect(&self) -> EngineFuture<'_, ContainerInspection> {
        self.client.inspect_container(self.container_id)
    }

    fn logs(&self) -> EngineFuture<'_, Vec<u8>> {
        Box::pin(collect_logs(self.client, self.container_id))
    }
}

/// Snapshot handed to a custom readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeView {
    container_id: String,
    inspection: ContainerInspection,
    logs: Vec<u8>,
}

impl RuntimeView {
    /// Assemble a snapshot.
    #[must_use]
    pub const fn new(container_id: String, inspection: ContainerInspection, logs: Vec<u8>) -> Self {
        Self {
            container_id,
            inspection,
            logs,
        }
    }

    /// Return the container ID.
    #[must_use]
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Return the inspected state.
    #[must_use]
    pub const fn inspection(&self) -> &ContainerInspection {
        &self.inspection
    }

    /// Host port published for a container port.
    #[must_use]
    pub fn mapped_port(&self, port: impl Into<PortSpec>) -> Option<u16> {
        self.inspection.host_port(port.into())
    }

    /// Return the raw logs.
    #[must_use]
    pub fn logs(&self) -> &[u8] {
        &self.logs
    }

    /// Return the logs decoded lossily as UTF-8.
    #[must_use]
    pub fn logs_text(&self) -> String {
        String::from_utf8_lossy(&self.logs).into_owned()
    }
}
