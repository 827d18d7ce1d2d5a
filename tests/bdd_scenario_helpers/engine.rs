//! A stub engine whose containers are configured per image.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use dockhand::engine::{
    ContainerInspection, EngineClient, EngineFuture, EngineStatus, HostBinding, LogStream,
};
use dockhand::error::ContainerError;
use dockhand::spec::{ContainerSpec, PortSpec};
use futures_util::stream;

/// How containers created from one image behave.
#[derive(Debug, Clone, Default)]
pub(crate) struct StubImage {
    /// Container port and the host port it is published on.
    pub(crate) published: Option<(u16, u16)>,
    /// Whether starting the container fails.
    pub(crate) fail_start: bool,
}

#[derive(Debug, Default)]
struct StubLedger {
    started: HashSet<String>,
    removed: Vec<String>,
}

/// Engine returning `<image>-id` container IDs.
#[derive(Debug, Default)]
pub(crate) struct StubEngine {
    images: BTreeMap<String, StubImage>,
    ledger: Mutex<StubLedger>,
}

impl StubEngine {
    pub(crate) fn new(images: BTreeMap<String, StubImage>) -> Self {
        Self {
            images,
            ledger: Mutex::default(),
        }
    }

    /// Container IDs passed to `stop_and_remove`, in call order.
    pub(crate) fn removed(&self) -> Vec<String> {
        self.ledger().removed.clone()
    }

    fn ledger(&self) -> MutexGuard<'_, StubLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn image_of(container_id: &str) -> &str {
        container_id.strip_suffix("-id").unwrap_or(container_id)
    }
}

impl EngineClient for StubEngine {
    fn create_container(&self, spec: &ContainerSpec) -> EngineFuture<'_, String> {
        let id = format!("{}-id", spec.image());
        Box::pin(async move { Ok(id) })
    }

    fn copy_to_container(&self, _container_id: &str, _archive: Vec<u8>) -> EngineFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn start_container(&self, container_id: &str) -> EngineFuture<'_, ()> {
        let image = self.images.get(Self::image_of(container_id));
        let result = if image.is_some_and(|stub| stub.fail_start) {
            Err(ContainerError::StartFailed {
                container_id: String::from(container_id),
                message: String::from("stubbed start failure"),
            })
        } else {
            self.ledger().started.insert(String::from(container_id));
            Ok(())
        };
        Box::pin(async move { result })
    }

    fn stop_and_remove(&self, container_id: &str) -> EngineFuture<'_, ()> {
        self.ledger().removed.push(String::from(container_id));
        Box::pin(async { Ok(()) })
    }

    fn inspect_container(&self, container_id: &str) -> EngineFuture<'_, ContainerInspection> {
        let ledger = self.ledger();
        let result = if ledger.removed.iter().any(|id| id == container_id) {
            Err(ContainerError::NotFound {
                container_id: String::from(container_id),
            })
        } else if ledger.started.contains(container_id) {
            let ports = self
                .images
                .get(Self::image_of(container_id))
                .and_then(|stub| stub.published)
                .map(|(port, host_port)| {
                    (
                        PortSpec::tcp(port),
                        HostBinding {
                            host_ip: String::from("0.0.0.0"),
                            host_port,
                        },
                    )
                })
                .into_iter()
                .collect::<BTreeMap<_, _>>();
            Ok(ContainerInspection {
                status: EngineStatus::Running,
                ports,
                ..ContainerInspection::default()
            })
        } else {
            Ok(ContainerInspection {
                status: EngineStatus::Created,
                ..ContainerInspection::default()
            })
        };
        drop(ledger);
        Box::pin(async move { result })
    }

    fn stream_logs(&self, _container_id: &str) -> LogStream<'_> {
        Box::pin(stream::empty())
    }
}
