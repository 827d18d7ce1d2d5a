//! In-memory engine used by unit tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::stream;

use super::client::{EngineClient, EngineFuture, LogStream};
use super::inspection::{ContainerInspection, EngineStatus, HostBinding};
use crate::error::ContainerError;
use crate::spec::{ContainerSpec, PortSpec};

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EngineCall {
    Create(String),
    Copy(String),
    Start(String),
    StopAndRemove(String),
}

/// Scripted behaviour for every container created from one image.
#[derive(Debug, Clone)]
pub(crate) struct FakeBehaviour {
    create_error: Option<String>,
    start_error: Option<String>,
    stop_error: Option<String>,
    copy_error: Option<String>,
    start_delay: Duration,
    stop_delay: Duration,
    started: ContainerInspection,
    logs: Vec<u8>,
}

impl FakeBehaviour {
    /// Runs once started, with no published ports.
    pub(crate) fn running() -> Self {
        Self {
            create_error: None,
            start_error: None,
            stop_error: None,
            copy_error: None,
            start_delay: Duration::ZERO,
            stop_delay: Duration::ZERO,
            started: ContainerInspection {
                status: EngineStatus::Running,
                ..ContainerInspection::default()
            },
            logs: vec![],
        }
    }

    pub(crate) fn with_port(mut self, port: u16, host_port: u16) -> Self {
        self.started.ports.insert(
            PortSpec::tcp(port),
            HostBinding {
                host_ip: String::from("0.0.0.0"),
                host_port,
            },
        );
        self
    }

    pub(crate) fn with_ip(mut self, ip: &str) -> Self {
        self.started.ip_address = Some(String::from(ip));
        self
    }

    pub(crate) fn exited(mut self, code: i64) -> Self {
        self.started.status = EngineStatus::Exited;
        self.started.exit_code = Some(code);
        self
    }

    pub(crate) fn with_logs(mut self, logs: &str) -> Self {
        self.logs = logs.as_bytes().to_vec();
        self
    }

    pub(crate) fn failing_create(mut self, message: &str) -> Self {
        self.create_error = Some(String::from(message));
        self
    }

    pub(crate) fn failing_start(mut self, message: &str) -> Self {
        self.start_error = Some(String::from(message));
        self
    }

    pub(crate) fn failing_stop(mut self, message: &str) -> Self {
        self.stop_error = Some(String::from(message));
        self
    }

    pub(crate) fn failing_copy(mut self, message: &str) -> Self {
        self.copy_error = Some(String::from(message));
        self
    }

    /// Delay before a start request takes effect.
    pub(crate) const fn slow_start(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Delay before a stop-and-remove request takes effect.
    pub(crate) const fn slow_stop(mut self, delay: Duration) -> Self {
        self.stop_delay = delay;
        self
    }
}

#[derive(Debug)]
struct FakeContainer {
    image: String,
    started: bool,
    removed: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    behaviours: HashMap<String, FakeBehaviour>,
    containers: HashMap<String, FakeContainer>,
    calls: Vec<EngineCall>,
}

/// Engine whose containers follow per-image scripts. Container IDs are
/// `<image>-id`, so each image should be created once per test.
#[derive(Debug, Default)]
pub(crate) struct FakeEngine {
    state: Mutex<FakeState>,
}

impl FakeEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_image(self, image: &str, behaviour: FakeBehaviour) -> Self {
        self.lock()
            .behaviours
            .insert(String::from(image), behaviour);
        self
    }

    pub(crate) fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    pub(crate) fn stopped_ids(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                EngineCall::StopAndRemove(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn created_images(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                EngineCall::Create(image) => Some(image.clone()),
                _ => None,
            })
            .collect()
    }

    /// IDs of containers whose removal completed, sorted.
    pub(crate) fn removed_ids(&self) -> Vec<String> {
        let mut removed: Vec<String> = self
            .lock()
            .containers
            .iter()
            .filter(|(_, container)| container.removed)
            .map(|(id, _)| id.clone())
            .collect();
        removed.sort_unstable();
        removed
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn behaviour_for(state: &FakeState, container_id: &str) -> Option<FakeBehaviour> {
        let container = state.containers.get(container_id)?;
        Some(
            state
                .behaviours
                .get(&container.image)
                .cloned()
                .unwrap_or_else(FakeBehaviour::running),
        )
    }
}

impl EngineClient for FakeEngine {
    fn create_container(&self, spec: &ContainerSpec) -> EngineFuture<'_, String> {
        let image = String::from(spec.image());
        let mut state = self.lock();
        state.calls.push(EngineCall::Create(image.clone()));

        let create_error = state
            .behaviours
            .get(&image)
            .and_then(|behaviour| behaviour.create_error.clone());
        let result = if let Some(message) = create_error {
            Err(ContainerError::CreateFailed {
                image,
                message,
            })
        } else {
            let id = format!("{image}-id");
            state.containers.insert(
                id.clone(),
                FakeContainer {
                    image,
                    started: false,
                    removed: false,
                },
            );
            Ok(id)
        };

        Box::pin(async move { result })
    }

    fn copy_to_container(&self, container_id: &str, _archive: Vec<u8>) -> EngineFuture<'_, ()> {
        let mut state = self.lock();
        state.calls.push(EngineCall::Copy(String::from(container_id)));
        let result = match Self::behaviour_for(&state, container_id)
            .and_then(|behaviour| behaviour.copy_error)
        {
            Some(message) => Err(ContainerError::CopyFailed {
                container_id: String::from(container_id),
                message,
            }),
            None => Ok(()),
        };
        Box::pin(async move { result })
    }

    fn start_container(&self, container_id: &str) -> EngineFuture<'_, ()> {
        let owned_id = String::from(container_id);
        let behaviour = {
            let mut state = self.lock();
            state.calls.push(EngineCall::Start(owned_id.clone()));
            Self::behaviour_for(&state, container_id)
        };

        Box::pin(async move {
            let scripted = behaviour.ok_or_else(|| ContainerError::NotFound {
                container_id: owned_id.clone(),
            })?;
            if !scripted.start_delay.is_zero() {
                tokio::time::sleep(scripted.start_delay).await;
            }
            if let Some(message) = scripted.start_error {
                return Err(ContainerError::StartFailed {
                    container_id: owned_id,
                    message,
                });
            }
            if let Some(container) = self.lock().containers.get_mut(&owned_id) {
                container.started = true;
            }
            Ok(())
        })
    }

    fn stop_and_remove(&self, container_id: &str) -> EngineFuture<'_, ()> {
        let owned_id = String::from(container_id);
        let behaviour = {
            let mut state = self.lock();
            state.calls.push(EngineCall::StopAndRemove(owned_id.clone()));
            Self::behaviour_for(&state, container_id)
        };

        Box::pin(async move {
            let (stop_delay, stop_error) = behaviour
                .map(|scripted| (scripted.stop_delay, scripted.stop_error))
                .unwrap_or_default();
            if !stop_delay.is_zero() {
                tokio::time::sleep(stop_delay).await;
            }
            if let Some(container) = self.lock().containers.get_mut(&owned_id) {
                container.removed = true;
            }

            stop_error.map_or(Ok(()), |message| {
                Err(ContainerError::StopFailed {
                    container_id: owned_id,
                    message,
                })
            })
        })
    }

    fn inspect_container(&self, container_id: &str) -> EngineFuture<'_, ContainerInspection> {
        let state = self.lock();
        let result = match (
            state.containers.get(container_id),
            Self::behaviour_for(&state, container_id),
        ) {
            (Some(container), Some(behaviour)) if !container.removed => {
                if container.started {
                    Ok(behaviour.started)
                } else {
                    Ok(ContainerInspection {
                        status: EngineStatus::Created,
                        ..ContainerInspection::default()
                    })
                }
            }
            _ => Err(ContainerError::NotFound {
                container_id: String::from(container_id),
            }),
        };
        Box::pin(async move { result })
    }

    fn stream_logs(&self, container_id: &str) -> LogStream<'_> {
        let state = self.lock();
        let chunks: Vec<Result<Vec<u8>, ContainerError>> = match Self::behaviour_for(&state, container_id) {
            Some(behaviour) => behaviour
                .logs
                .split_inclusive(|byte| *byte == b'\n')
                .map(|line| Ok(line.to_vec()))
                .collect(),
            None => vec![Err(ContainerError::NotFound {
                container_id: String::from(container_id),
            })],
        };
        Box::pin(stream::iter(chunks))
    }
}
