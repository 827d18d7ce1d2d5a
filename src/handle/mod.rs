//! Lifecycle of one ephemeral container.
//!
//! A [`ContainerHandle`] moves through
//! `Created → Starting → Running → Terminated`; `Failed` is reachable from
//! every non-terminal state and is itself terminal. A failed handle still
//! owes one best-effort cleanup, which [`ContainerHandle::terminate`]
//! performs.
//!
//! Transitions are serialized by a mutex that is never held across an
//! `.await`. Engine queries run without the lock, so reading logs never
//! blocks a concurrent `terminate`.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::{
    Address, ContainerInspection, EngineClient, build_copy_archive, collect_logs,
};
use crate::error::{ContainerError, HandleError, StartupError, TeardownError};
use crate::spec::ContainerSpec;
use crate::wait::{
    CancelSignal, CancelTrigger, DEFAULT_STARTUP_TIMEOUT, EngineProbe, PollSchedule, Readiness,
    wait_until_ready, wait_until_running,
};

/// Lifecycle state of a [`ContainerHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Created in the engine, not started.
    Created,
    /// Started; readiness not yet confirmed.
    Starting,
    /// Ready for use.
    Running,
    /// Stopped and removed.
    Terminated,
    /// Creation, startup, or readiness failed.
    Failed,
}

impl LifecycleState {
    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated | Self::Failed)
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Terminated => "terminated",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables shared by the handles of one scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleSettings {
    /// Poll cadence for readiness checks.
    pub schedule: PollSchedule,
    /// Readiness timeout applied when a spec has no wait strategy.
    pub default_timeout: Duration,
    /// Whether `terminate` captures a final log snapshot.
    pub capture_logs: bool,
}

impl Default for HandleSettings {
    fn default() -> Self {
        Self {
            schedule: PollSchedule::default(),
            default_timeout: DEFAULT_STARTUP_TIMEOUT,
            capture_logs: true,
        }
    }
}

#[derive(Debug)]
struct HandleInner {
    state: LifecycleState,
    failure: Option<StartupError>,
    released: bool,
    last_known: Option<ContainerInspection>,
    final_logs: Option<Vec<u8>>,
}

/// One container owned by a scenario.
pub struct ContainerHandle<C: ?Sized> {
    client: Arc<C>,
    id: String,
    spec: Arc<ContainerSpec>,
    settings: HandleSettings,
    inner: Mutex<HandleInner>,
    abort: CancelTrigger,
}

impl<C: ?Sized> fmt::Debug for ContainerHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerHandle")
            .field("id", &self.id)
            .field("image", &self.spec.image())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<C: EngineClient + ?Sized> ContainerHandle<C> {
    /// Create the container with default settings.
    ///
    /// # Errors
    ///
    /// See [`Self::create_with`].
    pub async fn create(client: Arc<C>, spec: ContainerSpec) -> Result<Self, ContainerError> {
        Self::create_with(client, spec, HandleSettings::default()).await
    }

    /// Create the container and stage its files.
    ///
    /// When staging fails the engine object is removed before the error is
    /// returned, so no container outlives a failed create.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::CreateFailed` when the engine rejects the
    /// spec, or `ContainerError::CopyFailed` when files cannot be staged.
    pub async fn create_with(
        client: Arc<C>,
        spec: ContainerSpec,
        settings: HandleSettings,
    ) -> Result<Self, ContainerError> {
        let id = client.create_container(&spec).await?;
        info!(container_id = %id, image = spec.image(), "container created");

        if !spec.files().is_empty() {
            if let Err(error) = stage_files(client.as_ref(), &id, &spec).await {
                if let Err(cleanup) = client.stop_and_remove(&id).await {
                    warn!(container_id = %id, error = %cleanup, "cleanup after failed copy failed");
                }
                return Err(error);
            }
        }

        Ok(Self {
            client,
            id,
            spec: Arc::new(spec),
            settings,
            inner: Mutex::new(HandleInner {
                state: LifecycleState::Created,
                failure: None,
                released: false,
                last_known: None,
                final_logs: None,
            }),
            abort: CancelTrigger::new(),
        })
    }

    /// Start the container and block until its wait strategy reports ready.
    ///
    /// # Errors
    ///
    /// Returns `StartupError::InvalidState` unless the handle is `Created`.
    /// Every other error leaves the handle `Failed` with that error as its
    /// cause: `Engine` when the engine refuses to start the container,
    /// `ReadinessTimeout` when the strategy times out, `ReadinessFailed`
    /// when the container disappears or exits, and `Cancelled` when `cancel`
    /// fires or the handle is terminated concurrently.
    pub async fn start(&self, cancel: &CancelSignal) -> Result<(), StartupError> {
        {
            let mut inner = self.lock();
            if inner.state != LifecycleState::Created || inner.released {
                return Err(StartupError::InvalidState {
                    container_id: self.id.clone(),
                    state: inner.state,
                });
            }
            inner.state = LifecycleState::Starting;
        }

        let abort = self.abort.signal();
        if cancel.is_cancelled() || abort.is_cancelled() {
            return Err(self.fail(self.cancelled()));
        }

        info!(container_id = %self.id, "starting container");
        tokio::select! {
            started = self.client.start_container(&self.id) => {
                if let Err(error) = started {
                    return Err(self.fail(StartupError::Engine(error)));
                }
            }
            () = abort.cancelled() => return Err(self.fail(self.cancelled())),
        }

        let readiness = tokio::select! {
            outcome = self.await_readiness(cancel) => outcome,
            () = abort.cancelled() => Readiness::Cancelled,
        };

        match readiness {
            Readiness::Ready => self.mark_running(),
            Readiness::TimedOut { waited } => Err(self.fail(StartupError::ReadinessTimeout {
                container_id: self.id.clone(),
                waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
            })),
            Readiness::Errored(source) => Err(self.fail(StartupError::ReadinessFailed {
                container_id: self.id.clone(),
                source,
            })),
            Readiness::Cancelled => Err(self.fail(self.cancelled())),
        }
    }

    async fn await_readiness(&self, cancel: &CancelSignal) -> Readiness {
        let probe = EngineProbe::new(self.client.as_ref(), &self.id);
        match self.spec.wait_strategy() {
            Some(strategy) => {
                debug!(container_id = %self.id, strategy = strategy.kind(), "waiting for readiness");
                wait_until_ready(strategy, &probe, &self.settings.schedule, cancel).await
            }
            None => {
                wait_until_running(
                    self.settings.default_timeout,
                    &probe,
                    &self.settings.schedule,
                    cancel,
                )
                .await
            }
        }
    }

    fn mark_running(&self) -> Result<(), StartupError> {
        let mut inner = self.lock();
        if inner.released || inner.state.is_terminal() {
            // Terminated while the final readiness check was in flight.
            drop(inner);
            return Err(self.fail(self.cancelled()));
        }
        inner.state = LifecycleState::Running;
        drop(inner);

        info!(container_id = %self.id, "container ready");
        Ok(())
    }

    /// Record `error` as the failure cause unless one is already recorded,
    /// and return the recorded cause.
    fn fail(&self, error: StartupError) -> StartupError {
        let mut inner = self.lock();
        if let Some(existing) = &inner.failure {
            return existing.clone();
        }

        warn!(container_id = %self.id, %error, "container failed to start");
        inner.state = LifecycleState::Failed;
        inner.failure = Some(error.clone());
        error
    }

    fn cancelled(&self) -> StartupError {
        StartupError::Cancelled {
            container_id: self.id.clone(),
        }
    }

    /// Resolve where the running container can be reached.
    ///
    /// # Errors
    ///
    /// Returns `HandleError::NotReady` unless the handle is `Running`, or
    /// `HandleError::Engine` when the inspection fails.
    pub async fn inspect_address(&self) -> Result<Address, HandleError> {
        self.ensure_running()?;

        let inspection = self.client.inspect_container(&self.id).await?;
        let address = inspection.address();
        self.lock().last_known = Some(inspection);
        Ok(address)
    }

    /// Read the container's logs from the beginning.
    ///
    /// After termination this returns the snapshot captured by
    /// [`Self::terminate`], which is empty when log capture is disabled.
    ///
    /// # Errors
    ///
    /// Returns `HandleError::Engine` when the engine cannot stream logs.
    pub async fn logs(&self) -> Result<Vec<u8>, HandleError> {
        {
            let inner = self.lock();
            if inner.released {
                return Ok(inner.final_logs.clone().unwrap_or_default());
            }
        }

        Ok(collect_logs(self.client.as_ref(), &self.id).await?)
    }

    /// Exit code captured when the container was released.
    ///
    /// # Errors
    ///
    /// Returns `HandleError::NotTerminated` until [`Self::terminate`] has
    /// run.
    pub fn exit_code(&self) -> Result<Option<i64>, HandleError> {
        let inner = self.lock();
        if !inner.released {
            return Err(HandleError::NotTerminated {
                container_id: self.id.clone(),
                state: inner.state,
            });
        }

        Ok(inner
            .last_known
            .as_ref()
            .and_then(|inspection| inspection.exit_code))
    }

    fn ensure_running(&self) -> Result<(), HandleError> {
        let state = self.state();
        if state == LifecycleState::Running {
            Ok(())
        } else {
            Err(HandleError::NotReady {
                container_id: self.id.clone(),
                state,
            })
        }
    }
}

impl<C: EngineClient + ?Sized + 'static> ContainerHandle<C> {
    /// Stop and remove the container.
    ///
    /// The first call captures a final inspection and log snapshot
    /// (best-effort), aborts an in-flight `start`, and issues exactly one
    /// stop-and-remove. Later calls return `Ok(())` without touching the
    /// engine. A handle that was `Failed` stays `Failed`; a handle that was
    /// still `Starting` becomes `Failed` with a cancellation cause; every
    /// other handle becomes `Terminated`.
    ///
    /// The engine work runs on a spawned Tokio task, so the container is
    /// still removed when the returned future is dropped part-way.
    ///
    /// # Errors
    ///
    /// Returns `TeardownError` when the engine fails to stop or remove the
    /// container. The handle is considered released regardless.
    pub async fn terminate(&self) -> Result<(), TeardownError> {
        {
            let mut inner = self.lock();
            if inner.released {
                return Ok(());
            }
            inner.released = true;
        }
        self.abort.cancel();

        let release = tokio::spawn(release_container(
            Arc::clone(&self.client),
            self.id.clone(),
            self.settings.capture_logs,
        ));
        let released = release.await.unwrap_or_else(|error| Released {
            inspection: None,
            logs: None,
            outcome: Err(ContainerError::StopFailed {
                container_id: self.id.clone(),
                message: error.to_string(),
            }),
        });

        let mut inner = self.lock();
        if released.inspection.is_some() {
            inner.last_known = released.inspection;
        }
        inner.final_logs = released.logs;
        match inner.state {
            LifecycleState::Failed => {}
            LifecycleState::Starting => {
                inner.state = LifecycleState::Failed;
                inner.failure.get_or_insert_with(|| self.cancelled());
            }
            LifecycleState::Created | LifecycleState::Running | LifecycleState::Terminated => {
                inner.state = LifecycleState::Terminated;
            }
        }
        let state = inner.state;
        drop(inner);

        match released.outcome {
            Ok(()) => {
                info!(container_id = %self.id, %state, "container released");
                Ok(())
            }
            Err(source) => {
                warn!(container_id = %self.id, error = %source, "container teardown failed");
                Err(TeardownError {
                    container_id: self.id.clone(),
                    source,
                })
            }
        }
    }
}

/// What the engine reported while releasing a container.
struct Released {
    inspection: Option<ContainerInspection>,
    logs: Option<Vec<u8>>,
    outcome: Result<(), ContainerError>,
}

async fn release_container<C: EngineClient + ?Sized>(
    client: Arc<C>,
    id: String,
    capture_logs: bool,
) -> Released {
    let inspection = match client.inspect_container(&id).await {
        Ok(inspection) => Some(inspection),
        Err(error) => {
            debug!(container_id = %id, %error, "final inspection unavailable");
            None
        }
    };
    let logs = if capture_logs {
        match collect_logs(client.as_ref(), &id).await {
            Ok(logs) => Some(logs),
            Err(error) => {
                debug!(container_id = %id, %error, "final logs unavailable");
                None
            }
        }
    } else {
        None
    };

    let outcome = client.stop_and_remove(&id).await;
    Released {
        inspection,
        logs,
        outcome,
    }
}

impl<C: ?Sized> ContainerHandle<C> {
    /// Return the engine-assigned container ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Return the spec the container was created from.
    #[must_use]
    pub fn spec(&self) -> &ContainerSpec {
        &self.spec
    }

    /// Return the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lock().state
    }

    /// Return the startup failure, if the handle is `Failed`.
    #[must_use]
    pub fn failure(&self) -> Option<StartupError> {
        self.lock().failure.clone()
    }

    /// Return the most recent inspection.
    #[must_use]
    pub fn last_known(&self) -> Option<ContainerInspection> {
        self.lock().last_known.clone()
    }

    fn lock(&self) -> MutexGuard<'_, HandleInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn stage_files<C: EngineClient + ?Sized>(
    client: &C,
    container_id: &str,
    spec: &ContainerSpec,
) -> Result<(), ContainerError> {
    let archive = build_copy_archive(spec.files()).map_err(|error| ContainerError::CopyFailed {
        container_id: String::from(container_id),
        message: error.to_string(),
    })?;

    debug!(
        container_id,
        files = spec.files().len(),
        bytes = archive.len(),
        "staging files"
    );
    client.copy_to_container(container_id, archive).await
}
