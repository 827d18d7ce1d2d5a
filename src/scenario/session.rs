//! Live scenario state and the report a finished run leaves behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::engine::{Address, EngineClient};
use crate::error::{HandleError, ScenarioError, ScenarioFailure, TeardownError};
use crate::handle::ContainerHandle;

/// A container created for a named step.
pub struct StepHandle<C: ?Sized> {
    name: String,
    handle: Arc<ContainerHandle<C>>,
}

impl<C: ?Sized> StepHandle<C> {
    /// Return the step name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the handle.
    #[must_use]
    pub const fn handle(&self) -> &Arc<ContainerHandle<C>> {
        &self.handle
    }
}

impl<C: ?Sized> Clone for StepHandle<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            handle: Arc::clone(&self.handle),
        }
    }
}

impl<C: ?Sized> std::fmt::Debug for StepHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepHandle")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .finish()
    }
}

/// The handles of a running scenario, in creation order.
///
/// Teardown releases them in reverse creation order. A session dropped
/// before teardown (for example because the scenario future was cancelled)
/// spawns best-effort teardown on the current Tokio runtime.
pub struct ScenarioSession<C: EngineClient + ?Sized + 'static> {
    handles: Mutex<Vec<StepHandle<C>>>,
    torn_down: AtomicBool,
}

impl<C: EngineClient + ?Sized + 'static> ScenarioSession<C> {
    pub(super) const fn new() -> Self {
        Self {
            handles: Mutex::new(Vec::new()),
            torn_down: AtomicBool::new(false),
        }
    }

    pub(super) fn push(&self, name: &str, handle: Arc<ContainerHandle<C>>) {
        self.lock().push(StepHandle {
            name: String::from(name),
            handle,
        });
    }

    /// Return the handle created for step `name`.
    #[must_use]
    pub fn handle(&self, name: &str) -> Option<Arc<ContainerHandle<C>>> {
        self.lock()
            .iter()
            .find(|step| step.name == name)
            .map(|step| Arc::clone(&step.handle))
    }

    /// Resolve the address of step `name`.
    ///
    /// Returns `None` when no such step exists.
    pub async fn address(&self, name: &str) -> Option<Result<Address, HandleError>> {
        let handle = self.handle(name)?;
        Some(handle.inspect_address().await)
    }

    /// Return every handle in creation order.
    #[must_use]
    pub fn handles(&self) -> Vec<StepHandle<C>> {
        self.lock().clone()
    }

    /// Release every handle in reverse creation order.
    ///
    /// A failure releasing one handle does not stop the others; every
    /// failure is returned. The session counts as torn down only once every
    /// handle was visited, so a teardown cut short by cancellation is
    /// finished by `Drop`.
    pub(super) async fn teardown(&self) -> Vec<TeardownError> {
        let handles = self.handles();
        let mut errors = vec![];

        for step in handles.iter().rev() {
            debug!(step = %step.name, container_id = step.handle.id(), "tearing down step");
            if let Err(error) = step.handle.terminate().await {
                errors.push(error);
            }
        }

        self.torn_down.store(true, Ordering::SeqCst);
        errors
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StepHandle<C>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: EngineClient + ?Sized + 'static> Drop for ScenarioSession<C> {
    fn drop(&mut self) {
        if self.torn_down.load(Ordering::SeqCst) {
            return;
        }

        let handles = std::mem::take(
            self.handles
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if handles.is_empty() {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                containers = handles.len(),
                "scenario dropped outside a Tokio runtime; containers were not released"
            );
            return;
        };

        warn!(
            containers = handles.len(),
            "scenario dropped before teardown; releasing containers in the background"
        );
        runtime.spawn(async move {
            for step in handles.iter().rev() {
                if let Err(error) = step.handle.terminate().await {
                    warn!(step = %step.name, %error, "background teardown failed");
                }
            }
        });
    }
}

/// Outcome of a scenario run.
pub struct ScenarioReport<C: ?Sized> {
    succeeded: Vec<String>,
    failure: Option<ScenarioFailure>,
    teardown_errors: Vec<TeardownError>,
    handles: Vec<StepHandle<C>>,
}

impl<C: ?Sized> std::fmt::Debug for ScenarioReport<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioReport")
            .field("succeeded", &self.succeeded)
            .field("failure", &self.failure)
            .field("teardown_errors", &self.teardown_errors)
            .field("handles", &self.handles)
            .finish()
    }
}

impl<C: ?Sized> ScenarioReport<C> {
    pub(super) const fn new(
        succeeded: Vec<String>,
        failure: Option<ScenarioFailure>,
        teardown_errors: Vec<TeardownError>,
        handles: Vec<StepHandle<C>>,
    ) -> Self {
        Self {
            succeeded,
            failure,
            teardown_errors,
            handles,
        }
    }

    /// Whether every step ran, the body succeeded, and every container was
    /// released.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.teardown_errors.is_empty()
    }

    /// Steps whose containers reached `Running`, in step order.
    #[must_use]
    pub fn succeeded(&self) -> &[String] {
        &self.succeeded
    }

    /// The failure that ended the scenario.
    #[must_use]
    pub const fn failure(&self) -> Option<&ScenarioFailure> {
        self.failure.as_ref()
    }

    /// Errors collected while releasing containers.
    #[must_use]
    pub fn teardown_errors(&self) -> &[TeardownError] {
        &self.teardown_errors
    }

    /// The released handles, in creation order.
    #[must_use]
    pub fn handles(&self) -> &[StepHandle<C>] {
        &self.handles
    }

    /// The released handle for step `name`.
    #[must_use]
    pub fn handle(&self, name: &str) -> Option<&Arc<ContainerHandle<C>>> {
        self.handles
            .iter()
            .find(|step| step.name == name)
            .map(|step| &step.handle)
    }

    /// Convert into a `Result`, keeping the report on success.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError` carrying the primary failure first and the
    /// teardown errors after it. When every step succeeded but teardown did
    /// not, the failure is `ScenarioFailure::Teardown`.
    pub fn into_result(self) -> Result<Self, ScenarioError> {
        match (&self.failure, self.teardown_errors.is_empty()) {
            (None, true) => Ok(self),
            (Some(failure), _) => Err(ScenarioError {
                failure: failure.clone(),
                teardown: self.teardown_errors,
            }),
            (None, false) => Err(ScenarioError {
                failure: ScenarioFailure::Teardown {
                    count: self.teardown_errors.len(),
                },
                teardown: self.teardown_errors,
            }),
        }
    }
}
