//! Multi-container scenarios with address dependencies and guaranteed
//! teardown.
//!
//! A [`Scenario`] is an ordered list of [`Step`]s. Each step's builder
//! receives the addresses of the steps it depends on and returns the spec to
//! create. Containers are created in step order; a step's startup runs on
//! its own task, so steps without a dependency between them start
//! concurrently. A step whose builder needs other steps' addresses waits
//! until those steps are running.
//!
//! On the first failure no further steps are created, in-flight readiness
//! waits are cancelled, and every container created so far is released in
//! reverse creation order. The resulting [`ScenarioReport`] keeps the primary
//! failure separate from any teardown errors.

mod session;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::task::{Id, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::engine::{Address, EngineClient};
use crate::error::{HandleError, ScenarioFailure, SpecError, StartupError};
use crate::handle::{ContainerHandle, HandleSettings};
use crate::spec::ContainerSpec;
use crate::wait::{CancelSignal, CancelTrigger};

pub use session::{ScenarioReport, ScenarioSession, StepHandle};

/// Grace period for in-flight startups to observe cancellation before their
/// tasks are aborted.
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Error type a scenario body may return.
pub type BodyError = Box<dyn std::error::Error + Send + Sync>;

type BuildFn = Box<dyn FnOnce(&ResolvedAddresses) -> Result<ContainerSpec, SpecError> + Send>;

/// Addresses of the dependency steps, keyed by step name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAddresses {
    addresses: BTreeMap<String, Address>,
}

impl ResolvedAddresses {
    /// Return the address of step `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Address> {
        self.addresses.get(name)
    }

    /// Iterate addresses in step-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Address)> {
        self.addresses
            .iter()
            .map(|(name, address)| (name.as_str(), address))
    }

    /// Number of resolved addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Whether no addresses were resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Dependencies {
    None,
    AllPrior,
    Named(Vec<String>),
}

/// One container in a scenario.
pub struct Step {
    name: String,
    build: BuildFn,
    dependencies: Dependencies,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

impl Step {
    /// Create an independent step.
    #[must_use]
    pub fn new<F>(name: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&ResolvedAddresses) -> Result<ContainerSpec, SpecError> + Send + 'static,
    {
        Self {
            name: name.into(),
            build: Box::new(build),
            dependencies: Dependencies::None,
        }
    }

    /// Depend on every earlier step.
    #[must_use]
    pub fn after_prior(mut self) -> Self {
        self.dependencies = Dependencies::AllPrior;
        self
    }

    /// Depend on the named earlier steps.
    #[must_use]
    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = Dependencies::Named(names.into_iter().map(Into::into).collect());
        self
    }

    /// Return the step name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// An ordered set of steps run against one engine.
#[derive(Debug)]
pub struct Scenario {
    steps: Vec<Step>,
    settings: HandleSettings,
    timeout: Option<Duration>,
    cancel: CancelSignal,
    cancel_grace: Duration,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new()
    }
}

impl Scenario {
    /// Create an empty scenario.
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: vec![],
            settings: HandleSettings::default(),
            timeout: None,
            cancel: CancelSignal::never(),
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }

    /// Append a step.
    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Bound the whole run, setup and body, by `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Abort the run when `cancel` fires.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replace the handle settings.
    #[must_use]
    pub const fn with_settings(mut self, settings: HandleSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the cancellation grace period.
    #[must_use]
    pub const fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    /// Run every step, then tear down.
    pub async fn run<C>(self, client: Arc<C>) -> ScenarioReport<C>
    where
        C: EngineClient + ?Sized + 'static,
    {
        self.run_with(client, |_session| Box::pin(async { Ok(()) }))
            .await
    }

    /// Run every step, run `body` against the live session, then tear down.
    ///
    /// The body runs only when every step reached `Running`. A body error
    /// becomes the scenario's primary failure.
    pub async fn run_with<C, B>(self, client: Arc<C>, body: B) -> ScenarioReport<C>
    where
        C: EngineClient + ?Sized + 'static,
        B: for<'s> FnOnce(&'s ScenarioSession<C>) -> BoxFuture<'s, Result<(), BodyError>>,
    {
        let Self {
            steps,
            settings,
            timeout,
            cancel,
            cancel_grace,
        } = self;

        let session = ScenarioSession::new();

        if let Err(error) = validate(&steps) {
            warn!(%error, "scenario definition rejected");
            return ScenarioReport::new(vec![], Some(ScenarioFailure::Invalid(error)), vec![], vec![]);
        }

        let interrupt = Interrupt {
            cancel,
            deadline: timeout.map(|limit| Instant::now() + limit),
        };
        let mut setup = Setup {
            client,
            settings,
            session: &session,
            interrupt: &interrupt,
            abort: CancelTrigger::new(),
            cancel_grace,
            tasks: JoinSet::new(),
            task_steps: HashMap::new(),
            names: steps.iter().map(|step| step.name.clone()).collect(),
            addresses: HashMap::new(),
        };

        let mut failure = setup.run(steps).await.err();
        let succeeded = setup.succeeded();
        drop(setup);

        if failure.is_none() {
            info!(steps = succeeded.len(), "scenario ready");
            failure = run_body(&session, &interrupt, body).await.err();
        }

        let teardown_errors = session.teardown().await;
        for error in &teardown_errors {
            warn!(%error, "teardown error");
        }
        match &failure {
            Some(error) => warn!(%error, "scenario failed"),
            None => info!("scenario finished"),
        }

        ScenarioReport::new(succeeded, failure, teardown_errors, session.handles())
    }

    /// Run every step from synchronous code, blocking on `runtime`.
    ///
    /// Must not be called from within an async context driven by the same
    /// runtime.
    #[must_use]
    pub fn run_blocking<C>(self, runtime: &tokio::runtime::Handle, client: Arc<C>) -> ScenarioReport<C>
    where
        C: EngineClient + ?Sized + 'static,
    {
        runtime.block_on(self.run(client))
    }
}

fn validate(steps: &[Step]) -> Result<(), SpecError> {
    let mut seen: HashSet<&str> = HashSet::new();

    for step in steps {
        if let Dependencies::Named(names) = &step.dependencies {
            if let Some(missing) = names.iter().find(|name| !seen.contains(name.as_str())) {
                return Err(SpecError::UnknownDependency {
                    step: step.name.clone(),
                    dependency: missing.clone(),
                });
            }
        }
        if !seen.insert(step.name.as_str()) {
            return Err(SpecError::DuplicateStep {
                name: step.name.clone(),
            });
        }
    }

    Ok(())
}

async fn run_body<C, B>(
    session: &ScenarioSession<C>,
    interrupt: &Interrupt,
    body: B,
) -> Result<(), ScenarioFailure>
where
    C: EngineClient + ?Sized + 'static,
    B: for<'s> FnOnce(&'s ScenarioSession<C>) -> BoxFuture<'s, Result<(), BodyError>>,
{
    let outcome = tokio::select! {
        finished = body(session) => finished,
        () = interrupt.fired() => return Err(ScenarioFailure::Cancelled),
    };

    outcome.map_err(|error| ScenarioFailure::Body {
        message: error.to_string(),
    })
}

/// External cancellation plus an optional deadline.
struct Interrupt {
    cancel: CancelSignal,
    deadline: Option<Instant>,
}

impl Interrupt {
    fn has_fired(&self) -> bool {
        self.cancel.is_cancelled()
            || self
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }

    async fn fired(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.cancel.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.cancel.cancelled().await,
        }
    }
}

type StartOutcome = (usize, Result<Address, StartupError>);

/// Mutable state of one scenario setup.
struct Setup<'r, C: EngineClient + ?Sized + 'static> {
    client: Arc<C>,
    settings: HandleSettings,
    session: &'r ScenarioSession<C>,
    interrupt: &'r Interrupt,
    abort: CancelTrigger,
    cancel_grace: Duration,
    tasks: JoinSet<StartOutcome>,
    task_steps: HashMap<Id, usize>,
    names: Vec<String>,
    addresses: HashMap<usize, Address>,
}

impl<C: EngineClient + ?Sized + 'static> Setup<'_, C> {
    async fn run(&mut self, steps: Vec<Step>) -> Result<(), ScenarioFailure> {
        let outcome = self.create_and_start(steps).await;
        if outcome.is_err() {
            self.halt().await;
        }
        outcome
    }

    async fn create_and_start(&mut self, steps: Vec<Step>) -> Result<(), ScenarioFailure> {
        for (index, step) in steps.into_iter().enumerate() {
            let dependencies = self.dependency_indices(index, &step.dependencies);
            self.await_steps(&dependencies).await?;
            self.reap_finished()?;
            if self.interrupt.has_fired() {
                return Err(ScenarioFailure::Cancelled);
            }

            let resolved = self.resolved(&dependencies);
            let spec = build_spec(&step.name, step.build, &resolved)?;

            info!(step = %step.name, image = spec.image(), "creating step");
            let created =
                ContainerHandle::create_with(Arc::clone(&self.client), spec, self.settings)
                    .await
                    .map_err(|source| ScenarioFailure::Create {
                        step: step.name.clone(),
                        source,
                    })?;
            let handle = Arc::new(created);
            self.session.push(&step.name, Arc::clone(&handle));
            self.spawn_start(index, handle);
        }

        let all: Vec<usize> = (0..self.names.len()).collect();
        self.await_steps(&all).await
    }

    fn dependency_indices(&self, index: usize, dependencies: &Dependencies) -> Vec<usize> {
        match dependencies {
            Dependencies::None => vec![],
            Dependencies::AllPrior => (0..index).collect(),
            Dependencies::Named(names) => names
                .iter()
                .filter_map(|name| self.names.iter().position(|candidate| candidate == name))
                .collect(),
        }
    }

    fn resolved(&self, dependencies: &[usize]) -> ResolvedAddresses {
        ResolvedAddresses {
            addresses: dependencies
                .iter()
                .filter_map(|index| {
                    let name = self.names.get(*index)?;
                    let address = self.addresses.get(index)?;
                    Some((name.clone(), address.clone()))
                })
                .collect(),
        }
    }

    fn spawn_start(&mut self, index: usize, handle: Arc<ContainerHandle<C>>) {
        let signal = self.abort.signal();
        let task = self.tasks.spawn(async move {
            let started = match handle.start(&signal).await {
                Ok(()) => handle.inspect_address().await.map_err(|error| match error {
                    HandleError::Engine(source) => StartupError::Engine(source),
                    HandleError::NotReady {
                        container_id,
                        state,
                    }
                    | HandleError::NotTerminated {
                        container_id,
                        state,
                    } => StartupError::InvalidState {
                        container_id,
                        state,
                    },
                }),
                Err(error) => Err(error),
            };
            (index, started)
        });
        self.task_steps.insert(task.id(), index);
    }

    /// Wait until every step in `required` is running, failing on the first
    /// startup failure of any step.
    async fn await_steps(&mut self, required: &[usize]) -> Result<(), ScenarioFailure> {
        while !required
            .iter()
            .all(|index| self.addresses.contains_key(index))
        {
            let joined = tokio::select! {
                next = self.tasks.join_next_with_id() => next,
                () = self.interrupt.fired() => return Err(ScenarioFailure::Cancelled),
            };

            match joined {
                Some(result) => self.record(result)?,
                // Nothing left in flight; the remaining steps were never
                // created, which only happens after a failure.
                None => return Err(ScenarioFailure::Cancelled),
            }
        }

        Ok(())
    }

    /// Record startups that already finished, without waiting.
    fn reap_finished(&mut self) -> Result<(), ScenarioFailure> {
        while let Some(result) = self.tasks.try_join_next_with_id() {
            self.record(result)?;
        }
        Ok(())
    }

    fn record(
        &mut self,
        result: Result<(Id, StartOutcome), tokio::task::JoinError>,
    ) -> Result<(), ScenarioFailure> {
        match result {
            Ok((_, (index, Ok(address)))) => {
                debug!(step = %self.step_name(index), "step running");
                self.addresses.insert(index, address);
                Ok(())
            }
            Ok((_, (index, Err(source)))) => Err(ScenarioFailure::Startup {
                step: self.step_name(index),
                source,
            }),
            Err(error) => {
                let step = self
                    .task_steps
                    .get(&error.id())
                    .map_or_else(String::new, |index| self.step_name(*index));
                if error.is_panic() {
                    Err(ScenarioFailure::Panicked {
                        step,
                        message: panic_message(error.into_panic().as_ref()),
                    })
                } else {
                    Err(ScenarioFailure::Cancelled)
                }
            }
        }
    }

    fn step_name(&self, index: usize) -> String {
        self.names.get(index).cloned().unwrap_or_default()
    }

    fn succeeded(&self) -> Vec<String> {
        let mut indices: Vec<usize> = self.addresses.keys().copied().collect();
        indices.sort_unstable();
        indices
            .into_iter()
            .map(|index| self.step_name(index))
            .collect()
    }

    /// Cancel in-flight startups and wait for their tasks, aborting any that
    /// outlive the grace period.
    async fn halt(&mut self) {
        self.abort.cancel();
        if self.tasks.is_empty() {
            return;
        }

        let grace = self.cancel_grace;
        let drained = tokio::time::timeout(grace, async {
            while self.tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = self.tasks.len(),
                "startups ignored cancellation; aborting their tasks"
            );
            self.tasks.abort_all();
            while self.tasks.join_next().await.is_some() {}
        }
    }
}

fn build_spec(
    step: &str,
    build: BuildFn,
    resolved: &ResolvedAddresses,
) -> Result<ContainerSpec, ScenarioFailure> {
    match catch_unwind(AssertUnwindSafe(|| build(resolved))) {
        Ok(Ok(spec)) => Ok(spec),
        Ok(Err(source)) => Err(ScenarioFailure::Build {
            step: String::from(step),
            source,
        }),
        Err(payload) => Err(ScenarioFailure::Panicked {
            step: String::from(step),
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| String::from(*message))
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("non-string panic payload"))
}
