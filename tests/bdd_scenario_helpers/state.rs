//! Scenario state for orchestration behavioural tests.

use std::sync::{Arc, Mutex};

use dockhand::error::ScenarioFailure;
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;

/// A step declared by the feature file.
#[derive(Debug, Clone, Default)]
pub(crate) struct StepDef {
    pub(crate) name: String,
    pub(crate) published: Option<(u16, u16)>,
    pub(crate) wait_port: Option<(u16, u64)>,
    pub(crate) dependency: Option<String>,
    pub(crate) fail_start: bool,
}

/// What a scenario run left behind.
#[derive(Debug, Clone, Default)]
pub(crate) struct RunSummary {
    pub(crate) failure: Option<ScenarioFailure>,
    pub(crate) removed: Vec<String>,
    pub(crate) upstreams: Vec<(String, String)>,
}

#[derive(Default, ScenarioState)]
pub(crate) struct ScenarioRunState {
    pub(crate) steps: Slot<Vec<StepDef>>,
    pub(crate) built: Slot<Arc<Mutex<Vec<String>>>>,
    pub(crate) summary: Slot<RunSummary>,
}

#[fixture]
pub(crate) fn scenario_run_state() -> ScenarioRunState {
    let state = ScenarioRunState::default();
    state.steps.set(vec![]);
    state.built.set(Arc::new(Mutex::new(vec![])));
    state
}
