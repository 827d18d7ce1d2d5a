//! Assertion helpers for scenario orchestration behavioural tests.

use dockhand::error::ScenarioFailure;
use rstest_bdd_macros::then;

use super::StepResult;
use super::state::{RunSummary, ScenarioRunState};

fn summary(scenario_run_state: &ScenarioRunState) -> StepResult<RunSummary> {
    scenario_run_state
        .summary
        .get()
        .ok_or_else(|| String::from("scenario should have run"))
}

const fn failed_step(failure: &ScenarioFailure) -> Option<&String> {
    match failure {
        ScenarioFailure::Build { step, .. }
        | ScenarioFailure::Create { step, .. }
        | ScenarioFailure::Startup { step, .. }
        | ScenarioFailure::Panicked { step, .. } => Some(step),
        _ => None,
    }
}

#[then("the scenario succeeds")]
fn scenario_succeeds(scenario_run_state: &ScenarioRunState) -> StepResult<()> {
    match summary(scenario_run_state)?.failure {
        None => Ok(()),
        Some(failure) => Err(format!("expected success, got: {failure}")),
    }
}

#[then("the scenario fails at step {name}")]
fn scenario_fails_at(scenario_run_state: &ScenarioRunState, name: String) -> StepResult<()> {
    let failure = summary(scenario_run_state)?
        .failure
        .ok_or_else(|| String::from("expected a failure, scenario succeeded"))?;
    match failed_step(&failure) {
        Some(step) if *step == name => Ok(()),
        _ => Err(format!("expected failure at step {name}, got: {failure}")),
    }
}

#[then("the failure is a readiness timeout")]
fn failure_is_readiness_timeout(scenario_run_state: &ScenarioRunState) -> StepResult<()> {
    match summary(scenario_run_state)?.failure {
        Some(ScenarioFailure::Startup { source, .. }) if source.is_readiness_timeout() => Ok(()),
        other => Err(format!("expected a readiness timeout, got: {other:?}")),
    }
}

#[then("step {name} was never built")]
fn step_never_built(scenario_run_state: &ScenarioRunState, name: String) -> StepResult<()> {
    let built = scenario_run_state
        .built
        .get()
        .ok_or_else(|| String::from("build log should be initialised"))?;
    let names = built
        .lock()
        .map_err(|_| String::from("build log lock poisoned"))?
        .clone();
    if names.contains(&name) {
        return Err(format!("step {name} was built: {names:?}"));
    }
    Ok(())
}

#[then("step {name} received upstream {address}")]
fn step_received_upstream(
    scenario_run_state: &ScenarioRunState,
    name: String,
    address: String,
) -> StepResult<()> {
    let upstreams = summary(scenario_run_state)?.upstreams;
    match upstreams.iter().find(|(step, _)| *step == name) {
        Some((_, value)) if *value == address => Ok(()),
        Some((_, value)) => Err(format!("expected upstream {address}, got {value}")),
        None => Err(format!("step {name} received no upstream")),
    }
}

#[then("containers were removed in the order {order}")]
fn containers_removed_in_order(
    scenario_run_state: &ScenarioRunState,
    order: String,
) -> StepResult<()> {
    let expected: Vec<String> = order.split(',').map(|name| format!("{name}-id")).collect();
    let removed = summary(scenario_run_state)?.removed;
    if removed == expected {
        Ok(())
    } else {
        Err(format!("expected removal order {expected:?}, got {removed:?}"))
    }
}

#[then("the engine stopped exactly {count} container")]
fn engine_stopped_exactly(scenario_run_state: &ScenarioRunState, count: usize) -> StepResult<()> {
    let removed = summary(scenario_run_state)?.removed;
    if removed.len() == count {
        Ok(())
    } else {
        Err(format!("expected {count} stop calls, got {removed:?}"))
    }
}
