//! Given/when steps for scenario orchestration.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dockhand::handle::{ContainerHandle, HandleSettings};
use dockhand::scenario::{ResolvedAddresses, Scenario, Step};
use dockhand::spec::ContainerRequest;
use dockhand::wait::{CancelSignal, PollSchedule, WaitStrategy};
use rstest_bdd_macros::{given, when};

use super::StepResult;
use super::engine::{StubEngine, StubImage};
use super::state::{RunSummary, ScenarioRunState, StepDef};

fn fast_settings() -> HandleSettings {
    HandleSettings {
        schedule: PollSchedule::fixed(Duration::from_millis(5)),
        default_timeout: Duration::from_millis(500),
        capture_logs: false,
    }
}

fn push_step(scenario_run_state: &ScenarioRunState, def: StepDef) {
    let mut steps = scenario_run_state.steps.get().unwrap_or_default();
    steps.push(def);
    scenario_run_state.steps.set(steps);
}

fn stub_engine(steps: &[StepDef]) -> StubEngine {
    let images = steps
        .iter()
        .map(|def| {
            (
                def.name.clone(),
                StubImage {
                    published: def.published,
                    fail_start: def.fail_start,
                },
            )
        })
        .collect::<BTreeMap<_, _>>();
    StubEngine::new(images)
}

/// The first published endpoint of `dependency`, if it resolved.
fn upstream_of(resolved: &ResolvedAddresses, dependency: &str) -> Option<String> {
    let address = resolved.get(dependency)?;
    let port = address.ports().keys().next().copied()?;
    address.endpoint(port)
}

fn to_step(def: StepDef, built: Arc<Mutex<Vec<String>>>) -> Step {
    let name = def.name.clone();
    let dependency = def.dependency.clone();
    let step = Step::new(name.clone(), move |resolved| {
        built
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.clone());

        let mut request = ContainerRequest::new(name.as_str());
        if let Some((port, _)) = def.published {
            request = request.with_exposed_port(port.to_string());
        }
        if let Some((port, millis)) = def.wait_port {
            request = request.with_exposed_port(port.to_string()).with_wait_strategy(
                WaitStrategy::for_exposed_port(port).with_timeout(Duration::from_millis(millis)),
            );
        }
        if let Some(upstream) = def
            .dependency
            .as_deref()
            .and_then(|dep| upstream_of(resolved, dep))
        {
            request = request.with_env("UPSTREAM", upstream);
        }
        request.build()
    });
    match dependency {
        Some(dep) => step.depends_on([dep]),
        None => step,
    }
}

#[given("a stub container engine")]
fn given_stub_engine(scenario_run_state: &ScenarioRunState) {
    // The engine is assembled from the declared steps when the scenario runs.
    let _ = scenario_run_state;
}

#[given("an independent step named {name}")]
fn given_independent_step(scenario_run_state: &ScenarioRunState, name: String) {
    push_step(
        scenario_run_state,
        StepDef {
            name,
            ..StepDef::default()
        },
    );
}

#[given("a step named {name} publishing port {port} on host port {host_port}")]
fn given_publishing_step(
    scenario_run_state: &ScenarioRunState,
    name: String,
    port: u16,
    host_port: u16,
) {
    push_step(
        scenario_run_state,
        StepDef {
            name,
            published: Some((port, host_port)),
            ..StepDef::default()
        },
    );
}

#[given("a step named {name} depending on {dependency}")]
fn given_dependent_step(scenario_run_state: &ScenarioRunState, name: String, dependency: String) {
    push_step(
        scenario_run_state,
        StepDef {
            name,
            dependency: Some(dependency),
            ..StepDef::default()
        },
    );
}

#[given("a step named {name} waiting {millis} milliseconds for port {port}")]
fn given_waiting_step(scenario_run_state: &ScenarioRunState, name: String, millis: u64, port: u16) {
    push_step(
        scenario_run_state,
        StepDef {
            name,
            wait_port: Some((port, millis)),
            ..StepDef::default()
        },
    );
}

#[given("step {name} fails to start")]
fn given_step_fails(scenario_run_state: &ScenarioRunState, name: String) -> StepResult<()> {
    let mut steps = scenario_run_state.steps.get().unwrap_or_default();
    let def = steps
        .iter_mut()
        .find(|def| def.name == name)
        .ok_or_else(|| format!("step {name} has not been declared"))?;
    def.fail_start = true;
    scenario_run_state.steps.set(steps);
    Ok(())
}

#[when("the scenario runs")]
fn when_scenario_runs(scenario_run_state: &ScenarioRunState) -> StepResult<()> {
    let steps = scenario_run_state.steps.get().unwrap_or_default();
    let built = scenario_run_state
        .built
        .get()
        .ok_or_else(|| String::from("build log should be initialised"))?;
    let engine = Arc::new(stub_engine(&steps));

    let scenario = steps.into_iter().fold(
        Scenario::new().with_settings(fast_settings()),
        |scenario, def| scenario.step(to_step(def, Arc::clone(&built))),
    );

    let runtime = tokio::runtime::Runtime::new().map_err(|e| e.to_string())?;
    let report = runtime.block_on(scenario.run(Arc::clone(&engine)));

    let upstreams = report
        .handles()
        .iter()
        .filter_map(|step| {
            step.handle()
                .spec()
                .env()
                .get("UPSTREAM")
                .map(|value| (String::from(step.name()), value.clone()))
        })
        .collect();

    scenario_run_state.summary.set(RunSummary {
        failure: report.failure().cloned(),
        removed: engine.removed(),
        upstreams,
    });
    Ok(())
}

#[when("a container is started and terminated {count} times")]
fn when_started_and_terminated(scenario_run_state: &ScenarioRunState, count: usize) -> StepResult<()> {
    let engine = Arc::new(stub_engine(&[StepDef {
        name: String::from("solo"),
        ..StepDef::default()
    }]));
    let spec = ContainerRequest::new("solo")
        .build()
        .map_err(|e| e.to_string())?;

    let runtime = tokio::runtime::Runtime::new().map_err(|e| e.to_string())?;
    runtime.block_on(async {
        let handle = ContainerHandle::create_with(Arc::clone(&engine), spec, fast_settings())
            .await
            .map_err(|e| e.to_string())?;
        handle
            .start(&CancelSignal::never())
            .await
            .map_err(|e| e.to_string())?;
        for _ in 0..count {
            handle.terminate().await.map_err(|e| e.to_string())?;
        }
        Ok::<(), String>(())
    })?;

    scenario_run_state.summary.set(RunSummary {
        removed: engine.removed(),
        ..RunSummary::default()
    });
    Ok(())
}
