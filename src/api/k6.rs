//! httpbin target and k6 load-test runner presets.
//!
//! [`run_k6`] starts an httpbin container, hands its container IP to a k6
//! runner as `HTTPBIN`, waits for the runner to exit, and reports the exit
//! code. Runner logs are returned for failed runs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use tracing::{info, warn};

use super::CommandOutcome;
use crate::config::AppConfig;
use crate::engine::{Address, DockerEngine, EngineClient, EngineConnector, SocketResolver};
use crate::error::{Result as DockhandResult, SpecError};
use crate::scenario::{ResolvedAddresses, Scenario, Step};
use crate::spec::ContainerRequest;
use crate::wait::WaitStrategy;

/// Image serving the httpbin target.
pub const HTTPBIN_IMAGE: &str = "kennethreitz/httpbin";

/// Image running k6.
pub const K6_IMAGE: &str = "grafana/k6:latest";

/// Directory the test script is staged into.
pub const K6_SCRIPT_DIR: &str = "/home/k6";

/// Scenario step name of the httpbin target.
pub const HTTPBIN_STEP: &str = "httpbin";

/// Scenario step name of the k6 runner.
pub const K6_STEP: &str = "k6";

const HTTPBIN_PORT: u16 = 80;
const TARGET_ENV_VAR: &str = "HTTPBIN";

/// Request for an httpbin container, ready once port 80 is published.
#[must_use]
pub fn httpbin_request() -> ContainerRequest {
    ContainerRequest::new(HTTPBIN_IMAGE)
        .with_exposed_port(HTTPBIN_PORT.to_string())
        .with_wait_strategy(WaitStrategy::for_exposed_port(HTTPBIN_PORT))
}

/// Builder for a k6 runner container.
#[derive(Debug, Clone)]
pub struct K6Runner {
    image: String,
    script: Option<Utf8PathBuf>,
    env: BTreeMap<String, String>,
    timeout: Option<Duration>,
}

impl Default for K6Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl K6Runner {
    /// Create a runner using [`K6_IMAGE`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            image: String::from(K6_IMAGE),
            script: None,
            env: BTreeMap::new(),
            timeout: None,
        }
    }

    /// Replace the k6 image.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Stage `path` into the runner and run it.
    #[must_use]
    pub fn with_test_script(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.script = Some(path.into());
        self
    }

    /// Pass `key=value` to k6 with `--env`.
    #[must_use]
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Bound how long the run may take.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Return the `--env` variables.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Build the container request.
    ///
    /// # Errors
    ///
    /// Returns `SpecError::MissingScript` when no script was set, or
    /// `SpecError::MissingHostFile` when the script path has no file name.
    pub fn request(&self) -> Result<ContainerRequest, SpecError> {
        let script = self.script.as_ref().ok_or_else(|| SpecError::MissingScript {
            runner: String::from("k6"),
        })?;
        let file_name = script
            .file_name()
            .ok_or_else(|| SpecError::MissingHostFile {
                path: script.clone().into_std_path_buf(),
            })?;
        let container_script = format!("{K6_SCRIPT_DIR}/{file_name}");

        let mut cmd = vec![String::from("run")];
        for (key, value) in &self.env {
            cmd.push(String::from("--env"));
            cmd.push(format!("{key}={value}"));
        }
        cmd.push(container_script.clone());

        let wait = self
            .timeout
            .map_or_else(WaitStrategy::for_exit, |limit| {
                WaitStrategy::for_exit().with_timeout(limit)
            });

        Ok(ContainerRequest::new(self.image.as_str())
            .with_file(script.clone(), container_script)
            .with_cmd(cmd)
            .with_wait_strategy(wait))
    }
}

/// Result of a k6 run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct K6Report {
    /// Success, or the runner's non-zero exit code.
    pub outcome: CommandOutcome,
    /// The `HTTPBIN` value handed to the runner.
    pub target: String,
    /// Runner output, kept only for failed runs.
    pub logs: Option<String>,
}

/// Parameters for [`run_k6`].
pub struct K6Params<'a, E: mockable::Env> {
    /// Application configuration (engine socket, readiness, teardown).
    pub config: &'a AppConfig,
    /// The runner to start against httpbin.
    pub runner: K6Runner,
    /// Overall scenario timeout.
    pub timeout: Option<Duration>,
    /// Tokio runtime handle for blocking execution.
    pub runtime_handle: &'a tokio::runtime::Handle,
    /// Environment variable provider for socket resolution.
    pub env: &'a E,
}

/// Connect to the configured engine and run k6 against httpbin.
///
/// # Errors
///
/// Returns connection errors from [`EngineConnector`], plus the errors of
/// [`run_k6_with_client`].
pub fn run_k6<E: mockable::Env>(params: K6Params<'_, E>) -> DockhandResult<K6Report> {
    let K6Params {
        config,
        runner,
        timeout,
        runtime_handle,
        env,
    } = params;

    let resolver = SocketResolver::new(env);
    let docker =
        EngineConnector::connect_with_fallback(config.engine_socket.as_deref(), &resolver)?;
    let client =
        Arc::new(DockerEngine::new(docker).with_stop_timeout(config.teardown.stop_timeout_secs));

    runtime_handle.block_on(run_k6_with_client(client, config, runner, timeout))
}

/// Run k6 against httpbin on `client`.
///
/// # Errors
///
/// Returns `DockhandError::Scenario` when either container fails to start,
/// the scenario times out, or a container could not be released, and
/// `DockhandError::Handle` when the runner's logs cannot be read.
pub async fn run_k6_with_client<C>(
    client: Arc<C>,
    config: &AppConfig,
    runner: K6Runner,
    timeout: Option<Duration>,
) -> DockhandResult<K6Report>
where
    C: EngineClient + ?Sized + 'static,
{
    let base = Scenario::new()
        .with_settings(config.handle_settings())
        .with_cancel_grace(config.readiness.cancel_grace())
        .step(Step::new(HTTPBIN_STEP, |_| httpbin_request().build()))
        .step(
            Step::new(K6_STEP, move |resolved| {
                let target = target_address(resolved);
                runner.with_env_var(TARGET_ENV_VAR, target).request()?.build()
            })
            .depends_on([HTTPBIN_STEP]),
        );
    let scenario = match timeout {
        Some(limit) => base.with_timeout(limit),
        None => base,
    };

    let report = scenario.run(client).await.into_result()?;
    let handle = report.handle(K6_STEP).map(Arc::clone);
    let Some(k6) = handle else {
        return Ok(K6Report {
            outcome: CommandOutcome::Success,
            target: String::new(),
            logs: None,
        });
    };

    let target = k6
        .spec()
        .cmd()
        .and_then(|cmd| {
            cmd.iter()
                .find_map(|arg| arg.strip_prefix(&format!("{TARGET_ENV_VAR}=")))
        })
        .map(String::from)
        .unwrap_or_default();

    // An exit code the engine never reported counts as a failure.
    let code = k6.exit_code()?.unwrap_or(-1);
    let outcome = CommandOutcome::from_exit_code(code);
    let logs = if outcome == CommandOutcome::Success {
        info!(%target, "k6 run passed");
        None
    } else {
        warn!(%target, code, "k6 run failed");
        Some(String::from_utf8_lossy(&k6.logs().await?).into_owned())
    };

    Ok(K6Report {
        outcome,
        target,
        logs,
    })
}

/// The httpbin address the runner should dial. Engines without per-container
/// IPs fall back to the published host.
fn target_address(resolved: &ResolvedAddresses) -> String {
    resolved
        .get(HTTPBIN_STEP)
        .map(|address: &Address| {
            address
                .container_ip()
                .map_or_else(|| address.host().to_owned(), String::from)
        })
        .unwrap_or_default()
}
