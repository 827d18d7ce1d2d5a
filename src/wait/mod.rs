//! Readiness wait strategies.
//!
//! A [`WaitStrategy`] decides when a started container can serve its purpose.
//! The strategy set is closed; [`WaitStrategy::Custom`] is the one extension
//! point and holds a caller-supplied predicate.
//!
//! [`wait_until_ready`] polls a strategy on a [`PollSchedule`] until it
//! succeeds, the strategy's timeout elapses, an unrecoverable engine failure
//! occurs, or a [`CancelSignal`] fires. Intermediate failures (port not yet
//! published, log line not yet flushed, connection refused) are expected while
//! a container boots and only cause another poll.

mod backoff;
mod cancel;
mod http;
mod probe;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::debug;

use crate::error::{ContainerError, SpecError};
use crate::spec::PortSpec;

pub use backoff::{Backoff, PollSchedule};
pub use cancel::{CancelSignal, CancelTrigger};
pub use probe::{EngineProbe, ReadinessProbe, RuntimeView};

/// Timeout applied by the strategy constructors.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Boxed future returned by a custom readiness check.
pub type CustomCheckFuture = Pin<Box<dyn Future<Output = bool> + Send>>;

/// A caller-supplied readiness predicate.
#[derive(Clone)]
pub struct CustomCheck(Arc<dyn Fn(RuntimeView) -> CustomCheckFuture + Send + Sync>);

impl CustomCheck {
    /// Wrap a predicate.
    pub fn new<F, Fut>(check: F) -> Self
    where
        F: Fn(RuntimeView) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self(Arc::new(move |view| Box::pin(check(view))))
    }

    async fn evaluate(&self, view: RuntimeView) -> bool {
        (self.0)(view).await
    }
}

impl fmt::Debug for CustomCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomCheck(..)")
    }
}

/// How to decide that a started container is ready.
#[derive(Debug, Clone)]
pub enum WaitStrategy {
    /// The engine reports `port` published on the host.
    PortExposed {
        /// The container port.
        port: PortSpec,
        /// Upper bound on the wait.
        timeout: Duration,
    },
    /// The logs contain `pattern` at least `occurrences` times.
    LogPattern {
        /// The pattern to match.
        pattern: Regex,
        /// Required number of matches.
        occurrences: usize,
        /// Upper bound on the wait.
        timeout: Duration,
    },
    /// An HTTP GET of `path` on the published `port` answers
    /// `expected_status`.
    HttpStatus {
        /// The container port serving HTTP.
        port: PortSpec,
        /// The request path.
        path: String,
        /// The expected response status.
        expected_status: u16,
        /// Upper bound on the wait.
        timeout: Duration,
    },
    /// The container process has exited. Used for run-to-completion
    /// workloads such as test runners.
    Exit {
        /// Upper bound on the wait.
        timeout: Duration,
    },
    /// A caller-supplied predicate over a runtime snapshot.
    Custom {
        /// The predicate.
        check: CustomCheck,
        /// Upper bound on the wait, enforced regardless of the predicate.
        timeout: Duration,
    },
}

impl WaitStrategy {
    /// Wait until a TCP `port` is published.
    #[must_use]
    pub fn for_exposed_port(port: impl Into<PortSpec>) -> Self {
        Self::PortExposed {
            port: port.into(),
            timeout: DEFAULT_STARTUP_TIMEOUT,
        }
    }

    /// Wait until the logs match `pattern` once.
    ///
    /// # Errors
    ///
    /// Returns `SpecError::InvalidLogPattern` when `pattern` is not a valid
    /// regular expression.
    pub fn for_log(pattern: &str) -> Result<Self, SpecError> {
        let compiled = Regex::new(pattern).map_err(|error| SpecError::InvalidLogPattern {
            pattern: String::from(pattern),
            message: error.to_string(),
        })?;

        Ok(Self::LogPattern {
            pattern: compiled,
            occurrences: 1,
            timeout: DEFAULT_STARTUP_TIMEOUT,
        })
    }

    /// Wait until `path` on `port` answers `200 OK`.
    #[must_use]
    pub fn for_http(port: impl Into<PortSpec>, path: impl Into<String>) -> Self {
        Self::HttpStatus {
            port: port.into(),
            path: path.into(),
            expected_status: 200,
            timeout: DEFAULT_STARTUP_TIMEOUT,
        }
    }

    /// Wait until the container exits.
    #[must_use]
    pub const fn for_exit() -> Self {
        Self::Exit {
            timeout: DEFAULT_STARTUP_TIMEOUT,
        }
    }

    /// Wait until `check` returns `true`.
    pub fn custom<F, Fut>(check: F) -> Self
    where
        F: Fn(RuntimeView) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self::Custom {
            check: CustomCheck::new(check),
            timeout: DEFAULT_STARTUP_TIMEOUT,
        }
    }

    /// Replace the timeout.
    #[must_use]
    pub fn with_timeout(mut self, value: Duration) -> Self {
        match &mut self {
            Self::PortExposed { timeout, .. }
            | Self::LogPattern { timeout, .. }
            | Self::HttpStatus { timeout, .. }
            | Self::Exit { timeout }
            | Self::Custom { timeout, .. } => *timeout = value,
        }
        self
    }

    /// Require `count` log matches. Ignored by other strategies.
    #[must_use]
    pub fn with_occurrences(mut self, count: usize) -> Self {
        if let Self::LogPattern { occurrences, .. } = &mut self {
            *occurrences = count.max(1);
        }
        self
    }

    /// Expect `status` from an HTTP probe. Ignored by other strategies.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        if let Self::HttpStatus {
            expected_status, ..
        } = &mut self
        {
            *expected_status = status;
        }
        self
    }

    /// Return the timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        match self {
            Self::PortExposed { timeout, .. }
            | Self::LogPattern { timeout, .. }
            | Self::HttpStatus { timeout, .. }
            | Self::Exit { timeout }
            | Self::Custom { timeout, .. } => *timeout,
        }
    }

    /// Return the container port the strategy depends on, if any.
    #[must_use]
    pub const fn port(&self) -> Option<PortSpec> {
        match self {
            Self::PortExposed { port, .. } | Self::HttpStatus { port, .. } => Some(*port),
            Self::LogPattern { .. } | Self::Exit { .. } | Self::Custom { .. } => None,
        }
    }

    /// Whether the container is expected to run to completion.
    #[must_use]
    pub const fn expects_exit(&self) -> bool {
        matches!(self, Self::Exit { .. })
    }

    /// Short name used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PortExposed { .. } => "port-exposed",
            Self::LogPattern { .. } => "log-pattern",
            Self::HttpStatus { .. } => "http-status",
            Self::Exit { .. } => "exit",
            Self::Custom { .. } => "custom",
        }
    }
}

/// Outcome of a readiness wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// The condition held.
    Ready,
    /// The timeout elapsed first.
    TimedOut {
        /// How long the wait lasted.
        waited: Duration,
    },
    /// An unrecoverable engine failure ended the wait.
    Errored(ContainerError),
    /// A cancellation signal ended the wait.
    Cancelled,
}

/// What a single poll checks.
#[derive(Debug, Clone, Copy)]
enum Condition<'a> {
    /// Only that the engine reports the process running.
    Running,
    /// A full strategy.
    Strategy(&'a WaitStrategy),
}

/// Block until `strategy` reports the container ready.
///
/// The strategy's own timeout bounds the wait. Cancellation and the timeout
/// both drop the in-flight check, so a custom predicate that never resolves
/// cannot hold the caller.
pub async fn wait_until_ready<P: ReadinessProbe + ?Sized>(
    strategy: &WaitStrategy,
    probe: &P,
    schedule: &PollSchedule,
    cancel: &CancelSignal,
) -> Readiness {
    wait_for(
        Condition::Strategy(strategy),
        strategy.timeout(),
        probe,
        schedule,
        cancel,
    )
    .await
}

/// Block until the engine reports the container running. Used when a spec
/// installs no strategy.
pub(crate) async fn wait_until_running<P: ReadinessProbe + ?Sized>(
    timeout: Duration,
    probe: &P,
    schedule: &PollSchedule,
    cancel: &CancelSignal,
) -> Readiness {
    wait_for(Condition::Running, timeout, probe, schedule, cancel).await
}

async fn wait_for<P: ReadinessProbe + ?Sized>(
    condition: Condition<'_>,
    timeout: Duration,
    probe: &P,
    schedule: &PollSchedule,
    cancel: &CancelSignal,
) -> Readiness {
    let started = Instant::now();

    tokio::select! {
        biased;
        () = cancel.cancelled() => Readiness::Cancelled,
        polled = tokio::time::timeout(timeout, poll_until_ready(condition, probe, schedule)) => {
            match polled {
                Ok(Ok(())) => Readiness::Ready,
                Ok(Err(error)) => Readiness::Errored(error),
                Err(_) => Readiness::TimedOut {
                    waited: started.elapsed(),
                },
            }
        }
    }
}

async fn poll_until_ready<P: ReadinessProbe + ?Sized>(
    condition: Condition<'_>,
    probe: &P,
    schedule: &PollSchedule,
) -> Result<(), ContainerError> {
    let mut delays = schedule.delays();
    let mut attempt: u32 = 0;
    let http_client = http::StatusClient::default();

    loop {
        attempt = attempt.saturating_add(1);
        match check_once(condition, probe, &http_client).await {
            Ok(true) => return Ok(()),
            Ok(false) => debug!(
                container_id = probe.container_id(),
                attempt, "container not ready yet"
            ),
            Err(error) if error.is_unrecoverable() => return Err(error),
            Err(error) => debug!(
                container_id = probe.container_id(),
                attempt,
                %error,
                "transient readiness check failure"
            ),
        }

        let delay = delays.next().unwrap_or_else(|| schedule.max());
        tokio::time::sleep(delay).await;
    }
}

async fn check_once<P: ReadinessProbe + ?Sized>(
    condition: Condition<'_>,
    probe: &P,
    http_client: &http::StatusClient,
) -> Result<bool, ContainerError> {
    let inspection = probe.inspect().await?;

    let strategy = match condition {
        Condition::Strategy(strategy) if strategy.expects_exit() => {
            return Ok(inspection.status.has_exited());
        }
        Condition::Strategy(strategy) => Some(strategy),
        Condition::Running => None,
    };

    if inspection.status.has_exited() {
        return Err(ContainerError::UnexpectedExit {
            container_id: String::from(probe.container_id()),
            exit_code: inspection.exit_code,
        });
    }

    if !inspection.status.is_running() {
        return Ok(false);
    }

    let Some(active) = strategy else {
        return Ok(true);
    };

    match active {
        WaitStrategy::PortExposed { port, .. } => Ok(inspection.host_port(*port).is_some()),
        WaitStrategy::LogPattern {
            pattern,
            occurrences,
            ..
        } => {
            let logs = probe.logs().await?;
            let text = String::from_utf8_lossy(&logs);
            Ok(pattern.find_iter(&text).count() >= *occurrences)
        }
        WaitStrategy::HttpStatus {
            port,
            path,
            expected_status,
            ..
        } => {
            let Some((host, host_port)) = inspection.endpoint(*port) else {
                return Ok(false);
            };
            let url = http::probe_url(&host, host_port, path);
            Ok(http_client.status_matches(&url, *expected_status).await)
        }
        WaitStrategy::Custom { check, .. } => {
            let logs = probe.logs().await?;
            let view = RuntimeView::new(String::from(probe.container_id()), inspection, logs);
            Ok(check.evaluate(view).await)
        }
        WaitStrategy::Exit { .. } => Ok(inspection.status.has_exited()),
    }
}
