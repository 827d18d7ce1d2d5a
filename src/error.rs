//! Semantic error types for the dockhand library.
//!
//! This module defines the error hierarchy for dockhand, following the principle of
//! using semantic error enums (via `thiserror`) for conditions the caller might
//! inspect or retry, while reserving opaque errors (`eyre::Report`) for the
//! application boundary.
//!
//! The taxonomy mirrors how a scenario fails:
//!
//! - [`SpecError`]: the caller built an invalid container request. Never retried.
//! - [`ContainerError`]: the container engine rejected or failed a call.
//! - [`StartupError`]: a handle did not reach `Running`. A readiness timeout is
//!   kept distinguishable so callers can extend the timeout and retry.
//! - [`HandleError`]: a handle was queried in the wrong lifecycle state.
//! - [`TeardownError`]: best-effort cleanup failed. Collected, never fatal.
//! - [`ScenarioError`]: the primary scenario failure plus any teardown errors.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::handle::LifecycleState;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found at the expected path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path where the configuration file was expected.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Errors raised while building a container request.
///
/// These are caller mistakes detected before the engine is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    /// The image name was empty or whitespace-only.
    #[error("invalid container spec: image name cannot be empty")]
    EmptyImage,

    /// A port specification could not be parsed.
    #[error("invalid container spec: cannot parse port '{value}'")]
    InvalidPort {
        /// The raw port specification.
        value: String,
    },

    /// A port number lies outside `1..=65535`.
    #[error("invalid container spec: port {port} is out of range 1-65535")]
    PortOutOfRange {
        /// The offending port number.
        port: u64,
    },

    /// An environment variable key was empty or contained `=`.
    #[error("invalid container spec: invalid environment variable name '{key}'")]
    InvalidEnvKey {
        /// The offending key.
        key: String,
    },

    /// A host file staged with `CopyFile` does not exist.
    #[error("invalid container spec: host file not found: {path}")]
    MissingHostFile {
        /// The host path that was not found.
        path: PathBuf,
    },

    /// A runner that executes a script was built without one.
    #[error("invalid container spec: {runner} requires a script")]
    MissingScript {
        /// The runner that needs the script.
        runner: String,
    },

    /// A container path staged with `CopyFile` was not absolute.
    #[error("invalid container spec: container path '{path}' must be absolute")]
    RelativeContainerPath {
        /// The offending container path.
        path: String,
    },

    /// A log-pattern wait strategy held an invalid regular expression.
    #[error("invalid container spec: invalid log pattern '{pattern}': {message}")]
    InvalidLogPattern {
        /// The pattern source.
        pattern: String,
        /// The regex compiler message.
        message: String,
    },

    /// A port-based wait strategy referenced a port that is not exposed.
    #[error("invalid container spec: wait strategy port {port} is not exposed")]
    WaitPortNotExposed {
        /// The port named by the wait strategy.
        port: String,
    },

    /// Two scenario steps share a name.
    #[error("invalid scenario: duplicate step name '{name}'")]
    DuplicateStep {
        /// The duplicated step name.
        name: String,
    },

    /// A scenario step depends on a step that is not declared before it.
    #[error("invalid scenario: step '{step}' depends on unknown or later step '{dependency}'")]
    UnknownDependency {
        /// The dependent step.
        step: String,
        /// The dependency that could not be resolved.
        dependency: String,
    },
}

/// Errors that can occur during container engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContainerError {
    /// Failed to connect to the container engine socket.
    #[error("failed to connect to container engine: {message}")]
    ConnectionFailed {
        /// A description of the connection failure.
        message: String,
    },

    /// The container engine socket was not found.
    #[error("container engine socket not found: {path}")]
    SocketNotFound {
        /// The path where the socket was expected.
        path: PathBuf,
    },

    /// Permission denied when accessing the container engine socket.
    #[error("permission denied accessing container socket: {path}")]
    PermissionDenied {
        /// The path to the socket.
        path: PathBuf,
    },

    /// Failed to create a container.
    #[error("failed to create container from '{image}': {message}")]
    CreateFailed {
        /// The image the container was created from.
        image: String,
        /// A description of the creation failure.
        message: String,
    },

    /// Failed to stage files into a container.
    #[error("failed to copy files into container '{container_id}': {message}")]
    CopyFailed {
        /// The ID of the target container.
        container_id: String,
        /// A description of the copy failure.
        message: String,
    },

    /// Failed to start a container.
    #[error("failed to start container '{container_id}': {message}")]
    StartFailed {
        /// The ID of the container that failed to start.
        container_id: String,
        /// A description of the start failure.
        message: String,
    },

    /// Failed to stop or remove a container.
    #[error("failed to stop and remove container '{container_id}': {message}")]
    StopFailed {
        /// The ID of the container.
        container_id: String,
        /// A description of the failure.
        message: String,
    },

    /// Failed to inspect a container.
    #[error("failed to inspect container '{container_id}': {message}")]
    InspectFailed {
        /// The ID of the container.
        container_id: String,
        /// A description of the failure.
        message: String,
    },

    /// Failed to read container logs.
    #[error("failed to read logs of container '{container_id}': {message}")]
    LogsFailed {
        /// The ID of the container.
        container_id: String,
        /// A description of the failure.
        message: String,
    },

    /// The engine no longer knows the container.
    #[error("container '{container_id}' not found")]
    NotFound {
        /// The ID of the missing container.
        container_id: String,
    },

    /// The container process exited while it was expected to keep running.
    #[error("container '{container_id}' exited unexpectedly with code {exit_code:?}")]
    UnexpectedExit {
        /// The ID of the container.
        container_id: String,
        /// The exit code reported by the engine, when known.
        exit_code: Option<i64>,
    },

    /// Health check failed - engine did not respond correctly.
    #[error("container engine health check failed: {message}")]
    HealthCheckFailed {
        /// A description of the health check failure.
        message: String,
    },

    /// Health check timed out.
    #[error("container engine health check timed out after {seconds} seconds")]
    HealthCheckTimeout {
        /// The timeout duration in seconds.
        seconds: u64,
    },
}

impl ContainerError {
    /// Whether a readiness poll should give up on this error.
    ///
    /// A container that vanished or exited will never become ready; other
    /// engine hiccups are retried on the next poll.
    #[must_use]
    pub const fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::UnexpectedExit { .. })
    }
}

/// Errors that stop a handle from reaching `Running`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartupError {
    /// `start` was called on a handle that is not `Created`.
    #[error("cannot start container '{container_id}' in state {state}")]
    InvalidState {
        /// The ID of the container.
        container_id: String,
        /// The state the handle was in.
        state: LifecycleState,
    },

    /// The engine failed to start the container.
    #[error(transparent)]
    Engine(#[from] ContainerError),

    /// The wait strategy did not report readiness before its timeout.
    #[error("container '{container_id}' was not ready after {waited_ms} ms")]
    ReadinessTimeout {
        /// The ID of the container.
        container_id: String,
        /// How long the wait lasted, in milliseconds.
        waited_ms: u64,
    },

    /// The wait strategy hit an unrecoverable engine failure.
    #[error("readiness check for container '{container_id}' failed: {source}")]
    ReadinessFailed {
        /// The ID of the container.
        container_id: String,
        /// The underlying engine failure.
        source: ContainerError,
    },

    /// Startup was cancelled by a scenario abort, outer timeout, or a
    /// concurrent terminate.
    #[error("startup of container '{container_id}' was cancelled")]
    Cancelled {
        /// The ID of the container.
        container_id: String,
    },
}

impl StartupError {
    /// Whether this failure is a readiness timeout.
    #[must_use]
    pub const fn is_readiness_timeout(&self) -> bool {
        matches!(self, Self::ReadinessTimeout { .. })
    }
}

/// Errors raised by handle accessors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    /// The handle is not `Running`.
    #[error("container '{container_id}' is not ready (state {state})")]
    NotReady {
        /// The ID of the container.
        container_id: String,
        /// The state the handle was in.
        state: LifecycleState,
    },

    /// The handle has not been terminated yet.
    #[error("container '{container_id}' has not terminated (state {state})")]
    NotTerminated {
        /// The ID of the container.
        container_id: String,
        /// The state the handle was in.
        state: LifecycleState,
    },

    /// An engine query failed.
    #[error(transparent)]
    Engine(#[from] ContainerError),
}

/// A failure to release one container during teardown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("teardown of container '{container_id}' failed: {source}")]
pub struct TeardownError {
    /// The ID of the container.
    pub container_id: String,
    /// The underlying engine failure.
    pub source: ContainerError,
}

/// The primary reason a scenario did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScenarioFailure {
    /// The scenario definition itself was invalid.
    #[error(transparent)]
    Invalid(SpecError),

    /// A step's builder function rejected its request.
    #[error("step '{step}' produced an invalid spec: {source}")]
    Build {
        /// The step name.
        step: String,
        /// The validation failure.
        source: SpecError,
    },

    /// The engine failed to create a step's container.
    #[error("step '{step}' could not be created: {source}")]
    Create {
        /// The step name.
        step: String,
        /// The engine failure.
        source: ContainerError,
    },

    /// A step's container did not reach `Running`.
    #[error("step '{step}' did not start: {source}")]
    Startup {
        /// The step name.
        step: String,
        /// The startup failure.
        source: StartupError,
    },

    /// A builder function or startup task panicked.
    #[error("step '{step}' panicked: {message}")]
    Panicked {
        /// The step name.
        step: String,
        /// The panic payload, when it was a string.
        message: String,
    },

    /// The scenario body returned an error.
    #[error("scenario body failed: {message}")]
    Body {
        /// The body's error message.
        message: String,
    },

    /// The scenario was cancelled or exceeded its deadline.
    #[error("scenario was cancelled")]
    Cancelled,

    /// Every step succeeded but some containers could not be released.
    #[error("{count} container(s) could not be released")]
    Teardown {
        /// Number of containers whose teardown failed.
        count: usize,
    },
}

/// A failed scenario: the primary failure first, teardown issues appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioError {
    /// The failure that ended the scenario.
    pub failure: ScenarioFailure,
    /// Teardown errors collected while releasing containers.
    pub teardown: Vec<TeardownError>,
}

impl fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.failure)?;
        if !self.teardown.is_empty() {
            let issues: Vec<String> = self.teardown.iter().map(ToString::to_string).collect();
            write!(f, " (teardown issues: {})", issues.join("; "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ScenarioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.failure)
    }
}

/// Errors that can occur during filesystem operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilesystemError {
    /// A file or directory was not found.
    #[error("path not found: {path}")]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// An I/O error occurred.
    #[error("I/O error at '{path}': {message}")]
    IoError {
        /// The path where the error occurred.
        path: PathBuf,
        /// A description of the I/O error.
        message: String,
    },
}

/// Top-level error type for the dockhand library.
///
/// This enum aggregates all domain-specific errors into a single type. At the
/// application boundary (main.rs), these errors are converted to
/// `eyre::Report` for human-readable error reporting.
#[derive(Debug, Error)]
pub enum DockhandError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A container request was invalid.
    #[error(transparent)]
    Spec(#[from] SpecError),

    /// An error occurred during container operations.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// A container failed to start.
    #[error(transparent)]
    Startup(#[from] StartupError),

    /// A handle accessor was misused.
    #[error(transparent)]
    Handle(#[from] HandleError),

    /// A scenario failed.
    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    /// An error occurred during filesystem operations.
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}

/// A specialised `Result` type for dockhand operations.
pub type Result<T> = std::result::Result<T, DockhandError>;
