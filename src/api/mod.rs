//! Orchestration API for dockhand commands.
//!
//! Each dockhand command has a library-facing entry point here:
//! [`check_engine`] and [`run_k6`]. They accept library-owned types (not clap
//! types), return [`crate::error::Result`], and never print or exit the
//! process, so the CLI adapter and library embedders share one code path.

mod k6;

pub use k6::{
    HTTPBIN_IMAGE, HTTPBIN_STEP, K6_IMAGE, K6_SCRIPT_DIR, K6_STEP, K6Params, K6Report, K6Runner,
    httpbin_request, run_k6, run_k6_with_client,
};

use crate::config::AppConfig;
use crate::engine::{EngineConnector, SocketResolver};
use crate::error::Result as DockhandResult;

/// Outcome of a dockhand command.
///
/// Commands return either outright success or a command-specific exit code
/// that the CLI adapter maps to a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command completed successfully (exit code 0).
    Success,
    /// The command completed but the underlying process exited with a
    /// non-zero code.
    CommandExit {
        /// The exit code reported by the container engine.
        code: i64,
    },
}

impl CommandOutcome {
    /// Map a container exit code to an outcome.
    #[must_use]
    pub const fn from_exit_code(code: i64) -> Self {
        if code == 0 {
            Self::Success
        } else {
            Self::CommandExit { code }
        }
    }
}

/// Verify that the configured container engine answers a ping.
///
/// # Errors
///
/// Returns the connection errors of [`EngineConnector::connect`] and the
/// health check errors of [`EngineConnector::health_check_async`].
pub fn check_engine<E: mockable::Env>(
    config: &AppConfig,
    runtime_handle: &tokio::runtime::Handle,
    env: &E,
) -> DockhandResult<CommandOutcome> {
    let resolver = SocketResolver::new(env);
    let docker =
        EngineConnector::connect_with_fallback(config.engine_socket.as_deref(), &resolver)?;
    runtime_handle.block_on(EngineConnector::health_check_async(&docker))?;
    Ok(CommandOutcome::Success)
}
