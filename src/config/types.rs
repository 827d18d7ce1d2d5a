//! Configuration data types for dockhand.

use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};

use crate::handle::HandleSettings;
use crate::wait::PollSchedule;

/// Readiness polling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Timeout for containers without an explicit wait strategy timeout.
    pub timeout_secs: u64,

    /// First delay between readiness polls, in milliseconds.
    pub poll_initial_ms: u64,

    /// Upper bound on the delay between readiness polls, in milliseconds.
    pub poll_max_ms: u64,

    /// Factor applied to the poll delay after each attempt.
    pub poll_multiplier: u32,

    /// How long in-flight startups get to observe a scenario abort before
    /// their tasks are aborted, in milliseconds.
    pub cancel_grace_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            poll_initial_ms: 100,
            poll_max_ms: 2_000,
            poll_multiplier: 2,
            cancel_grace_ms: 5_000,
        }
    }
}

impl ReadinessConfig {
    /// Polling schedule described by this section.
    #[must_use]
    pub fn schedule(&self) -> PollSchedule {
        PollSchedule::new(
            Duration::from_millis(self.poll_initial_ms),
            Duration::from_millis(self.poll_max_ms),
            self.poll_multiplier,
        )
    }

    /// Default readiness timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Grace period for cancelled startups.
    #[must_use]
    pub const fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

/// Teardown configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TeardownConfig {
    /// Seconds the engine waits for a graceful stop before killing.
    pub stop_timeout_secs: u64,

    /// Capture container logs before removal.
    pub capture_logs: bool,
}

impl Default for TeardownConfig {
    fn default() -> Self {
        Self {
            stop_timeout_secs: 10,
            capture_logs: true,
        }
    }
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `DOCKHAND_CONFIG_PATH` environment variable
/// 2. `.dockhand.toml` in the current working directory
/// 3. `.dockhand.toml` in the home directory
/// 4. `~/.config/dockhand/config.toml` (XDG default)
#[derive(Debug, Clone, Default, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "DOCKHAND",
    post_merge_hook,
    discovery(
        app_name = "dockhand",
        env_var = "DOCKHAND_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".dockhand.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// The container engine socket path or URL.
    pub engine_socket: Option<String>,

    /// Readiness polling configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub readiness: ReadinessConfig,

    /// Teardown configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub teardown: TeardownConfig,
}

impl AppConfig {
    /// Handle settings derived from the readiness and teardown sections.
    #[must_use]
    pub fn handle_settings(&self) -> HandleSettings {
        HandleSettings {
            schedule: self.readiness.schedule(),
            default_timeout: self.readiness.timeout(),
            capture_logs: self.teardown.capture_logs,
        }
    }
}

impl ReadinessConfig {
    /// First setting that cannot drive a readiness wait, as a key and
    /// reason.
    const fn invalid_setting(&self) -> Option<(&'static str, &'static str)> {
        if self.timeout_secs == 0 {
            return Some((
                "readiness.timeout_secs",
                "must be at least one second",
            ));
        }
        if self.poll_initial_ms == 0 {
            return Some((
                "readiness.poll_initial_ms",
                "must be at least one millisecond",
            ));
        }
        if self.poll_max_ms < self.poll_initial_ms {
            return Some((
                "readiness.poll_max_ms",
                "must not be below readiness.poll_initial_ms",
            ));
        }
        if self.poll_multiplier == 0 {
            return Some(("readiness.poll_multiplier", "must be at least one"));
        }
        None
    }
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        self.readiness
            .invalid_setting()
            .map_or(Ok(()), |(key, message)| {
                Err(Arc::new(OrthoError::Validation {
                    key: String::from(key),
                    message: String::from(message),
                }))
            })
    }
}
