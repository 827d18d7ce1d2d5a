//! Configuration system for dockhand.
//!
//! This module provides the configuration structures, CLI definitions, and the
//! layered loader for the dockhand binary. Precedence: CLI flags override
//! environment variables, which override configuration files, which override
//! defaults.
//!
//! The configuration file is expected at `~/.config/dockhand/config.toml` by
//! default.
//!
//! # Example Configuration
//!
//! ```toml
//! engine_socket = "unix:///run/user/1000/podman/podman.sock"
//!
//! [readiness]
//! timeout_secs = 120
//! poll_initial_ms = 50
//! poll_max_ms = 1000
//!
//! [teardown]
//! stop_timeout_secs = 5
//! capture_logs = true
//! ```

mod cli;
mod loader;
mod types;

#[cfg(test)]
mod tests;

pub use cli::{Cli, Commands, K6Args};
pub use loader::{env_var_names, load_config, load_config_with_env};
pub use types::{AppConfig, ReadinessConfig, TeardownConfig};
