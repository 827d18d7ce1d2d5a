//! Command-line argument definitions for dockhand.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Command-line interface for dockhand.
#[derive(Debug, Parser)]
#[command(name = "dockhand")]
#[command(
    author,
    version,
    about = "Ephemeral container scenarios with readiness verification"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Container engine socket path or URL.
    #[arg(long, global = true)]
    pub engine_socket: Option<String>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Verify the container engine is reachable.
    Check,

    /// Run a k6 script against a disposable httpbin target.
    K6(K6Args),
}

/// Arguments for the `k6` subcommand.
#[derive(Debug, Parser)]
pub struct K6Args {
    /// Path to the k6 script on the host.
    #[arg(long, required = true)]
    pub script: Utf8PathBuf,

    /// Extra `KEY=VALUE` variables passed to k6 with `--env`.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Overall scenario timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}
