//! `dockhand` application entry point.
//!
//! This binary is a thin adapter over [`dockhand::api`]. It uses `eyre` for
//! opaque error handling at the application boundary, converting
//! domain-specific errors into human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/dockhand/config.toml` or path from `DOCKHAND_CONFIG_PATH`)
//! 3. Environment variables (`DOCKHAND_*`)
//! 4. Command-line arguments

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use eyre::{Report, Result as EyreResult, eyre};
use mockable::DefaultEnv;
use tracing_subscriber::EnvFilter;

use dockhand::api::{CommandOutcome, K6Params, K6Runner, check_engine, run_k6};
use dockhand::config::{AppConfig, Cli, Commands, K6Args, load_config};
use dockhand::error::Result as DockhandResult;

/// Application entry point.
///
/// Installs the tracing subscriber, loads configuration with layered
/// precedence, then dispatches to the subcommand handler.
fn main() -> EyreResult<ExitCode> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli).map_err(Report::from)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let outcome = run(&cli, &config, runtime.handle())?;

    Ok(match outcome {
        CommandOutcome::Success => ExitCode::SUCCESS,
        CommandOutcome::CommandExit { code } => {
            ExitCode::from(u8::try_from(code).ok().filter(|value| *value != 0).unwrap_or(1))
        }
    })
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Execute the CLI command.
///
/// Keeps semantic errors inside the command handlers so the CLI boundary
/// owns conversion to `eyre::Report`.
fn run(
    cli: &Cli,
    config: &AppConfig,
    runtime_handle: &tokio::runtime::Handle,
) -> EyreResult<CommandOutcome> {
    let env = DefaultEnv::new();
    match &cli.command {
        Commands::Check => check(config, runtime_handle, &env).map_err(Report::from),
        Commands::K6(args) => k6(config, args, runtime_handle, &env),
    }
}

/// Ping the configured engine.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn check(
    config: &AppConfig,
    runtime_handle: &tokio::runtime::Handle,
    env: &DefaultEnv,
) -> DockhandResult<CommandOutcome> {
    let outcome = check_engine(config, runtime_handle, env)?;
    println!("container engine is reachable");
    Ok(outcome)
}

/// Run a k6 script against httpbin.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn k6(
    config: &AppConfig,
    args: &K6Args,
    runtime_handle: &tokio::runtime::Handle,
    env: &DefaultEnv,
) -> EyreResult<CommandOutcome> {
    let mut runner = K6Runner::new().with_test_script(args.script.clone());
    for pair in &args.env {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| eyre!("expected KEY=VALUE for --env, got '{pair}'"))?;
        runner = runner.with_env_var(key, value);
    }

    let report = run_k6(K6Params {
        config,
        runner,
        timeout: args.timeout_secs.map(Duration::from_secs),
        runtime_handle,
        env,
    })?;

    match report.outcome {
        CommandOutcome::Success => println!("k6 run against {} passed", report.target),
        CommandOutcome::CommandExit { code } => {
            println!("k6 run against {} failed with exit code {code}:", report.target);
            if let Some(logs) = &report.logs {
                println!("{logs}");
            }
        }
    }
    Ok(report.outcome)
}
