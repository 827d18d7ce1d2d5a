//! Integration tests for the `load_config()` public API.
//!
//! These run against the real process environment, so each test clears the
//! `DOCKHAND_*` variables first and runs serially.


use std::io::Write;
use std::time::Duration;

use camino::Utf8PathBuf;
use dockhand::config::{Cli, Commands, load_config};
use serial_test::serial;
use tempfile::NamedTempFile;
use test_utils::clear_dockhand_env;

/// Helper: Creates a CLI struct with a config file path.
///
/// Uses the `Check` subcommand as it requires no additional arguments.
const fn cli_with_config(config_path: Option<Utf8PathBuf>) -> Cli {
    Cli {
        config: config_path,
        engine_socket: None,
        command: Commands::Check,
    }
}

fn temp_config_file(content: &str) -> std::io::Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(content.as_bytes())?;
    Ok(file)
}

fn utf8_path(file: &NamedTempFile) -> Utf8PathBuf {
    Utf8PathBuf::try_from(file.path().to_path_buf()).expect("path should be valid UTF-8")
}

#[test]
#[serial]
fn load_config_reads_file_passed_with_config_flag() {
    let _guard = clear_dockhand_env();

    let config_file = temp_config_file(
        r#"
        engine_socket = "unix:///from/config/file.sock"

        [readiness]
        timeout_secs = 15

        [teardown]
        capture_logs = false
    "#,
    )
    .expect("failed to create temp config");

    let config =
        load_config(&cli_with_config(Some(utf8_path(&config_file)))).expect("config should load");

    assert_eq!(
        config.engine_socket.as_deref(),
        Some("unix:///from/config/file.sock")
    );
    assert_eq!(config.readiness.timeout(), Duration::from_secs(15));
    assert!(!config.teardown.capture_logs);
    // Unset fields keep their defaults.
    assert_eq!(config.readiness.poll_initial_ms, 100);
    assert_eq!(config.teardown.stop_timeout_secs, 10);
}

#[test]
#[serial]
fn load_config_env_overrides_file_and_cli_overrides_env() {
    let guard = clear_dockhand_env();
    guard.set("DOCKHAND_ENGINE_SOCKET", "unix:///from/env.sock");
    guard.set("DOCKHAND_READINESS_TIMEOUT_SECS", "42");

    let config_file = temp_config_file(
        r#"
        engine_socket = "unix:///from/file.sock"

        [readiness]
        timeout_secs = 15
    "#,
    )
    .expect("failed to create temp config");

    let from_env =
        load_config(&cli_with_config(Some(utf8_path(&config_file)))).expect("config should load");
    assert_eq!(
        from_env.engine_socket.as_deref(),
        Some("unix:///from/env.sock")
    );
    assert_eq!(from_env.readiness.timeout_secs, 42);

    let cli = Cli {
        engine_socket: Some(String::from("unix:///from/cli.sock")),
        ..cli_with_config(Some(utf8_path(&config_file)))
    };
    let from_cli = load_config(&cli).expect("config should load");
    assert_eq!(
        from_cli.engine_socket.as_deref(),
        Some("unix:///from/cli.sock")
    );
    assert_eq!(from_cli.readiness.timeout_secs, 42);
}

#[test]
#[serial]
fn load_config_uses_config_path_env_var() {
    let guard = clear_dockhand_env();
    let config_file = temp_config_file(
        r"
        [teardown]
        stop_timeout_secs = 3
    ",
    )
    .expect("failed to create temp config");
    guard.set("DOCKHAND_CONFIG_PATH", utf8_path(&config_file).as_str());

    let config = load_config(&cli_with_config(None)).expect("config should load");

    assert_eq!(config.teardown.stop_timeout_secs, 3);
}

#[test]
#[serial]
fn load_config_rejects_missing_explicit_config_file() {
    let _guard = clear_dockhand_env();

    let cli = cli_with_config(Some(Utf8PathBuf::from("/nonexistent/dockhand.toml")));
    let error = load_config(&cli).expect_err("missing explicit config should fail");

    assert!(
        error.to_string().contains("/nonexistent/dockhand.toml"),
        "unexpected error: {error}"
    );
}

#[test]
#[serial]
fn load_config_rejects_malformed_config_file() {
    let _guard = clear_dockhand_env();
    let config_file =
        temp_config_file("[readiness\ntimeout_secs = ").expect("failed to create temp config");

    let result = load_config(&cli_with_config(Some(utf8_path(&config_file))));

    assert!(result.is_err(), "malformed TOML should be rejected");
}

#[test]
#[serial]
fn load_config_fails_on_invalid_bool_env_var() {
    let guard = clear_dockhand_env();
    guard.set("DOCKHAND_TEARDOWN_CAPTURE_LOGS", "maybe");

    let error = load_config(&cli_with_config(None)).expect_err("invalid bool should fail");

    assert!(
        error.to_string().contains("DOCKHAND_TEARDOWN_CAPTURE_LOGS"),
        "unexpected error: {error}"
    );
}

#[test]
#[serial]
fn load_config_fails_on_invalid_u64_env_var() {
    let guard = clear_dockhand_env();
    guard.set("DOCKHAND_READINESS_POLL_MAX_MS", "soon");

    let error = load_config(&cli_with_config(None)).expect_err("invalid integer should fail");

    assert!(
        error.to_string().contains("DOCKHAND_READINESS_POLL_MAX_MS"),
        "unexpected error: {error}"
    );
}
