//! Shared fixtures and helper functions for config tests.

use std::sync::Arc;

use mockable::MockEnv;
use ortho_config::MergeComposer;
use rstest::fixture;

use crate::config::AppConfig;

/// Fixture providing an `AppConfig` parsed from a full TOML example.
#[fixture]
pub fn app_config_from_full_toml() -> AppConfig {
    let toml = r#"
        engine_socket = "unix:///run/podman/podman.sock"

        [readiness]
        timeout_secs = 120
        poll_initial_ms = 50
        poll_max_ms = 800
        poll_multiplier = 3
        cancel_grace_ms = 250

        [teardown]
        stop_timeout_secs = 3
        capture_logs = false
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Fixture providing an `AppConfig` parsed from a minimal TOML example.
#[fixture]
pub fn app_config_from_partial_toml() -> AppConfig {
    let toml = r#"
        engine_socket = "unix:///tmp/docker.sock"

        [readiness]
        timeout_secs = 5
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Helper: Creates a `MergeComposer` with defaults layer already pushed.
pub fn create_composer_with_defaults() -> Result<MergeComposer, serde_json::Error> {
    let mut composer = MergeComposer::new();
    let defaults = ortho_config::serde_json::to_value(AppConfig::default())?;
    composer.push_defaults(defaults);
    Ok(composer)
}

/// Helper: Merges layers from a composer into `AppConfig`.
pub fn merge_config(composer: MergeComposer) -> Result<AppConfig, Arc<ortho_config::OrthoError>> {
    AppConfig::merge_from_layers(composer.layers())
}

/// Helper: Asserts that a config has all default values.
pub fn assert_config_has_defaults(config: &AppConfig) {
    assert!(
        config.engine_socket.is_none(),
        "engine_socket should be None"
    );
    assert_eq!(config.readiness.timeout_secs, 60);
    assert_eq!(config.readiness.poll_initial_ms, 100);
    assert_eq!(config.readiness.poll_max_ms, 2_000);
    assert_eq!(config.readiness.poll_multiplier, 2);
    assert_eq!(config.readiness.cancel_grace_ms, 5_000);
    assert_eq!(config.teardown.stop_timeout_secs, 10);
    assert!(
        config.teardown.capture_logs,
        "teardown.capture_logs should be true"
    );
}

/// Helper: Builds a `MockEnv` that answers only for `vars`.
pub fn env_with(vars: &[(&str, &str)]) -> MockEnv {
    let owned_vars: Vec<(String, String)> = vars
        .iter()
        .map(|(k, v)| (String::from(*k), String::from(*v)))
        .collect();
    let mut env = MockEnv::new();
    env.expect_string().returning(move |key| {
        owned_vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    });
    env
}
