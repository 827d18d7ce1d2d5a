//! Defaults, serialisation, and conversion tests for configuration types.

use std::time::Duration;

use rstest::rstest;

use super::helpers::{app_config_from_full_toml, app_config_from_partial_toml};
use crate::config::{AppConfig, ReadinessConfig, TeardownConfig};
use crate::handle::HandleSettings;
use crate::wait::PollSchedule;

#[rstest]
fn app_config_engine_socket_defaults_to_none() {
    assert!(AppConfig::default().engine_socket.is_none());
}

#[rstest]
fn readiness_defaults_match_handle_defaults() {
    let config = AppConfig::default();
    assert_eq!(config.handle_settings(), HandleSettings::default());
}

#[rstest]
fn full_toml_populates_every_section(app_config_from_full_toml: AppConfig) {
    let config = app_config_from_full_toml;

    assert_eq!(
        config.engine_socket.as_deref(),
        Some("unix:///run/podman/podman.sock")
    );
    assert_eq!(
        config.readiness,
        ReadinessConfig {
            timeout_secs: 120,
            poll_initial_ms: 50,
            poll_max_ms: 800,
            poll_multiplier: 3,
            cancel_grace_ms: 250,
        }
    );
    assert_eq!(
        config.teardown,
        TeardownConfig {
            stop_timeout_secs: 3,
            capture_logs: false,
        }
    );
}

#[rstest]
fn partial_toml_keeps_section_defaults(app_config_from_partial_toml: AppConfig) {
    let config = app_config_from_partial_toml;

    assert_eq!(config.readiness.timeout_secs, 5);
    assert_eq!(config.readiness.poll_initial_ms, 100);
    assert_eq!(config.teardown, TeardownConfig::default());
}

#[rstest]
fn handle_settings_follow_config(app_config_from_full_toml: AppConfig) {
    let settings = app_config_from_full_toml.handle_settings();

    assert_eq!(settings.default_timeout, Duration::from_secs(120));
    assert!(!settings.capture_logs);
    assert_eq!(
        settings.schedule,
        PollSchedule::new(Duration::from_millis(50), Duration::from_millis(800), 3)
    );
}

#[rstest]
fn cancel_grace_converts_to_duration(app_config_from_full_toml: AppConfig) {
    assert_eq!(
        app_config_from_full_toml.readiness.cancel_grace(),
        Duration::from_millis(250)
    );
}

#[rstest]
fn zero_multiplier_yields_a_fixed_schedule() {
    let readiness = ReadinessConfig {
        poll_multiplier: 0,
        poll_initial_ms: 40,
        poll_max_ms: 40,
        ..ReadinessConfig::default()
    };

    assert_eq!(
        readiness.schedule(),
        PollSchedule::fixed(Duration::from_millis(40))
    );
}
