//! Configuration loading with layered precedence.
//!
//! Precedence (lowest to highest): application defaults, configuration file,
//! environment variables, command-line arguments.
//!
//! Layers are composed manually with `MergeComposer` rather than through
//! `OrthoConfig::load()`: the `Cli` struct owns subcommand dispatch, the
//! `--config` flag must be honoured before discovery, and typed environment
//! variables must fail fast instead of being silently ignored.
//!
//! # Environment Variable Handling
//!
//! Environment variables with unparseable values (e.g.,
//! `DOCKHAND_TEARDOWN_CAPTURE_LOGS=maybe`) return an error immediately. String
//! fields such as `DOCKHAND_ENGINE_SOCKET` are always accepted.

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use mockable::Env;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{AppConfig, Cli};
use crate::error::{ConfigError, Result};

/// The type of value expected from an environment variable.
#[derive(Clone, Copy)]
enum EnvVarType {
    /// String value (always accepted).
    String,
    /// Boolean value (`true`/`false`).
    Bool,
    /// Unsigned integer.
    U64,
}

/// Specification for a single environment variable mapping.
struct EnvVarSpec {
    /// The environment variable name (e.g., `DOCKHAND_ENGINE_SOCKET`).
    env_var: &'static str,
    /// The JSON path segments (e.g., `["readiness", "timeout_secs"]`).
    path: &'static [&'static str],
    /// The expected value type.
    var_type: EnvVarType,
}

/// Table of all environment variables and their JSON paths.
const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    EnvVarSpec {
        env_var: "DOCKHAND_ENGINE_SOCKET",
        path: &["engine_socket"],
        var_type: EnvVarType::String,
    },
    // Readiness fields
    EnvVarSpec {
        env_var: "DOCKHAND_READINESS_TIMEOUT_SECS",
        path: &["readiness", "timeout_secs"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "DOCKHAND_READINESS_POLL_INITIAL_MS",
        path: &["readiness", "poll_initial_ms"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "DOCKHAND_READINESS_POLL_MAX_MS",
        path: &["readiness", "poll_max_ms"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "DOCKHAND_READINESS_POLL_MULTIPLIER",
        path: &["readiness", "poll_multiplier"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "DOCKHAND_READINESS_CANCEL_GRACE_MS",
        path: &["readiness", "cancel_grace_ms"],
        var_type: EnvVarType::U64,
    },
    // Teardown fields
    EnvVarSpec {
        env_var: "DOCKHAND_TEARDOWN_STOP_TIMEOUT_SECS",
        path: &["teardown", "stop_timeout_secs"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "DOCKHAND_TEARDOWN_CAPTURE_LOGS",
        path: &["teardown", "capture_logs"],
        var_type: EnvVarType::Bool,
    },
];

/// Returns the list of environment variable names recognised by the config loader.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

/// Load a configuration file and push it to the composer.
fn load_config_file(path: &Utf8PathBuf, composer: &mut MergeComposer) -> Result<()> {
    let current_dir = Utf8PathBuf::from(".");
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| current_dir.as_ref());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {e}"),
        }
    })?;

    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;

    let value =
        toml::from_str::<serde_json::Value>(&content).map_err(|e| ConfigError::ParseError {
            message: format!("failed to parse {path}: {e}"),
        })?;

    composer.push_file(value, Some(path.clone()));
    Ok(())
}

/// Load configuration with full layer precedence from the process
/// environment.
///
/// # Errors
///
/// Returns `ConfigError` if a configuration file is malformed, a typed
/// environment variable cannot be parsed, or the layers fail to merge.
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    load_config_with_env(cli, &mockable::DefaultEnv::new())
}

/// Load configuration with full layer precedence, reading environment
/// variables through `env`.
///
/// An explicit `--config` path that does not exist is an error; discovered
/// paths are optional.
///
/// # Errors
///
/// Returns `ConfigError` if the explicit configuration file is missing, a
/// configuration file is malformed, a typed environment variable cannot be
/// parsed, or the layers fail to merge.
pub fn load_config_with_env<E: Env>(cli: &Cli, env: &E) -> Result<AppConfig> {
    let mut composer = MergeComposer::new();

    let defaults =
        serde_json::to_value(AppConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    if let Some(path) = config_path(cli, env)? {
        load_config_file(&path, &mut composer)?;
    }

    let env_values = collect_env_vars(env)?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;

    Ok(config)
}

/// Pick the configuration file: `--config`, then `DOCKHAND_CONFIG_PATH`, then
/// the discovered dotfile and XDG candidates.
fn config_path<E: Env>(cli: &Cli, env: &E) -> Result<Option<Utf8PathBuf>> {
    if let Some(path) = &cli.config {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.clone().into_std_path_buf(),
            }
            .into());
        }
        return Ok(Some(path.clone()));
    }

    if let Some(path) = env
        .string("DOCKHAND_CONFIG_PATH")
        .filter(|value| !value.is_empty())
        .map(Utf8PathBuf::from)
    {
        return Ok(path.exists().then_some(path));
    }

    let discovery = ConfigDiscovery::builder("dockhand")
        .config_file_name("config.toml")
        .dotfile_name(".dockhand.toml")
        .build();
    Ok(discovery
        .candidates()
        .into_iter()
        .filter(|p| p.exists())
        .find_map(|p| Utf8PathBuf::try_from(p).ok()))
}

/// Collect `DOCKHAND_` environment variables into a JSON value.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if a typed environment variable has an
/// unparseable value.
fn collect_env_vars<E: Env>(env: &E) -> Result<Value> {
    let mut root = Map::new();

    for spec in ENV_VAR_SPECS {
        let Some(raw_value) = env.string(spec.env_var) else {
            continue;
        };

        let json_value = match spec.var_type {
            EnvVarType::String => Value::String(raw_value),
            EnvVarType::Bool => match raw_value.parse::<bool>() {
                Ok(b) => Value::Bool(b),
                Err(_) => {
                    return Err(ConfigError::InvalidValue {
                        field: spec.env_var.to_owned(),
                        reason: format!("expected bool (true/false), got '{raw_value}'"),
                    }
                    .into());
                }
            },
            EnvVarType::U64 => match raw_value.parse::<u64>() {
                Ok(n) => Value::Number(n.into()),
                Err(_) => {
                    return Err(ConfigError::InvalidValue {
                        field: spec.env_var.to_owned(),
                        reason: format!("expected unsigned integer, got '{raw_value}'"),
                    }
                    .into());
                }
            },
        };

        insert_at_path(&mut root, spec.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

/// Insert a value at a nested path in a JSON map, creating intermediate
/// objects as needed.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for &segment in parents {
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = entry.as_object_mut() else {
            return;
        };
        current = obj;
    }

    current.insert(field.to_owned(), value);
}

/// Build a JSON value containing CLI overrides.
fn build_cli_overrides(cli: &Cli) -> Value {
    let mut overrides = Map::new();

    if let Some(socket) = &cli.engine_socket {
        overrides.insert(String::from("engine_socket"), Value::String(socket.clone()));
    }

    if overrides.is_empty() {
        Value::Null
    } else {
        Value::Object(overrides)
    }
}
