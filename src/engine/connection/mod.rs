//! Socket resolution and container engine connection.
//!
//! This module resolves container engine socket endpoints from configuration,
//! environment variables, and platform defaults, and establishes connections
//! using the Bollard library.

mod error_classification;
mod health_check;

use bollard::Docker;
use tracing::debug;

use crate::error::DockhandError;
use error_classification::classify_connection_error;

/// Environment variable names checked in fallback order after configuration sources.
const FALLBACK_ENV_VARS: &[&str] = &["DOCKER_HOST", "CONTAINER_HOST", "PODMAN_HOST"];

/// Connection timeout in seconds for Docker/Podman API connections.
const CONNECTION_TIMEOUT_SECS: u64 = 120;

/// Timeout in seconds for health check operations.
const HEALTH_CHECK_TIMEOUT_SECS: u64 = 10;

/// Default socket path for Unix platforms.
#[cfg(unix)]
const DEFAULT_SOCKET: &str = "unix:///var/run/docker.sock";

/// Default socket path for Windows platforms.
#[cfg(windows)]
const DEFAULT_SOCKET: &str = "npipe:////./pipe/docker_engine";

/// Resolves container engine socket endpoints from environment variables.
///
/// # Type Parameters
///
/// * `E` - An environment provider implementing the `mockable::Env` trait,
///   allowing for testable environment variable access.
pub struct SocketResolver<'a, E: mockable::Env> {
    env: &'a E,
}

impl<'a, E: mockable::Env> SocketResolver<'a, E> {
    /// Creates a new socket resolver with the given environment provider.
    #[must_use]
    pub const fn new(env: &'a E) -> Self {
        Self { env }
    }

    /// Resolves the socket endpoint from fallback environment variables.
    ///
    /// Checks `DOCKER_HOST`, `CONTAINER_HOST`, then `PODMAN_HOST`, skipping
    /// unset and empty values.
    #[must_use]
    pub fn resolve_from_env(&self) -> Option<String> {
        FALLBACK_ENV_VARS
            .iter()
            .filter_map(|var_name| self.env.string(var_name))
            .find(|value| !value.is_empty())
    }

    /// Returns the platform default socket path.
    #[must_use]
    pub const fn default_socket() -> &'static str {
        DEFAULT_SOCKET
    }
}

/// An engine endpoint normalized to a URI bollard accepts.
#[derive(Debug, PartialEq, Eq)]
enum Endpoint {
    /// `unix://` socket or `npipe://` named pipe.
    Socket(String),
    /// `http://` endpoint.
    Http(String),
}

impl Endpoint {
    /// `tcp://` is rewritten to `http://`. Bare paths starting with `\\` or
    /// `//` are named pipes and every other bare path is a Unix socket; the
    /// decision is syntactic, not per platform.
    fn parse(socket: &str) -> Self {
        if socket.starts_with("unix://") || socket.starts_with("npipe://") {
            Self::Socket(String::from(socket))
        } else if let Some(authority) = socket.strip_prefix("tcp://") {
            Self::Http(format!("http://{authority}"))
        } else if socket.starts_with("http://") {
            Self::Http(String::from(socket))
        } else if socket.starts_with("\\\\") || socket.starts_with("//") {
            Self::Socket(format!("npipe://{socket}"))
        } else {
            Self::Socket(format!("unix://{socket}"))
        }
    }

    fn uri(&self) -> &str {
        match self {
            Self::Socket(uri) | Self::Http(uri) => uri,
        }
    }
}

/// Opens `bollard` clients for Docker or Podman engines.
pub struct EngineConnector;

impl EngineConnector {
    /// Connect to the engine at `socket`.
    ///
    /// Accepts `unix://`, `npipe://`, `tcp://`, `http://` and bare socket
    /// paths.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::SocketNotFound` or
    /// `ContainerError::PermissionDenied` when the socket path is missing or
    /// inaccessible, and `ContainerError::ConnectionFailed` otherwise.
    pub fn connect(socket: &str) -> Result<Docker, DockhandError> {
        let endpoint = Endpoint::parse(socket);
        debug!(socket = endpoint.uri(), "connecting to container engine");

        let connected = match &endpoint {
            Endpoint::Socket(uri) => {
                Docker::connect_with_socket(uri, CONNECTION_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            }
            Endpoint::Http(uri) => {
                Docker::connect_with_http(uri, CONNECTION_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            }
        };
        connected.map_err(|error| DockhandError::from(classify_connection_error(&error, endpoint.uri())))
    }

    /// Connect using the resolved socket from configuration and environment.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::connect`].
    pub fn connect_with_fallback<E: mockable::Env>(
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
    ) -> Result<Docker, DockhandError> {
        let socket = Self::resolve_socket(config_socket, resolver);
        Self::connect(&socket)
    }

    /// Resolves the socket endpoint without establishing a connection.
    ///
    /// Resolution order:
    /// 1. `config_socket` (from CLI, config file, or `DOCKHAND_ENGINE_SOCKET`)
    /// 2. `DOCKER_HOST`, `CONTAINER_HOST`, `PODMAN_HOST` (via resolver)
    /// 3. Platform default socket
    #[must_use]
    pub fn resolve_socket<E: mockable::Env>(
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
    ) -> String {
        config_socket
            .filter(|s| !s.is_empty())
            .map(String::from)
            .or_else(|| resolver.resolve_from_env())
            .unwrap_or_else(|| SocketResolver::<E>::default_socket().to_owned())
    }
}
