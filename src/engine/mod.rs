//! Container engine access.
//!
//! [`EngineClient`] is the seam between lifecycle logic and a concrete
//! engine. [`DockerEngine`] implements it over the Docker API, which Podman
//! also serves. The engine socket is resolved through a priority-based
//! fallback chain:
//!
//! 1. CLI argument (`--engine-socket`)
//! 2. Config file (`engine_socket` in TOML)
//! 3. `DOCKHAND_ENGINE_SOCKET` environment variable
//! 4. `DOCKER_HOST` environment variable
//! 5. `CONTAINER_HOST` environment variable
//! 6. `PODMAN_HOST` environment variable
//! 7. Platform default (`/var/run/docker.sock` on Unix)

mod archive;
mod client;
mod connection;
mod docker;
#[cfg(test)]
pub(crate) mod fake;
mod inspection;

pub(crate) use archive::build_copy_archive;
pub use client::{EngineClient, EngineFuture, LogStream, collect_logs};
pub use connection::{EngineConnector, SocketResolver};
pub use docker::{DEFAULT_STOP_TIMEOUT_SECS, DockerEngine, MANAGED_LABEL};
pub use inspection::{Address, ContainerInspection, EngineStatus, HostBinding};
