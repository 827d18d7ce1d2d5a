//! The engine client seam consumed by handles and readiness checks.
//!
//! This abstraction keeps lifecycle and readiness logic testable without a
//! running daemon. Implementations are expected to tolerate concurrent calls
//! for different containers.

use std::future::Future;
use std::pin::Pin;

use futures_util::{Stream, StreamExt};

use super::inspection::ContainerInspection;
use crate::error::ContainerError;
use crate::spec::ContainerSpec;

/// Boxed future type returned by [`EngineClient`] implementors.
pub type EngineFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, ContainerError>> + Send + 'a>>;

/// Boxed log stream returned by [`EngineClient::stream_logs`].
pub type LogStream<'a> = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ContainerError>> + Send + 'a>>;

/// Primitive container operations provided by a container engine.
pub trait EngineClient: Send + Sync {
    /// Create a container from `spec` and return its engine-assigned ID.
    fn create_container(&self, spec: &ContainerSpec) -> EngineFuture<'_, String>;

    /// Extract a tar `archive` at the container's filesystem root.
    fn copy_to_container(&self, container_id: &str, archive: Vec<u8>) -> EngineFuture<'_, ()>;

    /// Start a created container.
    fn start_container(&self, container_id: &str) -> EngineFuture<'_, ()>;

    /// Stop a container if it is running, then remove it.
    fn stop_and_remove(&self, container_id: &str) -> EngineFuture<'_, ()>;

    /// Inspect a container's runtime state.
    fn inspect_container(&self, container_id: &str) -> EngineFuture<'_, ContainerInspection>;

    /// Stream the container's combined output from the beginning, without
    /// following.
    fn stream_logs(&self, container_id: &str) -> LogStream<'_>;
}

/// Read a container's log stream to the end.
///
/// # Errors
///
/// Returns the first error yielded by the stream.
pub async fn collect_logs<C: EngineClient + ?Sized>(
    client: &C,
    container_id: &str,
) -> Result<Vec<u8>, ContainerError> {
    let mut stream = client.stream_logs(container_id);
    let mut collected = vec![];

    while let Some(chunk) = stream.next().await {
        collected.extend_from_slice(&chunk?);
    }

    Ok(collected)
}
