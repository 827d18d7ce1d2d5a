//! Mapping of engine connection failures onto [`ContainerError`].
//!
//! A missing or unreadable socket is reported with its path so the user can
//! fix the endpoint; everything else is a generic connection failure.

use std::io::ErrorKind;
use std::path::Path;

use bollard::errors::Error as BollardError;

use crate::error::ContainerError;

/// Filesystem path of a `unix://` or `npipe://` endpoint.
fn socket_path(endpoint: &str) -> Option<&Path> {
    ["unix://", "npipe://"]
        .iter()
        .find_map(|scheme| endpoint.strip_prefix(scheme))
        .map(Path::new)
}

/// Classify a failure to reach the engine at `endpoint`.
pub(super) fn classify_connection_error(error: &BollardError, endpoint: &str) -> ContainerError {
    let kind = match error {
        BollardError::SocketNotFoundError(_) => Some(ErrorKind::NotFound),
        BollardError::IOError { err } => Some(nested_io_kind(err).unwrap_or_else(|| err.kind())),
        other => nested_io_kind(other),
    };

    match (kind, socket_path(endpoint)) {
        (Some(ErrorKind::NotFound), Some(path)) => ContainerError::SocketNotFound {
            path: path.to_path_buf(),
        },
        (Some(ErrorKind::PermissionDenied), Some(path)) => ContainerError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ContainerError::ConnectionFailed {
            message: error.to_string(),
        },
    }
}

/// Kind of the first `io::Error` among the sources of `error`.
fn nested_io_kind(error: &(dyn std::error::Error + 'static)) -> Option<ErrorKind> {
    std::iter::successors(error.source(), |current| current.source())
        .find_map(|source| source.downcast_ref::<std::io::Error>().map(std::io::Error::kind))
}
