//! Engine health check.

use std::time::Duration;

use bollard::Docker;
use tracing::debug;

use super::{EngineConnector, HEALTH_CHECK_TIMEOUT_SECS};
use crate::error::{ContainerError, DockhandError};

impl EngineConnector {
    /// Verify the engine answers a ping within the health check timeout.
    ///
    /// This confirms the engine is operational, not just that the socket is
    /// reachable.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::HealthCheckTimeout` if no answer arrives in
    /// time, or `ContainerError::HealthCheckFailed` if the ping is rejected.
    pub async fn health_check_async(docker: &Docker) -> Result<(), DockhandError> {
        let timeout = Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS);

        tokio::time::timeout(timeout, docker.ping())
            .await
            .map_err(|_| ContainerError::HealthCheckTimeout {
                seconds: HEALTH_CHECK_TIMEOUT_SECS,
            })?
            .map_err(|e| ContainerError::HealthCheckFailed {
                message: e.to_string(),
            })?;

        debug!("container engine answered ping");
        Ok(())
    }
}
