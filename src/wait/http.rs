//! HTTP status probing for the `HttpStatus` wait strategy.

use std::sync::OnceLock;
use std::time::Duration;

use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Build the probe URL for a published endpoint.
pub(super) fn probe_url(host: &str, port: u16, path: &str) -> String {
    let normalised_host = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        String::from(host)
    };

    if path.starts_with('/') {
        format!("http://{normalised_host}:{port}{path}")
    } else {
        format!("http://{normalised_host}:{port}/{path}")
    }
}

/// HTTP client shared by every poll of one wait.
///
/// The client is built on first use, so waits that never issue a request
/// never build one. Reusing it keeps the connection pool warm across polls.
#[derive(Debug, Default)]
pub(super) struct StatusClient {
    client: OnceLock<Option<reqwest::Client>>,
}

impl StatusClient {
    fn client(&self) -> Option<&reqwest::Client> {
        self.client
            .get_or_init(|| {
                reqwest::Client::builder()
                    .timeout(REQUEST_TIMEOUT)
                    .build()
                    .inspect_err(|error| debug!(%error, "failed to build HTTP client"))
                    .ok()
            })
            .as_ref()
    }

    /// GET `url` and report whether it answered with `expected_status`.
    ///
    /// Connection failures are expected while a service boots and count as
    /// "not ready" rather than errors.
    pub(super) async fn status_matches(&self, url: &str, expected_status: u16) -> bool {
        let Some(client) = self.client() else {
            return false;
        };

        match client.get(url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!(url, status, expected_status, "HTTP readiness check answered");
                status == expected_status
            }
            Err(error) => {
                debug!(url, %error, "HTTP readiness check failed");
                false
            }
        }
    }
}
