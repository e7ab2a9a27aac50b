//! Upstream reachability checks.

use crate::client::SourceClient;
use telemetry::health;
use tracing::{debug, error};

/// Check the upstream API answers at all.
///
/// Any HTTP response below 500 counts as reachable; an auth failure still
/// proves the network path works.
pub async fn check_connection(client: &SourceClient) -> bool {
    match client.http.head(client.base_url.clone()).send().await {
        Ok(response) if !response.status().is_server_error() => {
            debug!(status = response.status().as_u16(), "Upstream reachable");
            health().upstream.set_healthy();
            true
        }
        Ok(response) => {
            let status = response.status().as_u16();
            error!(status = status, "Upstream health check failed");
            health()
                .upstream
                .set_unhealthy(format!("upstream returned {}", status));
            false
        }
        Err(e) => {
            error!("Failed to reach upstream: {}", e);
            health().upstream.set_unhealthy(e.to_string());
            false
        }
    }
}
