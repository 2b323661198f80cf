// Bridge identity endpoints
//
// Unauthenticated liveness and identity checks used by discovery. Both hit
// `/api/na/config`; the liveness check always uses plain HTTP.

use tracing::trace;

use crate::error::Error;
use crate::hub::client::{HubClient, Scheme};
use crate::hub::models::BridgeConfig;

impl HubClient {
    /// Liveness check: `HEAD http://{host}/api/na/config` answers 200.
    ///
    /// Any failure (refused, timeout, non-200) reads as "not alive".
    pub async fn check_alive(&self, host: &str) -> bool {
        let Ok(url) = Self::config_url(Scheme::Http, host) else {
            return false;
        };
        match self.http().head(url).send().await {
            Ok(resp) => resp.status() == reqwest::StatusCode::OK,
            Err(e) => {
                trace!(host, error = %e, "liveness check failed");
                false
            }
        }
    }

    /// Identity check: fetch the unauthenticated bridge configuration.
    ///
    /// `GET {scheme}://{host}/api/na/config`
    pub async fn bridge_config(&self, host: &str) -> Result<BridgeConfig, Error> {
        let url = Self::config_url(self.scheme(), host)?;
        self.get(url).await
    }

    /// `true` if `host` answers as the bridge with `bridge_id`
    /// (case-insensitive).
    pub async fn identify(&self, host: &str, bridge_id: &str) -> bool {
        match self.bridge_config(host).await {
            Ok(cfg) => cfg.bridge_id.eq_ignore_ascii_case(bridge_id),
            Err(e) => {
                trace!(host, error = %e, "identity check failed");
                false
            }
        }
    }

    /// Liveness followed by identity.
    pub async fn validate(&self, host: &str, bridge_id: &str) -> bool {
        self.check_alive(host).await && self.identify(host, bridge_id).await
    }
}
