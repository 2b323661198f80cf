// ── Bridge connection ──
//
// Identity, credentials and the current network address of the bridge.
// The address is swapped atomically by discovery; everyone else only
// reads it, and a value that is stale for one cycle is fine.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use huelink_api::{HubClient, TransportConfig};

use crate::config::BridgeSettings;
use crate::error::CoreError;

pub struct Bridge {
    id: String,
    client: HubClient,
    host: ArcSwapOption<String>,
    request_timeout: Duration,
}

impl Bridge {
    /// Build a bridge handle with a TLS-lenient HTTP client.
    pub fn new(settings: &BridgeSettings) -> Result<Self, CoreError> {
        let transport = TransportConfig::bridge(settings.request_timeout);
        let client = HubClient::new(
            settings.api_path.clone(),
            settings.api_key.clone(),
            &transport,
        )?;
        Ok(Self::with_client(
            &settings.id,
            client,
            settings.request_timeout,
        ))
    }

    /// Build a bridge handle around an existing client.
    pub fn with_client(id: &str, client: HubClient, request_timeout: Duration) -> Self {
        Self {
            id: id.to_uppercase(),
            client,
            host: ArcSwapOption::empty(),
            request_timeout,
        }
    }

    /// Upper-cased bridge id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn client(&self) -> &HubClient {
        &self.client
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Current address, `None` until discovery first succeeds.
    pub fn host(&self) -> Option<Arc<String>> {
        self.host.load_full()
    }

    /// Current address or [`CoreError::BridgeUnresolved`].
    pub fn require_host(&self) -> Result<Arc<String>, CoreError> {
        self.host().ok_or_else(|| CoreError::BridgeUnresolved {
            bridge_id: self.id.clone(),
        })
    }

    pub(crate) fn set_host(&self, host: String) {
        self.host.store(Some(Arc::new(host)));
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("id", &self.id)
            .field("host", &self.host())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use huelink_api::Scheme;
    use secrecy::SecretString;

    use super::*;

    /// Plain-HTTP bridge pointing at `host` (usually a wiremock address).
    pub(crate) fn bridge(host: Option<&str>) -> Arc<Bridge> {
        let client = HubClient::with_client(
            reqwest::Client::new(),
            Scheme::Http,
            "api",
            SecretString::from("key".to_string()),
        );
        let bridge = Bridge::with_client("001788fffe23bfc2", client, Duration::from_secs(2));
        if let Some(host) = host {
            bridge.set_host(host.to_owned());
        }
        Arc::new(bridge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_uppercased_and_host_starts_empty() {
        let bridge = fixtures::bridge(None);
        assert_eq!(bridge.id(), "001788FFFE23BFC2");
        assert!(bridge.host().is_none());
        assert!(matches!(
            bridge.require_host(),
            Err(CoreError::BridgeUnresolved { .. })
        ));

        bridge.set_host("192.168.1.20".into());
        assert_eq!(bridge.host().as_deref().map(String::as_str), Some("192.168.1.20"));
    }
}
