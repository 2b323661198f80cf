// ── Bridge discovery and health supervision ──
//
// Resolves the bridge address (cloud directory first, local sweep
// second), then keeps checking that the address still answers as the
// configured bridge and rediscovers it when it stops doing so.

pub mod scan;

use std::sync::Arc;

use huelink_api::{DirectoryClient, TransportConfig};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::Bridge;
use crate::config::DiscoverySettings;
use crate::error::CoreError;

pub struct Discovery {
    bridge: Arc<Bridge>,
    directory: DirectoryClient,
    settings: DiscoverySettings,
}

impl Discovery {
    pub fn new(bridge: Arc<Bridge>, settings: DiscoverySettings) -> Result<Self, CoreError> {
        let transport = TransportConfig::public(bridge.request_timeout());
        let directory = DirectoryClient::new(settings.nupnp_url.clone(), &transport)?;
        Ok(Self::with_directory(bridge, directory, settings))
    }

    pub fn with_directory(
        bridge: Arc<Bridge>,
        directory: DirectoryClient,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            bridge,
            directory,
            settings,
        }
    }

    /// Resolve the bridge address, retrying forever, then spawn the health
    /// monitor and return its handle.
    pub async fn start_discovery(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        loop {
            if let Some(host) = self.discover().await {
                info!(bridge_id = self.bridge.id(), %host, "discovered bridge");
                self.bridge.set_host(host);
                break;
            }
            tokio::time::sleep(self.settings.delay).await;
        }
        tokio::spawn(Arc::clone(self).health_loop(cancel))
    }

    /// One resolution attempt: directory, then subnet sweep.
    pub async fn discover(&self) -> Option<String> {
        info!(bridge_id = self.bridge.id(), "trying to discover bridge");

        match self.discover_via_directory().await {
            Ok(Some(host)) => return Some(host),
            Ok(None) => warn!(bridge_id = self.bridge.id(), "bridge not found via directory"),
            Err(e) => warn!(bridge_id = self.bridge.id(), error = %e, "directory discovery failed"),
        }

        match self.discover_via_sweep().await {
            Ok(Some(host)) => Some(host),
            Ok(None) => {
                warn!(bridge_id = self.bridge.id(), "subnet sweep found no bridge");
                None
            }
            Err(e) => {
                warn!(bridge_id = self.bridge.id(), error = %e, "subnet sweep failed");
                None
            }
        }
    }

    async fn discover_via_directory(&self) -> Result<Option<String>, CoreError> {
        let Some(host) = self.directory.find_bridge(self.bridge.id()).await? else {
            return Ok(None);
        };
        if self.bridge.client().validate(&host, self.bridge.id()).await {
            Ok(Some(host))
        } else {
            debug!(%host, "directory candidate failed validation");
            Ok(None)
        }
    }

    async fn discover_via_sweep(&self) -> Result<Option<String>, CoreError> {
        let local = scan::local_ip(self.settings.ip_file.as_deref())?;
        debug!(%local, "sweeping local /24");

        let alive = scan::fan_out(scan::ip_range(local), scan::PING_BATCH, scan::ping).await;
        debug!(count = alive.len(), "hosts answered ping");

        let candidates = alive.into_iter().map(|ip| ip.to_string()).collect();
        let bridge = Arc::clone(&self.bridge);
        let valid = scan::fan_out(candidates, scan::VALIDATE_BATCH, move |host: String| {
            let bridge = Arc::clone(&bridge);
            async move { bridge.client().validate(&host, bridge.id()).await }
        })
        .await;

        Ok(valid.into_iter().next())
    }

    // ── Health ───────────────────────────────────────────────────────

    async fn health_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut fail_safe = FailSafe::new(self.settings.check_fail_safe);

        loop {
            let mut delay = self.settings.check_delay;

            let healthy = match self.bridge.host() {
                Some(host) => self.bridge.client().identify(&host, self.bridge.id()).await,
                None => false,
            };

            match fail_safe.record(healthy) {
                Verdict::Healthy { recovered: true } => {
                    info!(bridge_id = self.bridge.id(), "bridge reachable again at known address");
                }
                Verdict::Healthy { recovered: false } | Verdict::Suspect => {}
                Verdict::Rediscover => {
                    warn!(bridge_id = self.bridge.id(), "bridge moved or is unreachable, rediscovering");
                    if let Some(host) = self.discover().await {
                        info!(bridge_id = self.bridge.id(), %host, "discovered bridge");
                        self.bridge.set_host(host);
                        fail_safe.reset();
                    } else {
                        delay = self.settings.delay;
                    }
                }
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }
        debug!("bridge health monitor stopped");
    }
}

// ── Fail-safe counter ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Healthy { recovered: bool },
    /// Failed, but still within the tolerated number of failures.
    Suspect,
    Rediscover,
}

#[derive(Debug)]
struct FailSafe {
    failures: u32,
    threshold: u32,
}

impl FailSafe {
    fn new(threshold: u32) -> Self {
        Self {
            failures: 0,
            threshold,
        }
    }

    fn record(&mut self, healthy: bool) -> Verdict {
        if healthy {
            let recovered = self.failures > 0;
            self.failures = 0;
            return Verdict::Healthy { recovered };
        }
        if self.failures > self.threshold {
            Verdict::Rediscover
        } else {
            self.failures += 1;
            Verdict::Suspect
        }
    }

    fn reset(&mut self) {
        self.failures = 0;
    }
}
