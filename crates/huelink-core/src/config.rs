// ── Runtime gateway configuration ──
//
// These types describe *how* the gateway talks to the bridge and the
// broker. They carry credentials and tuning but never read the
// environment; `huelink-config` builds a `GatewayConfig` and hands it in.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

/// Bridge identity and access.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Vendor-assigned bridge id (e.g. `001788FFFE23BFC2`).
    pub id: String,
    /// Whitelisted API username.
    pub api_key: SecretString,
    /// Path segment in front of the key, normally `api`.
    pub api_path: String,
    /// Timeout for every bridge and directory request.
    pub request_timeout: Duration,
}

/// Discovery and health-check tuning.
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    /// Cloud discovery directory (N-UPnP).
    pub nupnp_url: Url,
    /// Pause between failed resolution attempts.
    pub delay: Duration,
    /// Interval between health checks once the bridge is known.
    pub check_delay: Duration,
    /// Failed checks tolerated before the bridge is rediscovered.
    pub check_fail_safe: u32,
    /// File holding the host's LAN address, used by the subnet sweep.
    pub ip_file: Option<PathBuf>,
}

/// Maps bridge device types (`"Extended color light"`, `"ZLLPresence"`, ...)
/// to platform device-type ids. Types absent from the map are unsupported.
pub type DeviceTypeMap = HashMap<String, String>;

/// Inventory polling.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Interval between bridge inventory polls.
    pub query_delay: Duration,
    /// Prepended to the bridge `uniqueid` to form platform device ids.
    pub device_id_prefix: String,
    /// Gateway client id, scopes the device-announcement topic.
    pub client_id: String,
    pub device_types: DeviceTypeMap,
}

/// Command dispatch and worker lifecycle.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Bounded wait on the inbound command queue.
    pub command_timeout: Duration,
    /// Bounded wait on each worker's private queue.
    pub worker_timeout: Duration,
    /// Minimum time between worker garbage collections.
    pub gc_interval: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(30),
            worker_timeout: Duration::from_secs(30),
            gc_interval: Duration::from_secs(120),
        }
    }
}

/// Broker connection.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub clean_session: bool,
    pub keep_alive: Duration,
    pub credentials: Option<(String, SecretString)>,
    /// Outbound requests queued while the event loop is busy or reconnecting.
    pub request_capacity: usize,
}

/// Everything the gateway engine needs, built once at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bridge: BridgeSettings,
    pub discovery: DiscoverySettings,
    pub monitor: MonitorSettings,
    pub controller: ControllerSettings,
    pub mqtt: MqttSettings,
}
