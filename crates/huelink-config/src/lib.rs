//! Gateway configuration.
//!
//! Serialized defaults layered under `HUELINK_`-prefixed environment
//! variables (`__` separates sections), validated and translated to
//! `huelink_core::GatewayConfig`.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Serialized},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use huelink_core::{
    BridgeSettings, ControllerSettings, DeviceTypeMap, DiscoverySettings, GatewayConfig,
    MonitorSettings, MqttSettings,
};

/// Prefix of every environment variable the gateway reads.
pub const ENV_PREFIX: &str = "HUELINK_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {field} (set {env})")]
    Missing { field: String, env: String },

    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn missing(field: &str) -> Self {
        Self::Missing {
            field: field.into(),
            env: env_name(field),
        }
    }
}

/// `bridge.api_key` → `HUELINK_BRIDGE__API_KEY`
pub fn env_name(field: &str) -> String {
    format!("{ENV_PREFIX}{}", field.replace('.', "__").to_uppercase())
}

// ── Config structs ──────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub broker: Broker,
    #[serde(default)]
    pub logger: Logger,
    #[serde(default)]
    pub client: Client,
    #[serde(default)]
    pub bridge: Bridge,
    #[serde(default)]
    pub discovery: Discovery,
    #[serde(default)]
    pub start_delay: StartDelay,
    #[serde(default)]
    pub device_types: DeviceTypes,
}

#[derive(Deserialize, Serialize)]
pub struct Broker {
    #[serde(default = "default_broker_host")]
    pub host: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for Broker {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            username: None,
            password: None,
        }
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn default_broker_host() -> String {
    "message-broker".into()
}
fn default_broker_port() -> u16 {
    1883
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Logger {
    #[serde(default = "default_level")]
    pub level: String,
    /// Let MQTT client internals log below `warn`.
    #[serde(default)]
    pub enable_mqtt: bool,
}

impl Default for Logger {
    fn default() -> Self {
        Self {
            level: default_level(),
            enable_mqtt: false,
        }
    }
}

fn default_level() -> String {
    "info".into()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Client {
    #[serde(default = "default_client_id")]
    pub id: String,
    #[serde(default)]
    pub clean_session: bool,
    /// Seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive: u64,
    /// Outbound MQTT requests buffered before publishes are dropped.
    #[serde(default = "default_request_capacity")]
    pub request_capacity: usize,
}

impl Default for Client {
    fn default() -> Self {
        Self {
            id: default_client_id(),
            clean_session: false,
            keep_alive: default_keep_alive(),
            request_capacity: default_request_capacity(),
        }
    }
}

fn default_client_id() -> String {
    "hue-bridge-dc".into()
}
fn default_keep_alive() -> u64 {
    10
}
fn default_request_capacity() -> usize {
    4096
}

#[derive(Deserialize, Serialize)]
pub struct Bridge {
    pub id: Option<String>,
    pub api_key: Option<String>,
    #[serde(default = "default_api_path")]
    pub api_path: String,
}

impl Default for Bridge {
    fn default() -> Self {
        Self {
            id: None,
            api_key: None,
            api_path: default_api_path(),
        }
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("id", &self.id)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_path", &self.api_path)
            .finish()
    }
}

fn default_api_path() -> String {
    "api".into()
}

/// Durations are in seconds.
#[derive(Debug, Deserialize, Serialize)]
pub struct Discovery {
    #[serde(default = "default_nupnp_url")]
    pub nupnp_url: String,
    #[serde(default = "default_device_query_delay")]
    pub device_query_delay: u64,
    #[serde(default)]
    pub device_id_prefix: String,
    #[serde(default = "default_delay")]
    pub delay: u64,
    #[serde(default = "default_check_delay")]
    pub check_delay: u64,
    #[serde(default = "default_check_fail_safe")]
    pub check_fail_safe: u32,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_ip_file")]
    pub ip_file: Option<PathBuf>,
}

impl Default for Discovery {
    fn default() -> Self {
        Self {
            nupnp_url: default_nupnp_url(),
            device_query_delay: default_device_query_delay(),
            device_id_prefix: String::new(),
            delay: default_delay(),
            check_delay: default_check_delay(),
            check_fail_safe: default_check_fail_safe(),
            timeout: default_timeout(),
            ip_file: default_ip_file(),
        }
    }
}

fn default_nupnp_url() -> String {
    "https://discovery.meethue.com".into()
}
fn default_device_query_delay() -> u64 {
    10
}
fn default_delay() -> u64 {
    30
}
fn default_check_delay() -> u64 {
    60
}
fn default_check_fail_safe() -> u32 {
    2
}
fn default_timeout() -> u64 {
    5
}
#[allow(clippy::unnecessary_wraps)]
fn default_ip_file() -> Option<PathBuf> {
    Some(PathBuf::from("/opt/host_ip"))
}

/// Randomized pause before startup, in seconds.
#[derive(Debug, Deserialize, Serialize)]
pub struct StartDelay {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_start_min")]
    pub min: u64,
    #[serde(default = "default_start_max")]
    pub max: u64,
}

impl Default for StartDelay {
    fn default() -> Self {
        Self {
            enabled: false,
            min: default_start_min(),
            max: default_start_max(),
        }
    }
}

fn default_start_min() -> u64 {
    5
}
fn default_start_max() -> u64 {
    20
}

impl StartDelay {
    /// The `[min, max]` window, or `None` when disabled.
    pub fn window(&self) -> Option<(Duration, Duration)> {
        self.enabled
            .then(|| (Duration::from_secs(self.min), Duration::from_secs(self.max)))
    }
}

/// Platform device-type ids per bridge device type.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DeviceTypes {
    pub extended_color_light: Option<String>,
    pub color_light: Option<String>,
    pub color_temperature_light: Option<String>,
    pub dimmable_light: Option<String>,
    pub on_off_plug_in_unit: Option<String>,
    pub zll_switch: Option<String>,
    pub zll_presence: Option<String>,
}

impl DeviceTypes {
    /// `(config key, bridge type name, platform id, required)`
    fn entries(&self) -> [(&'static str, &'static str, Option<&str>, bool); 7] {
        [
            ("extended_color_light", "Extended color light", self.extended_color_light.as_deref(), true),
            ("color_light", "Color light", self.color_light.as_deref(), true),
            ("color_temperature_light", "Color temperature light", self.color_temperature_light.as_deref(), false),
            ("dimmable_light", "Dimmable light", self.dimmable_light.as_deref(), false),
            ("on_off_plug_in_unit", "On/Off plug-in unit", self.on_off_plug_in_unit.as_deref(), true),
            ("zll_switch", "ZLLSwitch", self.zll_switch.as_deref(), false),
            ("zll_presence", "ZLLPresence", self.zll_presence.as_deref(), false),
        ]
    }

    /// Map bridge type names to platform ids. Unset optional types are
    /// left out and end up unsupported.
    pub fn to_map(&self) -> Result<DeviceTypeMap, ConfigError> {
        let mut map = DeviceTypeMap::new();
        for (key, hub_type, id, required) in self.entries() {
            match non_empty(id) {
                Some(id) => {
                    map.insert(hub_type.to_owned(), id.to_owned());
                }
                None if required => {
                    return Err(ConfigError::missing(&format!("device_types.{key}")));
                }
                None => {}
            }
        }
        Ok(map)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// ── Loading ─────────────────────────────────────────────────────────

impl Config {
    /// Defaults under the environment, without extracting.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        Ok(figment.extract()?)
    }

    /// Validate and build the engine configuration.
    pub fn to_gateway_config(&self) -> Result<GatewayConfig, ConfigError> {
        let bridge_id = non_empty(self.bridge.id.as_deref())
            .ok_or_else(|| ConfigError::missing("bridge.id"))?;
        let api_key = non_empty(self.bridge.api_key.as_deref())
            .ok_or_else(|| ConfigError::missing("bridge.api_key"))?;
        let nupnp_url = Url::parse(&self.discovery.nupnp_url).map_err(|e| ConfigError::Invalid {
            field: "discovery.nupnp_url".into(),
            reason: e.to_string(),
        })?;
        if self.client.id.trim().is_empty() {
            return Err(ConfigError::missing("client.id"));
        }
        if self.client.request_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "client.request_capacity".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.start_delay.enabled && self.start_delay.min > self.start_delay.max {
            return Err(ConfigError::Invalid {
                field: "start_delay".into(),
                reason: format!(
                    "min ({}) is greater than max ({})",
                    self.start_delay.min, self.start_delay.max
                ),
            });
        }

        let credentials = match (&self.broker.username, &self.broker.password) {
            (Some(user), Some(password)) => {
                Some((user.clone(), SecretString::from(password.clone())))
            }
            (Some(user), None) => Some((user.clone(), SecretString::from(String::new()))),
            (None, Some(_)) => {
                return Err(ConfigError::missing("broker.username"));
            }
            (None, None) => None,
        };

        let request_timeout = Duration::from_secs(self.discovery.timeout);

        Ok(GatewayConfig {
            bridge: BridgeSettings {
                id: bridge_id.to_owned(),
                api_key: SecretString::from(api_key.to_owned()),
                api_path: self.bridge.api_path.clone(),
                request_timeout,
            },
            discovery: DiscoverySettings {
                nupnp_url,
                delay: Duration::from_secs(self.discovery.delay),
                check_delay: Duration::from_secs(self.discovery.check_delay),
                check_fail_safe: self.discovery.check_fail_safe,
                ip_file: self.discovery.ip_file.clone(),
            },
            monitor: MonitorSettings {
                query_delay: Duration::from_secs(self.discovery.device_query_delay),
                device_id_prefix: self.discovery.device_id_prefix.clone(),
                client_id: self.client.id.clone(),
                device_types: self.device_types.to_map()?,
            },
            controller: ControllerSettings::default(),
            mqtt: MqttSettings {
                host: self.broker.host.clone(),
                port: self.broker.port,
                client_id: self.client.id.clone(),
                clean_session: self.client.clean_session,
                keep_alive: Duration::from_secs(self.client.keep_alive),
                credentials,
                request_capacity: self.client.request_capacity,
            },
        })
    }
}

/// Load the configuration from defaults and the environment.
pub fn load_config() -> Result<Config, ConfigError> {
    Config::from_figment(&Config::figment())
}
