// huelink-core: gateway engine between a Hue bridge and a device-manager
// MQTT platform.
//
// Discovery locates and supervises the bridge, the monitor mirrors the
// bridge inventory into the registry and announces changes, and the
// controller runs inbound commands on per-device workers.

pub mod bridge;
pub mod color;
pub mod config;
pub mod controller;
pub mod discovery;
pub mod error;
pub mod message;
pub mod model;
pub mod monitor;
pub mod mqtt;
pub mod registry;
pub mod router;
pub mod service;
pub mod transport;

// ── Primary re-exports ──────────────────────────────────────────────

pub use bridge::Bridge;
pub use config::{
    BridgeSettings, ControllerSettings, DeviceTypeMap, DiscoverySettings, GatewayConfig,
    MonitorSettings, MqttSettings,
};
pub use controller::Controller;
pub use discovery::Discovery;
pub use error::CoreError;
pub use message::{CommandEnvelope, DeviceMessage, PendingCommand, ResponseEnvelope};
pub use model::{Device, DeviceData, DeviceKind, DeviceMetadata, DeviceState};
pub use monitor::{Monitor, RefreshRequest, RefreshSchedule};
pub use mqtt::MqttTransport;
pub use registry::DeviceRegistry;
pub use router::Router;
pub use service::{Capability, ServicePayload, Services};
pub use transport::{QoS, Transport};
