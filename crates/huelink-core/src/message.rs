// ── Device-manager message protocol ──
//
// Topic grammar and JSON envelopes exchanged with the platform over MQTT.

use serde::{Deserialize, Serialize};

use crate::model::{Device, DeviceState};

// ── Topics ───────────────────────────────────────────────────────────

pub mod topic {
    /// Broadcast by the platform to ask every gateway to re-announce.
    pub const REFRESH: &str = "device-manager/refresh";

    /// Device registration and removal for this gateway.
    pub fn device(client_id: &str) -> String {
        format!("device-manager/device/{client_id}")
    }

    /// Last-will topic, published by the broker when the gateway drops.
    pub fn last_will(client_id: &str) -> String {
        format!("device-manager/device/{client_id}/lw")
    }

    /// Wildcard subscription for every service of one device.
    pub fn command(device_id: &str) -> String {
        format!("command/{device_id}/+")
    }

    pub fn response(device_id: &str, service_id: &str) -> String {
        format!("response/{device_id}/{service_id}")
    }

    /// Split `command/{device_id}/{service_id}`.
    ///
    /// Device ids may themselves contain `/`, so the service id is taken
    /// from the last segment.
    pub fn parse_command(topic: &str) -> Option<(&str, &str)> {
        let rest = topic.strip_prefix("command/")?;
        let (device_id, service_id) = rest.rsplit_once('/')?;
        if device_id.is_empty() || service_id.is_empty() {
            return None;
        }
        Some((device_id, service_id))
    }
}

// ── Device announcements ─────────────────────────────────────────────

/// Message published on [`topic::device`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum DeviceMessage {
    Set {
        device_id: String,
        data: DeviceInfo,
    },
    Delete {
        device_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub state: DeviceState,
    pub device_type: String,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

impl DeviceMessage {
    pub fn set(device: &Device) -> Self {
        Self::Set {
            device_id: device.id.clone(),
            data: DeviceInfo {
                name: device.metadata.name.clone(),
                state: device.state(),
                device_type: device.device_type.clone(),
                attributes: device
                    .metadata
                    .attributes()
                    .into_iter()
                    .map(|(key, value)| Attribute {
                        key: key.to_owned(),
                        value: value.to_owned(),
                    })
                    .collect(),
            },
        }
    }

    pub fn delete(device_id: impl Into<String>) -> Self {
        Self::Delete {
            device_id: device_id.into(),
        }
    }
}

// ── Commands ─────────────────────────────────────────────────────────

/// Inbound command payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandEnvelope {
    #[serde(alias = "id")]
    pub command_id: String,
    /// JSON-encoded arguments, if the service takes any.
    #[serde(default)]
    pub data: Option<String>,
}

/// Outbound response payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseEnvelope {
    pub command_id: String,
    /// JSON-encoded result; always carries `status`.
    pub data: String,
}

/// A parsed command waiting for its device worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub device_id: String,
    pub service_id: String,
    pub envelope: CommandEnvelope,
}
