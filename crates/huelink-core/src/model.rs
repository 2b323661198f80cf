// ── Device domain types ──
//
// A `Device` is the gateway's view of one bridge light or sensor. Its
// connectivity `state` is always derived from `data`: the only way to
// change either is `set_data`, which recomputes the state.

use serde::Serialize;
use serde_json::Value;
use strum::Display;

/// Which bridge collection a device lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceKind {
    Light,
    Sensor,
}

impl DeviceKind {
    /// Path segment of the bridge collection (`lights` / `sensors`).
    pub fn collection(self) -> &'static str {
        match self {
            Self::Light => "lights",
            Self::Sensor => "sensors",
        }
    }
}

/// Platform-facing connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceState {
    Online,
    Offline,
}

impl DeviceState {
    /// Online iff the bridge reports `reachable: true`, either in `state`
    /// (lights) or in `config` (sensors).
    pub fn from_data(data: &DeviceData) -> Self {
        let reachable = |v: &Value| v.get("reachable").and_then(Value::as_bool) == Some(true);
        if reachable(&data.state) || reachable(&data.config) {
            Self::Online
        } else {
            Self::Offline
        }
    }
}

/// Descriptive attributes that rarely change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceMetadata {
    pub name: String,
    pub model_id: String,
    /// Bridge-local numeric slot, used to address the device.
    pub slot: String,
    pub manufacturer: String,
    pub firmware_version: String,
    pub product_name: Option<String>,
}

impl DeviceMetadata {
    /// Key/value attributes announced to the device manager.
    pub fn attributes(&self) -> Vec<(&'static str, &str)> {
        let mut attrs = vec![
            ("model", self.model_id.as_str()),
            ("manufacturer", self.manufacturer.as_str()),
            ("firmware", self.firmware_version.as_str()),
            ("slot", self.slot.as_str()),
        ];
        if let Some(product) = &self.product_name {
            attrs.push(("product", product.as_str()));
        }
        attrs
    }
}

/// Volatile state as last reported by the bridge.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceData {
    pub state: Value,
    pub config: Value,
}

/// A bridge device as tracked by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub id: String,
    pub kind: DeviceKind,
    /// Platform device-type id.
    pub device_type: String,
    /// Bridge-reported type string.
    pub hub_type: String,
    pub metadata: DeviceMetadata,
    data: DeviceData,
    state: DeviceState,
}

impl Device {
    pub fn new(
        id: impl Into<String>,
        kind: DeviceKind,
        device_type: impl Into<String>,
        hub_type: impl Into<String>,
        metadata: DeviceMetadata,
        data: DeviceData,
    ) -> Self {
        let state = DeviceState::from_data(&data);
        Self {
            id: id.into(),
            kind,
            device_type: device_type.into(),
            hub_type: hub_type.into(),
            metadata,
            data,
            state,
        }
    }

    pub fn data(&self) -> &DeviceData {
        &self.data
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Replace the volatile data and re-derive the connectivity state.
    ///
    /// Returns `true` if the state flipped.
    pub fn set_data(&mut self, data: DeviceData) -> bool {
        let previous = self.state;
        self.data = data;
        self.state = DeviceState::from_data(&self.data);
        previous != self.state
    }

    /// Bridge slot used in request paths.
    pub fn slot(&self) -> &str {
        &self.metadata.slot
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn state_follows_reachable_flag() {
        let mut device = fixtures::light("AA:BB", true);
        assert_eq!(device.state(), DeviceState::Online);

        let flipped = device.set_data(DeviceData {
            state: json!({ "on": false, "reachable": false }),
            config: Value::Null,
        });
        assert!(flipped);
        assert_eq!(device.state(), DeviceState::Offline);

        let flipped = device.set_data(DeviceData {
            state: json!({ "on": true, "reachable": false }),
            config: Value::Null,
        });
        assert!(!flipped);
    }

    #[test]
    fn sensors_report_reachability_in_config() {
        let data = DeviceData {
            state: json!({ "presence": false }),
            config: json!({ "on": true, "battery": 80, "reachable": true }),
        };
        assert_eq!(DeviceState::from_data(&data), DeviceState::Online);
    }

    #[test]
    fn missing_reachable_is_offline() {
        assert_eq!(
            DeviceState::from_data(&DeviceData::default()),
            DeviceState::Offline
        );
    }

    #[test]
    fn attributes_skip_missing_product_name() {
        let mut meta = fixtures::metadata("Desk", "1");
        meta.product_name = None;
        let keys: Vec<_> = meta.attributes().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["model", "manufacturer", "firmware", "slot"]);
    }
}
