// Bridge API response and request types
//
// Models for the bridge's v1 JSON API. Collections come back as a map of
// slot number to device object; acknowledgements as an array of
// `{"success": ..}` / `{"error": ..}` objects. The bridge is inconsistent
// about field presence across device classes, so `state` and `config`
// are kept as raw JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Inventory ────────────────────────────────────────────────────────

/// Raw `lights` / `sensors` collection: slot number -> device object.
///
/// Entries are left as JSON so a single malformed device cannot fail the
/// whole listing; callers parse each entry with [`HubDevice::from_value`].
pub type HubInventory = BTreeMap<String, Value>;

/// A single light or sensor as reported in a collection listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubDevice {
    pub name: String,
    #[serde(rename = "modelid")]
    pub model_id: String,
    #[serde(rename = "type")]
    pub hub_type: String,
    #[serde(rename = "manufacturername")]
    pub manufacturer: String,
    #[serde(rename = "swversion")]
    pub firmware_version: String,
    #[serde(rename = "uniqueid")]
    pub unique_id: String,
    #[serde(default, rename = "productname")]
    pub product_name: Option<String>,
    #[serde(default)]
    pub state: Value,
    #[serde(default)]
    pub config: Value,
}

impl HubDevice {
    /// Parse one collection entry. Fails when a required field is absent.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Response of `GET .../lights/{slot}` and `GET .../sensors/{slot}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HubDeviceState {
    pub state: Value,
    #[serde(default)]
    pub config: Option<Value>,
}

// ── Bridge configuration ─────────────────────────────────────────────

/// Unauthenticated subset of `GET /api/na/config`.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(rename = "bridgeid")]
    pub bridge_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "apiversion")]
    pub api_version: Option<String>,
    #[serde(default, rename = "swversion")]
    pub firmware_version: Option<String>,
}

// ── State update ─────────────────────────────────────────────────────

/// Body of `PUT .../lights/{slot}/state`.
///
/// Absent fields are omitted from the request so the bridge leaves them
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StateUpdate {
    pub on: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xy: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ct: Option<u16>,
    #[serde(rename = "transitiontime", skip_serializing_if = "Option::is_none")]
    pub transition_time: Option<u16>,
}

// ── Acknowledgements ─────────────────────────────────────────────────

/// One element of the bridge's acknowledgement array.
#[derive(Debug, Deserialize)]
pub(crate) struct AckEntry {
    #[serde(default)]
    pub success: Option<Value>,
    #[serde(default)]
    pub error: Option<HubErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HubErrorBody {
    #[serde(default)]
    pub description: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hub_device_requires_uniqueid() {
        let value = json!({
            "name": "Hue color lamp 1",
            "modelid": "LCT015",
            "type": "Extended color light",
            "manufacturername": "Signify Netherlands B.V.",
            "swversion": "1.88.1",
        });
        let err = HubDevice::from_value(value).unwrap_err();
        assert!(err.to_string().contains("uniqueid"));
    }

    #[test]
    fn state_update_omits_unset_fields() {
        let update = StateUpdate {
            on: true,
            bri: Some(128),
            transition_time: Some(0),
            ..StateUpdate::default()
        };
        let body = serde_json::to_value(&update).unwrap();
        assert_eq!(body, json!({ "on": true, "bri": 128, "transitiontime": 0 }));
    }
}
