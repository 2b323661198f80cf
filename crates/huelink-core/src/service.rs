// ── Capability translation layer ──
//
// Maps platform services (`setPower`, `getColor`, ...) onto bridge
// requests and back. Set capabilities issue one state update; get
// capabilities answer from the cached registry data, refreshed by a
// single read when the bridge answers in time.

use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use huelink_api::StateUpdate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use tracing::{debug, error, warn};

use crate::bridge::Bridge;
use crate::color::ConverterCache;
use crate::error::CoreError;
use crate::model::{Device, DeviceData, DeviceKind};

// ── Capabilities ─────────────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, IntoStaticStr, EnumIter,
)]
#[strum(serialize_all = "camelCase")]
pub enum Capability {
    SetPower,
    GetPower,
    SetColor,
    GetColor,
    SetBrightness,
    GetBrightness,
    SetKelvin,
    GetKelvin,
    GetPresence,
    GetBattery,
    GetButtonEvent,
}

impl Capability {
    /// Resolve a service id from a command topic.
    pub fn from_service_id(service_id: &str) -> Result<Self, CoreError> {
        service_id.parse().map_err(|_| CoreError::UnknownService {
            service_id: service_id.to_owned(),
        })
    }

    pub fn is_set(self) -> bool {
        matches!(
            self,
            Self::SetPower | Self::SetColor | Self::SetBrightness | Self::SetKelvin
        )
    }
}

/// Get-capability that reports a changed bridge state field.
pub fn event_service(field: &str) -> Option<Capability> {
    match field {
        "presence" => Some(Capability::GetPresence),
        "battery" => Some(Capability::GetBattery),
        "buttonevent" => Some(Capability::GetButtonEvent),
        _ => None,
    }
}

// ── Arguments ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PowerArgs {
    power: bool,
}

#[derive(Debug, Deserialize)]
struct ColorArgs {
    red: f64,
    green: f64,
    blue: f64,
    #[serde(default)]
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct BrightnessArgs {
    brightness: f64,
    #[serde(default)]
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct KelvinArgs {
    kelvin: f64,
    #[serde(default)]
    duration: f64,
}

fn parse_args<T: DeserializeOwned>(args: Option<&str>) -> Result<T, CoreError> {
    let raw = args.ok_or_else(|| CoreError::InvalidCommand {
        message: "missing arguments".into(),
    })?;
    Ok(serde_json::from_str(raw)?)
}

// ── Payloads ─────────────────────────────────────────────────────────

/// Result published back to the platform.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServicePayload {
    Status { status: u8 },
    Power { power: bool, status: u8, time: String },
    Color { red: u8, green: u8, blue: u8, status: u8, time: String },
    Brightness { brightness: u8, status: u8, time: String },
    Kelvin { kelvin: u32, status: u8, time: String },
    Presence { presence: bool, status: u8, time: String },
    Battery { level: u64, status: u8, time: String },
    ButtonEvent { event: i64, status: u8, time: String },
}

impl ServicePayload {
    pub fn ok() -> Self {
        Self::Status { status: 0 }
    }

    pub fn failed() -> Self {
        Self::Status { status: 1 }
    }
}

// ── Conversions ──────────────────────────────────────────────────────

/// Percent (0-100, clamped) to bridge brightness (0-255).
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn percent_to_bri(percent: f64) -> u8 {
    (percent.clamp(0.0, 100.0) * 255.0 / 100.0).round_ties_even() as u8
}

/// Bridge brightness to percent.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn bri_to_percent(bri: u64) -> u8 {
    (bri.min(255) as f64 * 100.0 / 255.0).round_ties_even() as u8
}

/// Kelvin to mired. `None` unless positive.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn kelvin_to_mired(kelvin: f64) -> Option<u16> {
    if kelvin.is_nan() || kelvin <= 0.0 {
        return None;
    }
    let mired = (1_000_000.0 / kelvin).round_ties_even();
    Some(mired.min(f64::from(u16::MAX)) as u16)
}

/// Mired to kelvin, rounded to the nearest ten. `None` for zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn mired_to_kelvin(mired: u64) -> Option<u32> {
    if mired == 0 {
        return None;
    }
    let kelvin = (1_000_000.0 / mired as f64).round_ties_even();
    Some(((kelvin / 10.0).round_ties_even() * 10.0) as u32)
}

/// Color channel value, rounded and clamped to 0-255.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn channel(value: f64) -> u8 {
    value.clamp(0.0, 255.0).round_ties_even() as u8
}

/// Seconds to bridge transition time (deciseconds, truncated).
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn transition_time(duration: f64) -> u16 {
    (duration * 10.0).clamp(0.0, f64::from(u16::MAX)) as u16
}

fn now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Bridge `lastupdated` (UTC, no zone) as ISO-8601 with `Z`.
fn event_time(state: &Value) -> String {
    let raw = state.get("lastupdated").and_then(Value::as_str).unwrap_or("none");
    match NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        Ok(ts) => ts.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        Err(_) => {
            debug!(lastupdated = raw, "no usable event timestamp, using current time");
            now()
        }
    }
}

// ── Service executor ─────────────────────────────────────────────────

/// Executes capabilities against the bridge.
pub struct Services {
    bridge: Arc<Bridge>,
    converters: ConverterCache,
}

impl Services {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self {
            bridge,
            converters: ConverterCache::new(),
        }
    }

    /// Run `capability` for `device` with JSON-encoded `args`.
    ///
    /// Bridge failures on set capabilities come back as a `status` 1
    /// payload; malformed arguments and unusable cached data are errors.
    pub async fn execute(
        &self,
        capability: Capability,
        device: &Device,
        args: Option<&str>,
    ) -> Result<ServicePayload, CoreError> {
        if capability.is_set() {
            let update = self.state_update(capability, device, args)?;
            return Ok(self.apply(capability, device, &update).await);
        }

        let cached = read(capability, device, device.data(), &self.converters)?;
        let Some(fresh) = self.fetch(device).await else {
            return Ok(cached);
        };
        match read(capability, device, &fresh, &self.converters) {
            Ok(payload) => Ok(payload),
            Err(e) => {
                warn!(device_id = %device.id, %capability, error = %e, "fresh state unusable, using cached data");
                Ok(cached)
            }
        }
    }

    fn state_update(
        &self,
        capability: Capability,
        device: &Device,
        args: Option<&str>,
    ) -> Result<StateUpdate, CoreError> {
        if device.kind != DeviceKind::Light {
            return Err(CoreError::InvalidCommand {
                message: format!("{capability} is not supported by {}", device.hub_type),
            });
        }

        let update = match capability {
            Capability::SetPower => {
                let args: PowerArgs = parse_args(args)?;
                StateUpdate {
                    on: args.power,
                    ..StateUpdate::default()
                }
            }
            Capability::SetColor => {
                let args: ColorArgs = parse_args(args)?;
                let xy = self
                    .converters
                    .get(&device.metadata.model_id)
                    .rgb_to_xy(channel(args.red), channel(args.green), channel(args.blue))
                    .ok_or_else(|| CoreError::InvalidCommand {
                        message: "black cannot be expressed as a color point".into(),
                    })?;
                StateUpdate {
                    on: true,
                    xy: Some([xy.x, xy.y]),
                    transition_time: Some(transition_time(args.duration)),
                    ..StateUpdate::default()
                }
            }
            Capability::SetBrightness => {
                let args: BrightnessArgs = parse_args(args)?;
                StateUpdate {
                    on: true,
                    bri: Some(percent_to_bri(args.brightness)),
                    transition_time: Some(transition_time(args.duration)),
                    ..StateUpdate::default()
                }
            }
            Capability::SetKelvin => {
                let args: KelvinArgs = parse_args(args)?;
                let ct = kelvin_to_mired(args.kelvin).ok_or_else(|| CoreError::InvalidCommand {
                    message: "kelvin must be positive".into(),
                })?;
                StateUpdate {
                    on: true,
                    ct: Some(ct),
                    transition_time: Some(transition_time(args.duration)),
                    ..StateUpdate::default()
                }
            }
            _ => {
                return Err(CoreError::Internal(format!(
                    "{capability} is not a set capability"
                )));
            }
        };
        Ok(update)
    }

    async fn apply(
        &self,
        capability: Capability,
        device: &Device,
        update: &StateUpdate,
    ) -> ServicePayload {
        let host = match self.bridge.require_host() {
            Ok(host) => host,
            Err(e) => {
                error!(device_id = %device.id, %capability, error = %e, "request failed");
                return ServicePayload::failed();
            }
        };

        match self
            .bridge
            .client()
            .set_light_state(&host, device.slot(), update)
            .await
        {
            Ok(()) => ServicePayload::ok(),
            Err(e) => {
                error!(device_id = %device.id, %capability, error = %e, "request failed");
                ServicePayload::failed()
            }
        }
    }

    /// Fresh state from the bridge, `None` (with a warning) on any failure.
    async fn fetch(&self, device: &Device) -> Option<DeviceData> {
        let host = self.bridge.host()?;
        let client = self.bridge.client();
        let result = match device.kind {
            DeviceKind::Light => client.get_light(&host, device.slot()).await,
            DeviceKind::Sensor => client.get_sensor(&host, device.slot()).await,
        };
        match result {
            Ok(fresh) => Some(DeviceData {
                state: fresh.state,
                config: fresh.config.unwrap_or(Value::Null),
            }),
            Err(e) => {
                warn!(device_id = %device.id, error = %e, "state read failed, using possibly stale data");
                None
            }
        }
    }
}

/// Build a get payload from one data snapshot.
fn read(
    capability: Capability,
    device: &Device,
    data: &DeviceData,
    converters: &ConverterCache,
) -> Result<ServicePayload, CoreError> {
    let missing = |field: &str| CoreError::MissingField {
        device_id: device.id.clone(),
        field: field.to_owned(),
    };
    let state = &data.state;

    let payload = match capability {
        Capability::GetPower => ServicePayload::Power {
            power: state.get("on").and_then(Value::as_bool).ok_or_else(|| missing("on"))?,
            status: 0,
            time: now(),
        },
        Capability::GetColor => {
            let xy = state
                .get("xy")
                .and_then(Value::as_array)
                .and_then(|xy| Some((xy.first()?.as_f64()?, xy.get(1)?.as_f64()?)))
                .ok_or_else(|| missing("xy"))?;
            let (red, green, blue) = converters.get(&device.metadata.model_id).xy_to_rgb(xy.0, xy.1);
            ServicePayload::Color {
                red,
                green,
                blue,
                status: 0,
                time: now(),
            }
        }
        Capability::GetBrightness => ServicePayload::Brightness {
            brightness: bri_to_percent(
                state.get("bri").and_then(Value::as_u64).ok_or_else(|| missing("bri"))?,
            ),
            status: 0,
            time: now(),
        },
        Capability::GetKelvin => ServicePayload::Kelvin {
            kelvin: state
                .get("ct")
                .and_then(Value::as_u64)
                .and_then(mired_to_kelvin)
                .ok_or_else(|| missing("ct"))?,
            status: 0,
            time: now(),
        },
        Capability::GetPresence => ServicePayload::Presence {
            presence: state
                .get("presence")
                .and_then(Value::as_bool)
                .ok_or_else(|| missing("presence"))?,
            status: 0,
            time: event_time(state),
        },
        Capability::GetBattery => ServicePayload::Battery {
            level: data
                .config
                .get("battery")
                .and_then(Value::as_u64)
                .ok_or_else(|| missing("battery"))?,
            status: 0,
            time: now(),
        },
        Capability::GetButtonEvent => ServicePayload::ButtonEvent {
            event: state
                .get("buttonevent")
                .and_then(Value::as_i64)
                .ok_or_else(|| missing("buttonevent"))?,
            status: 0,
            time: event_time(state),
        },
        _ => {
            return Err(CoreError::Internal(format!(
                "{capability} is not a get capability"
            )));
        }
    };
    Ok(payload)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use strum::IntoEnumIterator;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::bridge::fixtures::bridge;
    use crate::model::fixtures::{light, metadata};

    fn sensor(state: Value, config: Value) -> Device {
        Device::new(
            "hue-00:17:88:01:02:03:04:05-02-0406",
            DeviceKind::Sensor,
            "urn:infai:ses:device-type:motion",
            "ZLLPresence",
            metadata("Hall sensor", "4"),
            DeviceData { state, config },
        )
    }

    // ── Conversions ──────────────────────────────────────────────────

    #[test]
    fn brightness_round_trips() {
        assert_eq!(percent_to_bri(100.0), 255);
        assert_eq!(bri_to_percent(255), 100);
        assert_eq!(percent_to_bri(50.0), 128);
        assert_eq!(percent_to_bri(0.0), 0);
        assert_eq!(percent_to_bri(150.0), 255);
        assert_eq!(percent_to_bri(-5.0), 0);
        assert_eq!(percent_to_bri(33.3), 85);
    }

    #[test]
    fn kelvin_round_trips() {
        assert_eq!(kelvin_to_mired(2700.0), Some(370));
        assert_eq!(mired_to_kelvin(370), Some(2700));
        assert_eq!(kelvin_to_mired(6500.0), Some(154));
        assert_eq!(kelvin_to_mired(0.0), None);
        assert_eq!(kelvin_to_mired(-2700.0), None);
        assert_eq!(mired_to_kelvin(0), None);
    }

    #[test]
    fn color_channels_are_rounded_and_clamped() {
        assert_eq!(channel(127.5), 128);
        assert_eq!(channel(300.0), 255);
        assert_eq!(channel(-1.0), 0);
    }

    #[test]
    fn transition_truncates_to_deciseconds() {
        assert_eq!(transition_time(0.0), 0);
        assert_eq!(transition_time(1.25), 12);
        assert_eq!(transition_time(-3.0), 0);
    }

    #[test]
    fn capability_names_are_camel_case() {
        let names: Vec<&'static str> = Capability::iter().map(Into::into).collect();
        assert_eq!(names[0], "setPower");
        assert_eq!(names[10], "getButtonEvent");
        assert_eq!(Capability::from_service_id("getKelvin").unwrap(), Capability::GetKelvin);
        assert!(matches!(
            Capability::from_service_id("reboot"),
            Err(CoreError::UnknownService { .. })
        ));
    }

    #[test]
    fn event_fields_map_to_services() {
        assert_eq!(event_service("presence"), Some(Capability::GetPresence));
        assert_eq!(event_service("buttonevent"), Some(Capability::GetButtonEvent));
        assert_eq!(event_service("bri"), None);
    }

    #[test]
    fn payload_serializes_flat() {
        let payload = ServicePayload::Brightness {
            brightness: 50,
            status: 0,
            time: "2020-01-01T00:00:00Z".into(),
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({ "brightness": 50, "status": 0, "time": "2020-01-01T00:00:00Z" })
        );
        assert_eq!(serde_json::to_value(ServicePayload::failed()).unwrap(), json!({ "status": 1 }));
    }

    // ── Set capabilities ─────────────────────────────────────────────

    #[tokio::test]
    async fn set_brightness_puts_scaled_value() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/key/lights/1/state"))
            .and(body_json(json!({ "on": true, "bri": 128, "transitiontime": 0 })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{ "success": { "/lights/1/state/bri": 128 } }])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let services = Services::new(bridge(Some(&server.address().to_string())));
        let payload = services
            .execute(
                Capability::SetBrightness,
                &light("hue-AA:BB", true),
                Some(r#"{"brightness": 50, "duration": 0}"#),
            )
            .await
            .unwrap();
        assert_eq!(payload, ServicePayload::ok());
    }

    #[tokio::test]
    async fn set_brightness_accepts_float_percent() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/key/lights/1/state"))
            .and(body_json(json!({ "on": true, "bri": 128, "transitiontime": 5 })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{ "success": { "/lights/1/state/bri": 128 } }])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let services = Services::new(bridge(Some(&server.address().to_string())));
        let payload = services
            .execute(
                Capability::SetBrightness,
                &light("hue-AA:BB", true),
                Some(r#"{"brightness": 50.0, "duration": 0.5}"#),
            )
            .await
            .unwrap();
        assert_eq!(payload, ServicePayload::ok());
    }

    #[tokio::test]
    async fn set_kelvin_accepts_float_kelvin() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/key/lights/1/state"))
            .and(body_json(json!({ "on": true, "ct": 370, "transitiontime": 0 })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{ "success": { "/lights/1/state/ct": 370 } }])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let services = Services::new(bridge(Some(&server.address().to_string())));
        let payload = services
            .execute(
                Capability::SetKelvin,
                &light("hue-AA:BB", true),
                Some(r#"{"kelvin": 2700.0}"#),
            )
            .await
            .unwrap();
        assert_eq!(payload, ServicePayload::ok());
    }

    #[tokio::test]
    async fn set_power_bridge_error_is_status_one() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/key/lights/1/state"))
            .and(body_json(json!({ "on": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "error": { "type": 3, "description": "resource, /lights/1, not available" } }
            ])))
            .mount(&server)
            .await;

        let services = Services::new(bridge(Some(&server.address().to_string())));
        let payload = services
            .execute(Capability::SetPower, &light("hue-AA:BB", true), Some(r#"{"power": false}"#))
            .await
            .unwrap();
        assert_eq!(payload, ServicePayload::failed());
    }

    #[tokio::test]
    async fn set_without_host_is_status_one() {
        let services = Services::new(bridge(None));
        let payload = services
            .execute(Capability::SetPower, &light("hue-AA:BB", true), Some(r#"{"power": true}"#))
            .await
            .unwrap();
        assert_eq!(payload, ServicePayload::failed());
    }

    #[tokio::test]
    async fn malformed_arguments_are_rejected() {
        let services = Services::new(bridge(None));
        let device = light("hue-AA:BB", true);

        let err = services
            .execute(Capability::SetKelvin, &device, Some(r#"{"kelvin": "warm"}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidCommand { .. }));

        let err = services
            .execute(Capability::SetColor, &device, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidCommand { .. }));
    }

    // ── Get capabilities ─────────────────────────────────────────────

    #[tokio::test]
    async fn get_kelvin_prefers_fresh_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/key/lights/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "state": { "on": true, "ct": 370, "reachable": true }
            })))
            .mount(&server)
            .await;

        let services = Services::new(bridge(Some(&server.address().to_string())));
        let payload = services
            .execute(Capability::GetKelvin, &light("hue-AA:BB", true), None)
            .await
            .unwrap();
        assert!(matches!(payload, ServicePayload::Kelvin { kelvin: 2700, status: 0, .. }));
    }

    #[tokio::test]
    async fn get_brightness_falls_back_to_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/key/lights/1"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let services = Services::new(bridge(Some(&server.address().to_string())));
        let payload = services
            .execute(Capability::GetBrightness, &light("hue-AA:BB", true), None)
            .await
            .unwrap();
        // cached bri 254 -> 99.6 -> 100
        assert!(matches!(payload, ServicePayload::Brightness { brightness: 100, .. }));
    }

    #[tokio::test]
    async fn get_presence_uses_event_timestamp() {
        let services = Services::new(bridge(None));
        let device = sensor(
            json!({ "presence": true, "lastupdated": "2020-05-04T10:11:12" }),
            json!({ "battery": 87, "reachable": true }),
        );

        let payload = services
            .execute(Capability::GetPresence, &device, None)
            .await
            .unwrap();
        assert_eq!(
            payload,
            ServicePayload::Presence {
                presence: true,
                status: 0,
                time: "2020-05-04T10:11:12Z".into(),
            }
        );

        let payload = services.execute(Capability::GetBattery, &device, None).await.unwrap();
        assert!(matches!(payload, ServicePayload::Battery { level: 87, .. }));
    }

    #[tokio::test]
    async fn get_on_missing_field_is_an_error() {
        let services = Services::new(bridge(None));
        let device = sensor(json!({ "buttonevent": null }), Value::Null);
        let err = services
            .execute(Capability::GetButtonEvent, &device, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingField { ref field, .. } if field == "buttonevent"));
    }
}
