#![allow(clippy::unwrap_used)]
// End-to-end: discovery resolves the bridge, the monitor announces a new
// light, and a command routed from MQTT reaches the bridge and is answered.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use huelink_api::{DirectoryClient, HubClient, Scheme};
use huelink_core::{
    Bridge, Controller, ControllerSettings, CoreError, DeviceRegistry, Discovery,
    DiscoverySettings, Monitor, MonitorSettings, QoS, RefreshSchedule, Router, Services,
    Transport,
};

const BRIDGE_ID: &str = "001788fffe23bfc2";

// ── Helpers ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Publish { topic: String, payload: Value },
    Subscribe { topic: String },
    Unsubscribe { topic: String },
}

#[derive(Default)]
struct MemoryTransport {
    calls: Mutex<Vec<Call>>,
}

impl MemoryTransport {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn published_to(&self, wanted: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Publish { topic, payload } if topic == wanted => Some(payload),
                _ => None,
            })
            .collect()
    }
}

impl Transport for MemoryTransport {
    fn publish(&self, topic: &str, payload: String, _qos: QoS) -> Result<(), CoreError> {
        let payload = serde_json::from_str(&payload).unwrap();
        self.calls.lock().unwrap().push(Call::Publish {
            topic: topic.to_owned(),
            payload,
        });
        Ok(())
    }

    fn subscribe(&self, topic: &str, _qos: QoS) -> Result<(), CoreError> {
        self.calls.lock().unwrap().push(Call::Subscribe {
            topic: topic.to_owned(),
        });
        Ok(())
    }

    fn unsubscribe(&self, topic: &str) -> Result<(), CoreError> {
        self.calls.lock().unwrap().push(Call::Unsubscribe {
            topic: topic.to_owned(),
        });
        Ok(())
    }
}

async fn mount_bridge(server: &MockServer) {
    let host = server.address().to_string();

    Mock::given(method("GET"))
        .and(path("/nupnp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": BRIDGE_ID, "internalipaddress": host }
        ])))
        .mount(server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/api/na/config"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/na/config"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "bridgeid": "001788FFFE23BFC2" })),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/key/lights"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "1": {
                "name": "Hallway",
                "type": "Extended color light",
                "modelid": "LCT015",
                "manufacturername": "Signify Netherlands B.V.",
                "swversion": "1.50.2",
                "uniqueid": "AA:BB",
                "state": { "on": true, "bri": 254, "xy": [0.3, 0.3], "ct": 366, "reachable": true }
            }
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/key/sensors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(server)
        .await;
}

fn bridge() -> Arc<Bridge> {
    let client = HubClient::with_client(
        reqwest::Client::new(),
        Scheme::Http,
        "api",
        SecretString::from("key".to_string()),
    );
    Arc::new(Bridge::with_client(BRIDGE_ID, client, Duration::from_secs(5)))
}

fn monitor_settings() -> MonitorSettings {
    MonitorSettings {
        query_delay: Duration::from_secs(60),
        device_id_prefix: String::new(),
        client_id: "hue-bridge-dc".into(),
        device_types: [("Extended color light".to_string(), "dt-ext-color".to_string())]
            .into_iter()
            .collect(),
    }
}

async fn wait_for_response(transport: &MemoryTransport, topic: &str) -> Value {
    for _ in 0..100 {
        if let Some(payload) = transport.published_to(topic).into_iter().next() {
            return payload;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no response published on {topic}");
}

// ── Scenario ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_new_light_is_announced_and_commanded() {
    let server = MockServer::start().await;
    mount_bridge(&server).await;
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

    let cancel = CancellationToken::new();
    let bridge = bridge();

    // Discovery
    let nupnp = Url::parse(&format!("{}/nupnp", server.uri())).unwrap();
    let discovery = Arc::new(Discovery::with_directory(
        Arc::clone(&bridge),
        DirectoryClient::with_client(reqwest::Client::new(), nupnp.clone()),
        DiscoverySettings {
            nupnp_url: nupnp,
            delay: Duration::from_millis(10),
            check_delay: Duration::from_secs(60),
            check_fail_safe: 2,
            ip_file: None,
        },
    ));
    let health = discovery.start_discovery(cancel.clone()).await;
    assert_eq!(
        bridge.host().as_deref().map(String::as_str),
        Some(server.address().to_string().as_str())
    );

    // Inventory
    let transport = Arc::new(MemoryTransport::default());
    let registry = Arc::new(DeviceRegistry::new());
    let refresh = Arc::new(RefreshSchedule::default());
    let monitor = Monitor::new(
        Arc::clone(&bridge),
        Arc::clone(&registry),
        transport.clone(),
        Arc::clone(&refresh),
        monitor_settings(),
    );

    let diff = monitor.poll_once().await.unwrap();
    assert!(diff.new.contains("AA:BB"));
    assert!(registry.contains("AA:BB"));

    let announcements = transport.published_to("device-manager/device/hue-bridge-dc");
    assert_eq!(announcements.len(), 1);
    assert_eq!(announcements[0]["method"], "set");
    assert_eq!(announcements[0]["device_id"], "AA:BB");
    assert_eq!(announcements[0]["data"]["state"], "online");
    assert_eq!(announcements[0]["data"]["device_type"], "dt-ext-color");
    let subscriptions: Vec<_> = transport
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::Subscribe { .. }))
        .collect();
    assert_eq!(
        subscriptions,
        vec![Call::Subscribe {
            topic: "command/AA:BB/+".into()
        }]
    );

    // A second poll with an unchanged bridge is quiet.
    let diff = monitor.poll_once().await.unwrap();
    assert!(diff.is_empty());
    assert_eq!(
        transport
            .published_to("device-manager/device/hue-bridge-dc")
            .len(),
        1
    );

    // Command
    let services = Arc::new(Services::new(Arc::clone(&bridge)));
    let controller = Controller::new(
        Arc::clone(&registry),
        services,
        transport.clone(),
        ControllerSettings::default(),
    );
    let dispatch = controller.start().await.unwrap();
    let router = Router::new(Arc::clone(&refresh), controller.command_sender());

    let payload = json!({
        "command_id": "cmd-1",
        "data": json!({ "brightness": 50, "duration": 0 }).to_string(),
    });
    router
        .route(
            "command/AA:BB/setBrightness",
            payload.to_string().as_bytes(),
        )
        .await;

    let response = wait_for_response(&transport, "response/AA:BB/setBrightness").await;
    assert_eq!(response["command_id"], "cmd-1");
    let data: Value = serde_json::from_str(response["data"].as_str().unwrap()).unwrap();
    assert_eq!(data["status"], 0);

    controller.shutdown();
    dispatch.await.unwrap();
    cancel.cancel();
    health.await.unwrap();
}

#[tokio::test]
async fn test_refresh_topic_republishes_on_next_poll() {
    let server = MockServer::start().await;
    mount_bridge(&server).await;

    let cancel = CancellationToken::new();
    let bridge = bridge();
    let nupnp = Url::parse(&format!("{}/nupnp", server.uri())).unwrap();
    let discovery = Arc::new(Discovery::with_directory(
        Arc::clone(&bridge),
        DirectoryClient::with_client(reqwest::Client::new(), nupnp.clone()),
        DiscoverySettings {
            nupnp_url: nupnp,
            delay: Duration::from_millis(10),
            check_delay: Duration::from_secs(60),
            check_fail_safe: 2,
            ip_file: None,
        },
    ));
    let health = discovery.start_discovery(cancel.clone()).await;

    let transport = Arc::new(MemoryTransport::default());
    let registry = Arc::new(DeviceRegistry::new());
    let refresh = Arc::new(RefreshSchedule::default());
    let monitor = Monitor::new(
        Arc::clone(&bridge),
        Arc::clone(&registry),
        transport.clone(),
        Arc::clone(&refresh),
        monitor_settings(),
    );
    monitor.poll_once().await.unwrap();

    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let router = Router::new(Arc::clone(&refresh), tx);
    router.route("device-manager/refresh", b"").await;
    monitor.poll_once().await.unwrap();

    // Initial announcement plus the refresh, without a second subscription.
    assert_eq!(
        transport
            .published_to("device-manager/device/hue-bridge-dc")
            .len(),
        2
    );
    let subscriptions = transport
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::Subscribe { .. }))
        .count();
    assert_eq!(subscriptions, 1);

    cancel.cancel();
    health.await.unwrap();
}
