// ── MQTT adapter ──
//
// `rumqttc` client options, the `Transport` implementation, and the
// event-loop driver that feeds inbound messages to the router.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, LastWill, MqttOptions, Packet, QoS,
};
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::MqttSettings;
use crate::error::CoreError;
use crate::message::topic;
use crate::monitor::RefreshSchedule;
use crate::router::Router;
use crate::transport::Transport;

/// Pause after a connection error before polling again.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub fn mqtt_options(settings: &MqttSettings) -> MqttOptions {
    let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
    options.set_keep_alive(settings.keep_alive);
    options.set_clean_session(settings.clean_session);
    options.set_last_will(LastWill::new(
        topic::last_will(&settings.client_id),
        "1",
        QoS::ExactlyOnce,
        false,
    ));
    if let Some((user, password)) = &settings.credentials {
        options.set_credentials(user, password.expose_secret());
    }
    options
}

/// Create the client and its (not yet polled) event loop.
pub fn connect(settings: &MqttSettings) -> (MqttTransport, EventLoop) {
    let (client, eventloop) =
        AsyncClient::new(mqtt_options(settings), settings.request_capacity.max(1));
    (MqttTransport { client }, eventloop)
}

// ── Transport ────────────────────────────────────────────────────────

/// Non-blocking publisher over `rumqttc::AsyncClient`.
#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
}

impl Transport for MqttTransport {
    fn publish(&self, topic: &str, payload: String, qos: QoS) -> Result<(), CoreError> {
        debug!(topic, ?qos, "publish");
        self.client
            .try_publish(topic, qos, false, payload)
            .map_err(|e| CoreError::Publish {
                topic: topic.to_owned(),
                reason: e.to_string(),
            })
    }

    fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), CoreError> {
        debug!(topic, ?qos, "subscribe");
        self.client
            .try_subscribe(topic, qos)
            .map_err(|e| CoreError::Subscribe {
                topic: topic.to_owned(),
                reason: e.to_string(),
            })
    }

    fn unsubscribe(&self, topic: &str) -> Result<(), CoreError> {
        debug!(topic, "unsubscribe");
        self.client
            .try_unsubscribe(topic)
            .map_err(|e| CoreError::Unsubscribe {
                topic: topic.to_owned(),
                reason: e.to_string(),
            })
    }
}

// ── Event loop ───────────────────────────────────────────────────────

/// Drive the connection until cancelled. `rumqttc` reconnects on the next
/// poll after an error.
pub async fn run_event_loop(
    mut eventloop: EventLoop,
    transport: Arc<dyn Transport>,
    router: Arc<Router>,
    refresh: Arc<RefreshSchedule>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("connected to broker");
                    if let Err(e) = transport.subscribe(topic::REFRESH, QoS::AtLeastOnce) {
                        error!(error = %e, "subscribing refresh topic failed");
                    }
                    refresh.schedule(true).await;
                } else {
                    error!(code = ?ack.code, "broker refused connection");
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                router.route(&publish.topic, &publish.payload).await;
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("broker closed the connection");
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "broker connection error");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
        }
    }
    debug!("mqtt event loop stopped");
}
