// ── Inbound message router ──
//
// Turns raw MQTT publishes into refresh requests or pending commands.
// Nothing here fails loudly: malformed input is logged and dropped.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::message::{CommandEnvelope, PendingCommand, topic};
use crate::monitor::RefreshSchedule;

pub struct Router {
    refresh: Arc<RefreshSchedule>,
    commands: mpsc::UnboundedSender<PendingCommand>,
}

impl Router {
    pub fn new(
        refresh: Arc<RefreshSchedule>,
        commands: mpsc::UnboundedSender<PendingCommand>,
    ) -> Self {
        Self { refresh, commands }
    }

    pub async fn route(&self, topic_name: &str, payload: &[u8]) {
        if topic_name == topic::REFRESH {
            debug!("refresh requested by platform");
            self.refresh.schedule(false).await;
            return;
        }

        let Some((device_id, service_id)) = topic::parse_command(topic_name) else {
            warn!(topic = topic_name, "message on unknown topic, dropping");
            return;
        };

        let envelope: CommandEnvelope = match serde_json::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(topic = topic_name, error = %e, "malformed command, dropping");
                return;
            }
        };

        let command = PendingCommand {
            device_id: device_id.to_owned(),
            service_id: service_id.to_owned(),
            envelope,
        };
        if self.commands.send(command).is_err() {
            error!(topic = topic_name, "command queue closed, dropping");
        }
    }
}
