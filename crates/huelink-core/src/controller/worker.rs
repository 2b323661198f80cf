// ── Per-device command worker ──
//
// One task per device that has received a command. Commands for a device
// run strictly in arrival order; different devices run concurrently.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::CoreError;
use crate::message::{PendingCommand, ResponseEnvelope, topic};
use crate::registry::DeviceRegistry;
use crate::service::{Capability, ServicePayload, Services};
use crate::transport::{QoS, Transport};

/// Shared dependencies handed to every worker.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub registry: Arc<DeviceRegistry>,
    pub services: Arc<Services>,
    pub transport: Arc<dyn Transport>,
    pub timeout: Duration,
}

pub(crate) struct WorkerHandle {
    tx: mpsc::UnboundedSender<PendingCommand>,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub(crate) fn spawn(device_id: String, ctx: WorkerContext, stop: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(device_id, ctx, rx, stop.clone()));
        Self { tx, stop, task }
    }

    pub(crate) fn send(&self, command: PendingCommand) -> Result<(), CoreError> {
        self.tx.send(command).map_err(|_| CoreError::QueueClosed)
    }

    /// Signal the worker to stop after its current command.
    pub(crate) fn stop(self) -> JoinHandle<()> {
        self.stop.cancel();
        self.task
    }

    #[cfg(test)]
    pub(crate) fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

async fn run(
    device_id: String,
    ctx: WorkerContext,
    mut rx: mpsc::UnboundedReceiver<PendingCommand>,
    stop: CancellationToken,
) {
    debug!(device_id = %device_id, "worker started");
    while !stop.is_cancelled() {
        let next = tokio::select! {
            biased;
            () = stop.cancelled() => break,
            next = tokio::time::timeout(ctx.timeout, rx.recv()) => next,
        };
        match next {
            Ok(Some(command)) => handle(&ctx, command).await,
            Ok(None) => break,
            Err(_) => {}
        }
    }
    debug!(device_id = %device_id, "worker stopped");
}

async fn handle(ctx: &WorkerContext, command: PendingCommand) {
    let payload = match execute(ctx, &command).await {
        Ok(payload) => payload,
        Err(e) => {
            error!(
                device_id = %command.device_id,
                service_id = %command.service_id,
                error = %e,
                "command failed"
            );
            ServicePayload::failed()
        }
    };

    let response = match serde_json::to_string(&payload) {
        Ok(data) => ResponseEnvelope {
            command_id: command.envelope.command_id.clone(),
            data,
        },
        Err(e) => {
            error!(error = %e, "encoding response failed");
            return;
        }
    };
    let body = match serde_json::to_string(&response) {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "encoding response failed");
            return;
        }
    };

    let response_topic = topic::response(&command.device_id, &command.service_id);
    if let Err(e) = ctx.transport.publish(&response_topic, body, QoS::AtLeastOnce) {
        warn!(topic = %response_topic, error = %e, "publishing response failed");
    }
}

async fn execute(ctx: &WorkerContext, command: &PendingCommand) -> Result<ServicePayload, CoreError> {
    let capability = Capability::from_service_id(&command.service_id)?;
    let device = ctx
        .registry
        .get(&command.device_id)
        .ok_or_else(|| CoreError::DeviceNotFound {
            device_id: command.device_id.clone(),
        })?;
    ctx.services
        .execute(capability, &device, command.envelope.data.as_deref())
        .await
}
