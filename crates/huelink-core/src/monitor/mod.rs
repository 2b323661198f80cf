// ── Inventory monitor ──
//
// Polls the bridge's `lights` and `sensors` collections, reconciles them
// with the registry, and announces every change on the device topic.
// Each mutation is published first and committed only when the publish
// was accepted, so registry and platform never drift apart for longer
// than one cycle.

mod diff;
mod refresh;

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashSet;
use huelink_api::{HubDevice, HubInventory};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use diff::{InventoryDiff, QueriedDevice, diff};
pub use refresh::{RefreshRequest, RefreshSchedule};

use crate::bridge::Bridge;
use crate::config::MonitorSettings;
use crate::error::CoreError;
use crate::message::{DeviceMessage, topic};
use crate::model::{DeviceData, DeviceKind, DeviceMetadata};
use crate::registry::DeviceRegistry;
use crate::service::{Capability, event_service};
use crate::transport::{QoS, Transport};

pub struct Monitor {
    bridge: Arc<Bridge>,
    registry: Arc<DeviceRegistry>,
    transport: Arc<dyn Transport>,
    refresh: Arc<RefreshSchedule>,
    settings: MonitorSettings,
    device_topic: String,
    /// Hub types already reported as unsupported.
    unsupported: DashSet<String>,
}

impl Monitor {
    pub fn new(
        bridge: Arc<Bridge>,
        registry: Arc<DeviceRegistry>,
        transport: Arc<dyn Transport>,
        refresh: Arc<RefreshSchedule>,
        settings: MonitorSettings,
    ) -> Self {
        let device_topic = topic::device(&settings.client_id);
        Self {
            bridge,
            registry,
            transport,
            refresh,
            settings,
            device_topic,
            unsupported: DashSet::new(),
        }
    }

    /// Record an out-of-band re-announcement for the next cycle.
    pub async fn schedule_refresh(&self, subscribe: bool) {
        self.refresh.schedule(subscribe).await;
    }

    /// Spawn the poll loop.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(&self, cancel: CancellationToken) {
        info!(interval = ?self.settings.query_delay, "inventory monitor started");
        loop {
            match self.poll_once().await {
                Ok(_) => {}
                Err(e) if e.is_transient() => warn!(error = %e, "inventory poll failed, retrying next cycle"),
                Err(e) => error!(error = %e, "inventory poll failed"),
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.settings.query_delay) => {}
            }
        }
        debug!("inventory monitor stopped");
    }

    /// One full cycle: pending refresh, query, reconcile.
    pub async fn poll_once(&self) -> Result<InventoryDiff, CoreError> {
        match self.refresh.take().await {
            RefreshRequest::Idle => {}
            RefreshRequest::Publish => self.republish(false),
            RefreshRequest::PublishAndSubscribe => self.republish(true),
        }

        let queried = self.query().await?;
        Ok(self.reconcile(queried))
    }

    // ── Query ────────────────────────────────────────────────────────

    async fn query(&self) -> Result<BTreeMap<String, QueriedDevice>, CoreError> {
        let host = self.bridge.require_host()?;
        let client = self.bridge.client();

        let lights = client.list_lights(&host).await?;
        let sensors = client.list_sensors(&host).await?;

        let mut queried = BTreeMap::new();
        self.collect(DeviceKind::Light, lights, &mut queried);
        self.collect(DeviceKind::Sensor, sensors, &mut queried);
        Ok(queried)
    }

    fn collect(
        &self,
        kind: DeviceKind,
        inventory: HubInventory,
        out: &mut BTreeMap<String, QueriedDevice>,
    ) {
        for (slot, value) in inventory {
            let Some(hub_type) = value.get("type").and_then(Value::as_str) else {
                error!(%kind, slot = %slot, "device entry has no type, skipping");
                continue;
            };
            let Some(device_type) = self.settings.device_types.get(hub_type) else {
                if self.unsupported.insert(hub_type.to_owned()) {
                    warn!(hub_type, "unsupported device type");
                }
                continue;
            };
            let device_type = device_type.clone();

            let hub = match HubDevice::from_value(value) {
                Ok(hub) => hub,
                Err(e) => {
                    error!(%kind, slot = %slot, error = %e, "malformed device entry, skipping");
                    continue;
                }
            };

            let id = format!("{}{}", self.settings.device_id_prefix, hub.unique_id);
            out.insert(
                id,
                QueriedDevice {
                    kind,
                    hub_type: hub.hub_type,
                    device_type,
                    metadata: DeviceMetadata {
                        name: hub.name,
                        model_id: hub.model_id,
                        slot,
                        manufacturer: hub.manufacturer,
                        firmware_version: hub.firmware_version,
                        product_name: hub.product_name,
                    },
                    data: DeviceData {
                        state: hub.state,
                        config: hub.config,
                    },
                },
            );
        }
    }

    // ── Reconcile ────────────────────────────────────────────────────

    /// Apply one poll to the registry: removals, additions, metadata
    /// changes, then data changes. Returns the computed diff.
    pub(crate) fn reconcile(&self, mut queried: BTreeMap<String, QueriedDevice>) -> InventoryDiff {
        let changes = diff(&self.registry.snapshot(), &queried);

        for id in &changes.missing {
            if let Err(e) = self.remove_device(id) {
                error!(device_id = %id, error = %e, "removing device failed");
            }
        }
        for id in &changes.new {
            if let Some(q) = queried.get(id).cloned() {
                if let Err(e) = self.add_device(id, q) {
                    error!(device_id = %id, error = %e, "adding device failed");
                }
            }
        }
        for id in &changes.changed_metadata {
            if let Some(q) = queried.get(id) {
                if let Err(e) = self.update_metadata(id, q.metadata.clone()) {
                    error!(device_id = %id, error = %e, "updating device metadata failed");
                }
            }
        }
        for id in &changes.changed_data {
            if let Some(q) = queried.remove(id) {
                if let Err(e) = self.update_data(id, q.data) {
                    error!(device_id = %id, error = %e, "updating device data failed");
                }
            }
        }

        changes
    }

    fn remove_device(&self, id: &str) -> Result<(), CoreError> {
        self.publish(&DeviceMessage::delete(id))?;
        if let Err(e) = self.transport.unsubscribe(&topic::command(id)) {
            warn!(device_id = %id, error = %e, "unsubscribing command topic failed");
        }
        self.registry.remove(id);
        info!(device_id = %id, "removed device");
        Ok(())
    }

    fn add_device(&self, id: &str, queried: QueriedDevice) -> Result<(), CoreError> {
        let device = queried.into_device(id);
        self.publish(&DeviceMessage::set(&device))?;
        self.transport
            .subscribe(&topic::command(id), QoS::AtLeastOnce)?;
        info!(device_id = %id, name = %device.metadata.name, state = %device.state(), "added device");
        self.registry.insert(device);
        Ok(())
    }

    fn update_metadata(&self, id: &str, metadata: DeviceMetadata) -> Result<(), CoreError> {
        self.registry
            .update(id, |device| {
                let backup = device.clone();
                device.metadata = metadata;
                match self.publish(&DeviceMessage::set(device)) {
                    Ok(()) => {
                        info!(device_id = %id, "updated device metadata");
                        Ok(())
                    }
                    Err(e) => {
                        *device = backup;
                        Err(e)
                    }
                }
            })
            .unwrap_or(Ok(()))
    }

    fn update_data(&self, id: &str, data: DeviceData) -> Result<(), CoreError> {
        self.registry
            .update(id, |device| {
                for capability in changed_events(device.data(), &data) {
                    debug!(device_id = %id, %capability, "sensor event");
                }
                let backup = device.clone();
                if !device.set_data(data) {
                    return Ok(());
                }
                match self.publish(&DeviceMessage::set(device)) {
                    Ok(()) => {
                        info!(device_id = %id, state = %device.state(), "device state changed");
                        Ok(())
                    }
                    Err(e) => {
                        *device = backup;
                        Err(e)
                    }
                }
            })
            .unwrap_or(Ok(()))
    }

    /// Re-announce every registered device.
    fn republish(&self, subscribe: bool) {
        let devices = self.registry.snapshot();
        info!(count = devices.len(), subscribe, "refreshing device announcements");
        for (id, device) in &devices {
            if let Err(e) = self.publish(&DeviceMessage::set(device)) {
                error!(device_id = %id, error = %e, "re-announcing device failed");
            }
            if subscribe {
                if let Err(e) = self
                    .transport
                    .subscribe(&topic::command(id), QoS::AtLeastOnce)
                {
                    error!(device_id = %id, error = %e, "re-subscribing command topic failed");
                }
            }
        }
    }

    fn publish(&self, message: &DeviceMessage) -> Result<(), CoreError> {
        let payload = serde_json::to_string(message).map_err(|e| CoreError::Internal(e.to_string()))?;
        self.transport
            .publish(&self.device_topic, payload, QoS::ExactlyOnce)
    }
}

/// Event capabilities whose `state` or `config` field differs between
/// `old` and `new`.
fn changed_events(old: &DeviceData, new: &DeviceData) -> Vec<Capability> {
    [(&old.state, &new.state), (&old.config, &new.config)]
        .into_iter()
        .filter_map(|(before, after)| Some((before, after.as_object()?)))
        .flat_map(|(before, after)| {
            after
                .iter()
                .filter(move |(field, value)| before.get(field.as_str()) != Some(*value))
                .filter_map(|(field, _)| event_service(field))
        })
        .collect()
}
