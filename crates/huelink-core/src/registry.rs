// ── Device registry ──
//
// Concurrent map of platform device id -> `Device`. The inventory monitor
// is the only writer; command workers read snapshots.

use std::collections::{BTreeMap, HashSet};

use dashmap::DashMap;

use crate::model::Device;

/// Registry of known devices, shared between the monitor and the
/// command controller.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: DashMap<String, Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cloned snapshot of one device.
    pub fn get(&self, id: &str) -> Option<Device> {
        self.devices.get(id).map(|d| d.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    pub fn ids(&self) -> HashSet<String> {
        self.devices.iter().map(|d| d.key().clone()).collect()
    }

    /// Ordered copy of every device.
    pub fn snapshot(&self) -> BTreeMap<String, Device> {
        self.devices
            .iter()
            .map(|d| (d.key().clone(), d.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    // ── Mutation (monitor only) ──────────────────────────────────────

    /// Insert or replace a device. Returns the previous entry.
    pub(crate) fn insert(&self, device: Device) -> Option<Device> {
        self.devices.insert(device.id.clone(), device)
    }

    pub(crate) fn remove(&self, id: &str) -> Option<Device> {
        self.devices.remove(id).map(|(_, d)| d)
    }

    /// Run `f` against the stored device, if present.
    pub(crate) fn update<R>(&self, id: &str, f: impl FnOnce(&mut Device) -> R) -> Option<R> {
        self.devices.get_mut(id).map(|mut d| f(d.value_mut()))
    }
}
