// ── Inventory diff ──
//
// Pure comparison of the registry against one bridge poll.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Device, DeviceData, DeviceKind, DeviceMetadata};

/// One device as read from the bridge during a poll.
#[derive(Debug, Clone, PartialEq)]
pub struct QueriedDevice {
    pub kind: DeviceKind,
    pub hub_type: String,
    pub device_type: String,
    pub metadata: DeviceMetadata,
    pub data: DeviceData,
}

impl QueriedDevice {
    pub fn into_device(self, id: &str) -> Device {
        Device::new(
            id,
            self.kind,
            self.device_type,
            self.hub_type,
            self.metadata,
            self.data,
        )
    }
}

/// Device ids partitioned by what changed.
///
/// `missing` and `new` are disjoint from each other and from the two
/// `changed_*` sets; a device can appear in both `changed_*` sets.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InventoryDiff {
    pub missing: BTreeSet<String>,
    pub new: BTreeSet<String>,
    pub changed_metadata: BTreeSet<String>,
    pub changed_data: BTreeSet<String>,
}

impl InventoryDiff {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
            && self.new.is_empty()
            && self.changed_metadata.is_empty()
            && self.changed_data.is_empty()
    }
}

pub fn diff(
    known: &BTreeMap<String, Device>,
    queried: &BTreeMap<String, QueriedDevice>,
) -> InventoryDiff {
    let mut out = InventoryDiff::default();

    for id in known.keys() {
        if !queried.contains_key(id) {
            out.missing.insert(id.clone());
        }
    }

    for (id, q) in queried {
        let Some(device) = known.get(id) else {
            out.new.insert(id.clone());
            continue;
        };
        if device.metadata != q.metadata {
            out.changed_metadata.insert(id.clone());
        }
        if *device.data() != q.data {
            out.changed_data.insert(id.clone());
        }
    }

    out
}
