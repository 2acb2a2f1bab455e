//! Device state store
//!
//! Last decoded value per (device, parameter group). Each write happens
//! under one lock, so readers see either the old or the new value of a
//! group and never a mix.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use velocan_conv::{ParameterGroup, ParameterValue};
use velocan_core::DeviceTarget;

/// A stored value with its update marker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredValue {
    pub value: ParameterValue,
    /// Store-wide counter, strictly increasing with every change
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

/// Point-in-time copy of one device's record
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    pub target: DeviceTarget,
    pub taken_at: DateTime<Utc>,
    pub groups: BTreeMap<ParameterGroup, StoredValue>,
}

impl DeviceSnapshot {
    pub fn get(&self, group: ParameterGroup) -> Option<&ParameterValue> {
        self.groups.get(&group).map(|stored| &stored.value)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

#[derive(Default)]
struct Records {
    devices: HashMap<DeviceTarget, HashMap<ParameterGroup, StoredValue>>,
    revision: u64,
}

/// Thread-safe store of decoded device values
#[derive(Default)]
pub struct DeviceStateStore {
    records: RwLock<Records>,
}

impl DeviceStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a decoded value into the record; returns whether anything changed
    pub fn apply(&self, target: DeviceTarget, group: ParameterGroup, value: ParameterValue) -> bool {
        let mut records = self.records.write();
        let previous = records.devices.get(&target).and_then(|groups| groups.get(&group));
        let merged = value.merge_into(previous.map(|stored| &stored.value));
        if previous.is_some_and(|stored| stored.value == merged) {
            return false;
        }

        records.revision += 1;
        let revision = records.revision;
        records.devices.entry(target).or_default().insert(
            group,
            StoredValue {
                value: merged,
                revision,
                updated_at: Utc::now(),
            },
        );
        true
    }

    pub fn get(&self, target: DeviceTarget, group: ParameterGroup) -> Option<ParameterValue> {
        self.get_stored(target, group).map(|stored| stored.value)
    }

    pub fn get_stored(&self, target: DeviceTarget, group: ParameterGroup) -> Option<StoredValue> {
        self.records
            .read()
            .devices
            .get(&target)
            .and_then(|groups| groups.get(&group))
            .cloned()
    }

    pub fn snapshot(&self, target: DeviceTarget) -> DeviceSnapshot {
        let records = self.records.read();
        let groups = records
            .devices
            .get(&target)
            .map(|groups| groups.iter().map(|(g, v)| (*g, v.clone())).collect())
            .unwrap_or_default();
        DeviceSnapshot {
            target,
            taken_at: Utc::now(),
            groups,
        }
    }

    /// Forget everything; used on disconnect
    pub fn clear(&self) {
        self.records.write().devices.clear();
    }
}
