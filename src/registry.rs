use crate::prelude::*;

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

// DeviceKey {{{
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DeviceKey {
    pub controller: ControllerId,
    pub kind: DeviceKind,
    pub slot: u16,
}

impl DeviceKey {
    pub fn new(controller: ControllerId, kind: DeviceKind, slot: u16) -> Self {
        Self {
            controller,
            kind,
            slot,
        }
    }
}

impl std::fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.controller, self.kind, self.slot)
    }
}

impl std::fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
} // }}}

/// Latest reading per device, plus the per-datagram slot counters. Owned by
/// the ingestion task only; readers go through [`Store`].
#[derive(Default)]
pub struct Registry {
    devices: BTreeMap<DeviceKey, Reading>,
    announced: HashSet<DeviceKey>,
    slots: HashMap<(ControllerId, DeviceKind), u16>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets positional numbering for `controller` at the start of a datagram.
    pub fn begin_datagram(&mut self, controller: &ControllerId) {
        self.slots.retain(|(c, _), _| c != controller);
    }

    pub fn next_slot(&mut self, controller: &ControllerId, kind: DeviceKind) -> u16 {
        let counter = self.slots.entry((controller.clone(), kind)).or_insert(0);
        *counter = counter.saturating_add(1);
        *counter
    }

    /// Returns true when the key did not exist before.
    pub fn upsert(&mut self, key: DeviceKey, reading: Reading) -> bool {
        match self.devices.get_mut(&key) {
            Some(existing) => {
                existing.merge(reading);
                false
            }
            None => {
                debug!("new device {}", key);
                self.devices.insert(key, reading.with_placeholders());
                true
            }
        }
    }

    /// Stores `reading` as the whole state of the device, dropping whatever
    /// an earlier reading left behind. Returns true when the key is new.
    pub fn replace(&mut self, key: DeviceKey, reading: Reading) -> bool {
        let new = self
            .devices
            .insert(key.clone(), reading.with_placeholders())
            .is_none();
        if new {
            debug!("new device {}", key);
        }
        new
    }

    /// True exactly once per registered key.
    pub fn is_discovery_event(&mut self, key: &DeviceKey) -> bool {
        self.devices.contains_key(key) && self.announced.insert(key.clone())
    }

    pub fn get(&self, key: &DeviceKey) -> Option<&Reading> {
        self.devices.get(key)
    }

    pub fn fields(&self, key: &DeviceKey) -> BTreeSet<&'static str> {
        self.devices
            .get(key)
            .map(Reading::fields)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn devices<'a>(
        &'a self,
        controller: &'a ControllerId,
    ) -> impl Iterator<Item = (&'a DeviceKey, &'a Reading)> + 'a {
        self.devices
            .iter()
            .filter(move |(key, _)| &key.controller == controller)
    }

    pub(crate) fn devices_mut<'a>(
        &'a mut self,
        controller: &'a ControllerId,
    ) -> impl Iterator<Item = (&'a DeviceKey, &'a mut Reading)> + 'a {
        self.devices
            .iter_mut()
            .filter(move |(key, _)| &key.controller == controller)
    }
}

// Snapshot {{{
#[derive(Clone, Debug, Serialize)]
pub struct DeviceSnapshot {
    pub kind: DeviceKind,
    pub slot: u16,
    pub reading: Reading,
}

/// Immutable view of one controller, published after every datagram.
#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub controller: ControllerId,
    pub updated_at: chrono::DateTime<chrono::Local>,
    pub devices: Vec<DeviceSnapshot>,
    pub combined: CombinedMetrics,
    pub energy: EnergyTotals,
}

impl Snapshot {
    pub fn new(
        registry: &Registry,
        controller: &ControllerId,
        combined: CombinedMetrics,
        energy: EnergyTotals,
    ) -> Self {
        let devices = registry
            .devices(controller)
            .map(|(key, reading)| DeviceSnapshot {
                kind: key.kind,
                slot: key.slot,
                reading: reading.clone(),
            })
            .collect();

        Self {
            controller: controller.clone(),
            updated_at: chrono::Local::now(),
            devices,
            combined,
            energy,
        }
    }

    pub fn reading(&self, kind: DeviceKind, slot: u16) -> Option<&Reading> {
        self.devices
            .iter()
            .find(|d| d.kind == kind && d.slot == slot)
            .map(|d| &d.reading)
    }
} // }}}

// Store {{{
/// Read side of the registry. Each controller's snapshot is replaced whole,
/// so a reader sees either the previous datagram's state or the new one.
#[derive(Clone, Default)]
pub struct Store {
    snapshots: Arc<RwLock<HashMap<ControllerId, Arc<Snapshot>>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.controller.clone(), snapshot);
    }

    pub fn snapshot(&self, controller: &ControllerId) -> Option<Arc<Snapshot>> {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(controller)
            .cloned()
    }

    pub fn controllers(&self) -> Vec<ControllerId> {
        let mut controllers: Vec<_> = self
            .snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        controllers.sort();
        controllers
    }

    pub fn reading(
        &self,
        controller: &ControllerId,
        kind: DeviceKind,
        slot: u16,
        field: &str,
    ) -> Option<FieldValue> {
        self.snapshot(controller)?.reading(kind, slot)?.field(field)
    }

    pub fn combined(&self, controller: &ControllerId, field: &str) -> Option<FieldValue> {
        self.snapshot(controller)?.combined.field(field)
    }
} // }}}
