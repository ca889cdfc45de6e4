use crate::prelude::*;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Default, Clone, Debug)]
pub struct PacketStats {
    pub datagrams_received: u64,
    pub frame_errors: u64,
    pub receive_errors: u64,
    // per record
    pub records_decoded: u64,
    pub record_errors: u64,
    pub unknown_types: u64,
    pub devices_discovered: u64,
    // per controller
    pub datagrams_by_controller: HashMap<ControllerId, u64>,
    pub last_seen: HashMap<ControllerId, chrono::DateTime<chrono::Local>>,
}

impl PacketStats {
    pub fn print_summary(&self) {
        info!("Packet Statistics:");
        info!("  Datagrams received: {}", self.datagrams_received);
        info!("  Frame errors: {}", self.frame_errors);
        info!("  Receive errors: {}", self.receive_errors);
        info!("  Records:");
        info!("    Decoded: {}", self.records_decoded);
        info!("    Errors: {}", self.record_errors);
        info!("    Unknown types: {}", self.unknown_types);
        info!("  Devices discovered: {}", self.devices_discovered);
        info!("  Datagrams by controller:");
        let mut controllers: Vec<_> = self.datagrams_by_controller.iter().collect();
        controllers.sort();
        for (controller, count) in controllers {
            info!("    {}: {}", controller, count);
            if let Some(last_seen) = self.last_seen.get(controller) {
                info!("      Last seen: {}", last_seen.format("%Y-%m-%dT%H:%M:%S"));
            }
        }
    }
}

/// Runs one datagram through the whole pipeline: frame, records, registry,
/// aggregation, publish. Owned by the listener task, which makes it the only
/// writer of the registry.
pub struct Coordinator {
    decoder: Decoder,
    allow_headerless: bool,
    registry: Registry,
    aggregator: Aggregator,
    store: Store,
    channels: Channels,
    pub stats: Arc<Mutex<PacketStats>>,
}

impl Coordinator {
    pub fn new(config: &ConfigWrapper, channels: Channels, store: Store) -> Self {
        let decoder = config.decoder();

        Self {
            allow_headerless: decoder.allow_headerless,
            decoder: Decoder::new(&decoder),
            registry: Registry::new(),
            aggregator: Aggregator::new(&config.aggregator()),
            store,
            channels,
            stats: Arc::new(Mutex::new(PacketStats::default())),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> Store {
        self.store.clone()
    }

    fn count(&self, f: impl FnOnce(&mut PacketStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }

    pub fn process_datagram(&mut self, payload: &[u8], from: SocketAddr) {
        self.process_datagram_at(payload, from, Instant::now())
    }

    pub fn process_datagram_at(&mut self, payload: &[u8], from: SocketAddr, now: Instant) {
        self.count(|s| s.datagrams_received += 1);

        let sender = self.allow_headerless.then(|| from.ip());
        let frame = match Frame::parse(payload, sender) {
            Ok(frame) => frame,
            Err(err) => {
                debug!("dropping datagram from {}: {}", from, err);
                self.count(|s| s.frame_errors += 1);
                return;
            }
        };

        let controller = frame.controller;
        trace!("{}: {} records from {}", controller, frame.records.len(), from);
        self.count(|s| {
            *s.datagrams_by_controller.entry(controller.clone()).or_default() += 1;
            s.last_seen.insert(controller.clone(), chrono::Local::now());
        });

        self.registry.begin_datagram(&controller);

        for raw in &frame.malformed {
            let err = RecordError::Unenclosed(raw.clone());
            warn!("{}: dropping record: {}", controller, err);
            self.count(|s| s.record_errors += 1);
        }

        let discovered: Vec<DeviceKey> = frame
            .records
            .iter()
            .filter_map(|raw| self.process_record(&controller, raw))
            .collect();

        let combined = self
            .aggregator
            .recompute(&mut self.registry, &controller, now);
        let energy = self.aggregator.energy(&controller);

        self.store
            .publish(Snapshot::new(&self.registry, &controller, combined, energy));

        // only once the snapshot holding the new devices is readable
        for key in discovered {
            // nobody listening is fine
            let _ = self.channels.discovered.send(DiscoveryEvent { key });
        }
    }

    /// Returns the device key when this record is the first sighting of it.
    fn process_record(&mut self, controller: &ControllerId, raw: &str) -> Option<DeviceKey> {
        let layout = match self.decoder.classify(raw) {
            Ok(layout) => layout,
            Err(err) => {
                warn!("{}: dropping record <{}>: {}", controller, raw, err);
                self.count(|s| {
                    s.record_errors += 1;
                    if matches!(err, RecordError::UnknownType(_)) {
                        s.unknown_types += 1;
                    }
                });
                return None;
            }
        };

        // taken before decoding so a bad record still holds its place
        let positional = layout
            .is_positional()
            .then(|| self.registry.next_slot(controller, layout.kind()));

        let record = match self.decoder.decode(raw) {
            Ok(record) => record,
            Err(err) => {
                warn!("{}: dropping {} record <{}>: {}", controller, layout.name(), raw, err);
                self.count(|s| s.record_errors += 1);
                return None;
            }
        };

        let (slot, complete) = match record.slot {
            Slot::Explicit(slot) => (slot, false),
            Slot::Positional => (positional?, true),
        };

        let key = DeviceKey::new(controller.clone(), record.kind, slot);
        // a full record describes the whole device, a split one only part of it
        if complete {
            self.registry.replace(key.clone(), record.reading);
        } else {
            self.registry.upsert(key.clone(), record.reading);
        }
        self.count(|s| s.records_decoded += 1);

        if !self.registry.is_discovery_event(&key) {
            return None;
        }

        info!("discovered {}", key);
        self.count(|s| s.devices_discovered += 1);
        Some(key)
    }
}
