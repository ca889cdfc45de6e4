pub use anyhow::{anyhow, bail, Result};
pub use log::{debug, error, info, trace, warn};
pub use std::io::Write;
pub use std::str::FromStr;
pub use tokio::sync::broadcast;

pub use crate::{
    aggregator::{Aggregator, CombinedMetrics, EnergyTotals},
    channels::{Channels, DiscoveryEvent},
    config::{self, Config, ConfigWrapper},
    coordinator::{Coordinator, PacketStats},
    error::{FrameError, RecordError},
    mate3::{
        self,
        frame::{ControllerId, Frame},
        modes::{AcMode, AcSource, ChargeMode, InverterMode},
        record::{
            ChargeControllerReading, Decoder, DeviceKind, FieldValue, InverterReading, Layout,
            Reading, Record, Slot,
        },
    },
    options::Options,
    registry::{DeviceKey, Registry, Snapshot, Store},
};
