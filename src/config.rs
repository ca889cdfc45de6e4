use crate::prelude::*;

use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::mate3::record::Layout;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,

    #[serde(default)]
    pub decoder: Decoder,

    #[serde(default)]
    pub aggregator: Aggregator,

    #[serde(default)]
    pub scheduler: Scheduler,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listener: Listener::default(),
            decoder: Decoder::default(),
            aggregator: Aggregator::default(),
            scheduler: Scheduler::default(),
            loglevel: Self::default_loglevel(),
        }
    }
}

// Listener {{{
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Listener {
    #[serde(default = "Config::default_listener_host")]
    pub host: String,

    #[serde(default = "Config::default_listener_port")]
    pub port: u16,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "receive_backoff_ms", default = "Config::default_receive_backoff")]
    pub receive_backoff: Duration,

    #[serde(default = "Config::default_max_datagram_size")]
    pub max_datagram_size: usize,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            host: Config::default_listener_host(),
            port: Config::default_listener_port(),
            receive_backoff: Config::default_receive_backoff(),
            max_datagram_size: Config::default_max_datagram_size(),
        }
    }
}

impl Listener {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
} // }}}

// Decoder {{{
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct DeviceType {
    pub code: u16,
    pub layout: Layout,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Decoder {
    /// index of the type code within a record; field 0 is the hub port
    #[serde(default = "Config::default_type_field")]
    pub type_field: usize,

    #[serde(default = "Config::default_device_types")]
    pub device_types: Vec<DeviceType>,

    #[serde(default = "Config::default_battery_voltage_divisor")]
    pub battery_voltage_divisor: f64,

    pub inverter_battery_voltage_field: Option<usize>,

    #[serde(default)]
    pub allow_headerless: bool,
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            type_field: Config::default_type_field(),
            device_types: Config::default_device_types(),
            battery_voltage_divisor: Config::default_battery_voltage_divisor(),
            inverter_battery_voltage_field: None,
            allow_headerless: false,
        }
    }
} // }}}

// Aggregator {{{
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Aggregator {
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "energy_max_gap_secs", default = "Config::default_energy_max_gap")]
    pub energy_max_gap: Duration,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self {
            energy_max_gap: Config::default_energy_max_gap(),
        }
    }
} // }}}

// Scheduler {{{
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Scheduler {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "report_interval_secs", default = "Config::default_report_interval")]
    pub report_interval: Duration,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            enabled: Config::default_enabled(),
            report_interval: Config::default_report_interval(),
        }
    }
} // }}}

pub struct ConfigWrapper {
    config: Arc<Mutex<Config>>,
}

impl Clone for ConfigWrapper {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
        }
    }
}

impl ConfigWrapper {
    pub fn new(file: String) -> Result<Self> {
        let config = Config::new(file)?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
        }
    }

    // nothing panics while holding the lock, but a poisoned config is still
    // perfectly readable
    fn lock(&self) -> MutexGuard<'_, Config> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn listener(&self) -> Listener {
        self.lock().listener.clone()
    }

    pub fn set_port(&self, port: u16) {
        info!("Overriding listener port with {}", port);
        self.lock().listener.port = port;
    }

    pub fn decoder(&self) -> Decoder {
        self.lock().decoder.clone()
    }

    pub fn aggregator(&self) -> Aggregator {
        self.lock().aggregator.clone()
    }

    pub fn scheduler(&self) -> Scheduler {
        self.lock().scheduler.clone()
    }

    pub fn loglevel(&self) -> String {
        self.lock().loglevel.clone()
    }

    pub fn log_summary(&self) {
        self.lock().log_summary();
    }
}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        info!("Reading configuration from {}", file);
        let content = std::fs::read_to_string(&file)
            .map_err(|err| crate::file_error_with_source!(err, "error reading {}", file))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // an empty file means "all defaults"
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content)?
        };

        config.validate()?;
        Ok(config)
    }

    pub fn log_summary(&self) {
        info!("Configuration loaded successfully:");
        info!("  Listener:");
        info!("    Bind: {}", self.listener.bind_address());
        info!("    Receive Backoff: {}ms", self.listener.receive_backoff.as_millis());
        info!("    Max Datagram Size: {}", self.listener.max_datagram_size);
        info!("  Decoder:");
        info!("    Type Field: {}", self.decoder.type_field);
        for device_type in &self.decoder.device_types {
            info!(
                "    Type {} -> {} ({})",
                device_type.code,
                device_type.layout.name(),
                device_type.layout.kind()
            );
        }
        info!("    Battery Voltage Divisor: {}", self.decoder.battery_voltage_divisor);
        info!(
            "    Inverter Battery Voltage Field: {}",
            self.decoder
                .inverter_battery_voltage_field
                .map(|f| f.to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        info!("    Allow Headerless: {}", self.decoder.allow_headerless);
        info!("  Aggregator:");
        info!("    Energy Max Gap: {}s", self.aggregator.energy_max_gap.as_secs());
        info!(
            "  Scheduler: {}",
            if self.scheduler.enabled { "enabled" } else { "disabled" }
        );
        if self.scheduler.enabled {
            info!("    Report Interval: {}s", self.scheduler.report_interval.as_secs());
        }
        info!("  Log Level: {}", self.loglevel);
    }

    fn validate(&self) -> Result<()> {
        if self.listener.port == 0 {
            bail!("listener.port must be between 1 and 65535");
        }
        if self.listener.host.is_empty() {
            return Err(crate::file_error!("listener host cannot be empty"));
        }
        if self.listener.max_datagram_size == 0 {
            bail!("listener.max_datagram_size must be greater than 0");
        }

        if self.decoder.device_types.is_empty() {
            bail!("decoder.device_types must map at least one type code");
        }
        let mut seen = HashSet::new();
        for device_type in &self.decoder.device_types {
            if !seen.insert(device_type.code) {
                bail!("decoder.device_types maps type code {} twice", device_type.code);
            }
        }
        let divisor = self.decoder.battery_voltage_divisor;
        if !divisor.is_finite() || divisor <= 0.0 {
            bail!("decoder.battery_voltage_divisor must be a positive number");
        }

        if self.scheduler.enabled && self.scheduler.report_interval.is_zero() {
            bail!("scheduler.report_interval_secs must be greater than 0");
        }

        Ok(())
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }

    fn default_listener_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_listener_port() -> u16 {
        57027
    }

    fn default_receive_backoff() -> Duration {
        Duration::from_millis(1000)
    }

    fn default_max_datagram_size() -> usize {
        8192
    }

    fn default_type_field() -> usize {
        1
    }

    fn default_device_types() -> Vec<DeviceType> {
        vec![
            DeviceType {
                code: 6,
                layout: Layout::Inverter,
            },
            DeviceType {
                code: 3,
                layout: Layout::ChargeController,
            },
        ]
    }

    fn default_battery_voltage_divisor() -> f64 {
        10.0
    }

    fn default_energy_max_gap() -> Duration {
        Duration::from_secs(300)
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_report_interval() -> Duration {
        Duration::from_secs(60)
    }
}
