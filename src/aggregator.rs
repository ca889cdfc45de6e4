use crate::prelude::*;

use crate::mate3::record::Leg;
use serde::Serialize;
use serde_with::skip_serializing_none;
use std::collections::HashMap;
use std::time::{Duration, Instant};

// CombinedMetrics {{{
/// Per-controller totals across every known device. Sums are 0.0 when no
/// device contributes; averages are `None`.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CombinedMetrics {
    pub inverter_count: usize,
    pub charge_controller_count: usize,

    pub inverter_current: f64,
    pub charger_current: f64,
    pub buy_current: f64,
    pub sell_current: f64,
    pub grid_current: f64,
    pub inverter_power: f64,
    pub charger_power: f64,
    pub grid_power: f64,
    pub ac_input_voltage: Option<f64>,
    pub ac_output_voltage: Option<f64>,

    pub pv_current: f64,
    pub pv_power: f64,
    pub output_current: f64,
    pub output_power: f64,
    pub kwh_today: f64,
    pub pv_voltage: Option<f64>,
    /// charge controllers only
    pub battery_voltage: Option<f64>,

    pub from_grid: f64,
    pub solar_production: f64,
    pub from_battery: f64,
    pub to_loads: f64,
}

impl CombinedMetrics {
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        let value = match name {
            "inverter_count" => Some(self.inverter_count as f64),
            "charge_controller_count" => Some(self.charge_controller_count as f64),
            "inverter_current" => Some(self.inverter_current),
            "charger_current" => Some(self.charger_current),
            "buy_current" => Some(self.buy_current),
            "sell_current" => Some(self.sell_current),
            "grid_current" => Some(self.grid_current),
            "inverter_power" => Some(self.inverter_power),
            "charger_power" => Some(self.charger_power),
            "grid_power" => Some(self.grid_power),
            "ac_input_voltage" => self.ac_input_voltage,
            "ac_output_voltage" => self.ac_output_voltage,
            "pv_current" => Some(self.pv_current),
            "pv_power" => Some(self.pv_power),
            "output_current" => Some(self.output_current),
            "output_power" => Some(self.output_power),
            "kwh_today" => Some(self.kwh_today),
            "pv_voltage" => self.pv_voltage,
            "battery_voltage" => self.battery_voltage,
            "from_grid" => Some(self.from_grid),
            "solar_production" => Some(self.solar_production),
            "from_battery" => Some(self.from_battery),
            "to_loads" => Some(self.to_loads),
            _ => None,
        };

        value.map(FieldValue::Number)
    }
} // }}}

// EnergyTotals {{{
/// kWh integrated from the power flows since startup. Not persisted.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EnergyTotals {
    pub solar_kwh: f64,
    pub grid_import_kwh: f64,
    pub grid_export_kwh: f64,
    pub battery_charge_kwh: f64,
    pub battery_discharge_kwh: f64,
    pub load_kwh: f64,
}

impl EnergyTotals {
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        let value = match name {
            "solar_kwh" => self.solar_kwh,
            "grid_import_kwh" => self.grid_import_kwh,
            "grid_export_kwh" => self.grid_export_kwh,
            "battery_charge_kwh" => self.battery_charge_kwh,
            "battery_discharge_kwh" => self.battery_discharge_kwh,
            "load_kwh" => self.load_kwh,
            _ => return None,
        };

        Some(FieldValue::Number(value))
    }
} // }}}

#[derive(Default)]
struct Mean {
    total: f64,
    count: usize,
}

impl Mean {
    fn add(&mut self, value: Option<f64>) {
        if let Some(value) = value {
            self.total += value;
            self.count += 1;
        }
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.total / self.count as f64)
    }
}

// per-leg values when the device sent legs, otherwise its combined value
fn legs_or(reading: &InverterReading, pick: fn(&Leg) -> Option<f64>, combined: Option<f64>) -> f64 {
    match (pick(&reading.l1), pick(&reading.l2)) {
        (None, None) => combined.unwrap_or(0.0),
        (a, b) => a.unwrap_or(0.0) + b.unwrap_or(0.0),
    }
}

#[derive(Clone, Copy)]
struct Flows {
    solar: f64,
    grid: f64,
    battery: f64,
    loads: f64,
}

impl From<&CombinedMetrics> for Flows {
    fn from(m: &CombinedMetrics) -> Self {
        Self {
            solar: m.solar_production,
            grid: m.from_grid,
            battery: m.from_battery,
            loads: m.to_loads,
        }
    }
}

#[derive(Default)]
struct Integration {
    last: Option<(Instant, Flows)>,
    totals: EnergyTotals,
}

impl Integration {
    fn advance(&mut self, now: Instant, flows: Flows, max_gap: Duration) {
        if let Some((then, prev)) = self.last {
            match now.checked_duration_since(then) {
                Some(elapsed) if elapsed <= max_gap => {
                    let hours = elapsed.as_secs_f64() / 3600.0;
                    // trapezoid over W, stored as kWh
                    let kwh = |a: f64, b: f64| (a + b) / 2.0 * hours / 1000.0;
                    let pos = |w: f64| w.max(0.0);
                    let neg = |w: f64| (-w).max(0.0);

                    let t = &mut self.totals;
                    t.solar_kwh += kwh(pos(prev.solar), pos(flows.solar));
                    t.grid_import_kwh += kwh(pos(prev.grid), pos(flows.grid));
                    t.grid_export_kwh += kwh(neg(prev.grid), neg(flows.grid));
                    t.battery_discharge_kwh += kwh(pos(prev.battery), pos(flows.battery));
                    t.battery_charge_kwh += kwh(neg(prev.battery), neg(flows.battery));
                    t.load_kwh += kwh(pos(prev.loads), pos(flows.loads));
                }
                Some(elapsed) => {
                    debug!("not integrating energy across a {}s gap", elapsed.as_secs());
                }
                // out of order timestamps, keep the newer baseline
                None => return,
            }
        }

        self.last = Some((now, flows));
    }
}

pub struct Aggregator {
    max_gap: Duration,
    energy: HashMap<ControllerId, Integration>,
}

impl Aggregator {
    pub fn new(config: &config::Aggregator) -> Self {
        Self {
            max_gap: config.energy_max_gap,
            energy: HashMap::new(),
        }
    }

    /// Rebuilds the combined metrics for `controller` from scratch, caching
    /// charge controller output power onto the registry as it goes, then
    /// folds the resulting power flows into the energy totals.
    pub fn recompute(
        &mut self,
        registry: &mut Registry,
        controller: &ControllerId,
        now: Instant,
    ) -> CombinedMetrics {
        let mut m = CombinedMetrics::default();
        let mut ac_input_voltage = Mean::default();
        let mut ac_output_voltage = Mean::default();
        let mut pv_voltage = Mean::default();
        let mut battery_voltage = Mean::default();

        for (_, reading) in registry.devices_mut(controller) {
            match reading {
                Reading::Inverter(r) => {
                    m.inverter_count += 1;
                    m.inverter_current += r.inverter_current.unwrap_or(0.0);
                    m.charger_current += r.charger_current.unwrap_or(0.0);
                    m.buy_current += r.buy_current.unwrap_or(0.0);
                    m.sell_current += r.sell_current.unwrap_or(0.0);
                    m.grid_current += r.grid_current.unwrap_or(0.0);
                    m.inverter_power += r.inverter_power.unwrap_or(0.0);
                    m.charger_power += r.charger_power.unwrap_or(0.0);
                    m.grid_power += r.grid_power.unwrap_or(0.0);
                    ac_input_voltage.add(r.ac_input_voltage);
                    ac_output_voltage.add(r.ac_output_voltage);

                    let grid = legs_or(r, |l| l.grid_power, r.grid_power);
                    let inverter = legs_or(r, |l| l.inverter_power, r.inverter_power);
                    let charger = legs_or(r, |l| l.charger_power, r.charger_power);
                    m.from_grid += grid;
                    m.from_battery += inverter - charger;
                }
                Reading::ChargeController(r) => {
                    if let (Some(current), Some(voltage)) = (r.output_current, r.battery_voltage) {
                        r.output_power = Some(current * voltage);
                    }

                    m.charge_controller_count += 1;
                    m.pv_current += r.pv_current.unwrap_or(0.0);
                    m.pv_power += r.pv_power.unwrap_or(0.0);
                    m.output_current += r.output_current.unwrap_or(0.0);
                    m.output_power += r.output_power.unwrap_or(0.0);
                    m.kwh_today += r.kwh_today.unwrap_or(0.0);
                    pv_voltage.add(r.pv_voltage);
                    battery_voltage.add(r.battery_voltage);

                    // split power records carry no output current
                    m.solar_production += r.output_power.or(r.pv_power).unwrap_or(0.0);
                }
            }
        }

        m.ac_input_voltage = ac_input_voltage.value();
        m.ac_output_voltage = ac_output_voltage.value();
        m.pv_voltage = pv_voltage.value();
        m.battery_voltage = battery_voltage.value();
        m.to_loads = m.from_grid + m.from_battery;

        self.energy
            .entry(controller.clone())
            .or_default()
            .advance(now, Flows::from(&m), self.max_gap);

        m
    }

    pub fn energy(&self, controller: &ControllerId) -> EnergyTotals {
        self.energy
            .get(controller)
            .map(|i| i.totals.clone())
            .unwrap_or_default()
    }
}
