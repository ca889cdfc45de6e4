use crate::prelude::*;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::{BTreeSet, HashMap};

// DeviceKind {{{
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Inverter,
    ChargeController,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Inverter => "inverter",
            DeviceKind::ChargeController => "charge_controller",
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
} // }}}

// Layout {{{
/// Field layout of one record type. The full layouts carry a whole device
/// per record; the status/power pairs split one device over two records that
/// are merged by slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    Inverter,
    ChargeController,
    InverterStatus,
    InverterPower,
    ChargeControllerStatus,
    ChargeControllerPower,
}

impl Layout {
    pub fn kind(&self) -> DeviceKind {
        match self {
            Layout::Inverter | Layout::InverterStatus | Layout::InverterPower => {
                DeviceKind::Inverter
            }
            Layout::ChargeController
            | Layout::ChargeControllerStatus
            | Layout::ChargeControllerPower => DeviceKind::ChargeController,
        }
    }

    pub fn min_fields(&self) -> usize {
        match self {
            Layout::Inverter => 21,
            Layout::ChargeController => 12,
            Layout::InverterStatus | Layout::InverterPower => 15,
            Layout::ChargeControllerStatus | Layout::ChargeControllerPower => 8,
        }
    }

    /// Full layouts are numbered by order of appearance; split layouts carry
    /// their device number in the field after the type code.
    pub fn is_positional(&self) -> bool {
        matches!(self, Layout::Inverter | Layout::ChargeController)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Layout::Inverter => "inverter",
            Layout::ChargeController => "charge_controller",
            Layout::InverterStatus => "inverter_status",
            Layout::InverterPower => "inverter_power",
            Layout::ChargeControllerStatus => "charge_controller_status",
            Layout::ChargeControllerPower => "charge_controller_power",
        }
    }
} // }}}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    Positional,
    Explicit(u16),
}

/// One successfully decoded device record.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub kind: DeviceKind,
    pub slot: Slot,
    pub reading: Reading,
}

// FieldValue {{{
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(&'static str),
    Flag(bool),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(t) => f.write_str(t),
            FieldValue::Flag(b) => write!(f, "{}", b),
        }
    }
} // }}}

macro_rules! merge_fields {
    ($dst:expr, $src:expr; $($field:ident),+ $(,)?) => {
        $(
            if $src.$field.is_some() {
                $dst.$field = $src.$field;
            }
        )+
    };
}

/// Buy when buying, otherwise sell as a negative value.
fn signed_grid_current(buy: f64, sell: f64) -> f64 {
    if buy > 0.0 {
        buy
    } else if sell > 0.0 {
        -sell
    } else {
        0.0
    }
}

// Leg {{{
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Leg {
    pub inverter_current: Option<f64>,
    pub charger_current: Option<f64>,
    pub buy_current: Option<f64>,
    pub sell_current: Option<f64>,
    pub ac_input_voltage: Option<f64>,
    pub ac_output_voltage: Option<f64>,
    pub inverter_power: Option<f64>,
    pub charger_power: Option<f64>,
    pub grid_power: Option<f64>,
}

impl Leg {
    fn new(
        inverter_current: f64,
        charger_current: f64,
        buy_current: f64,
        sell_current: f64,
        ac_input_voltage: f64,
        ac_output_voltage: f64,
    ) -> Self {
        Self {
            inverter_current: Some(inverter_current),
            charger_current: Some(charger_current),
            buy_current: Some(buy_current),
            sell_current: Some(sell_current),
            ac_input_voltage: Some(ac_input_voltage),
            ac_output_voltage: Some(ac_output_voltage),
            inverter_power: Some(inverter_current * ac_output_voltage),
            charger_power: Some(charger_current * ac_input_voltage),
            grid_power: Some(signed_grid_current(buy_current, sell_current) * ac_input_voltage),
        }
    }

    fn field(&self, name: &str) -> Option<f64> {
        match name {
            "inverter_current" => self.inverter_current,
            "charger_current" => self.charger_current,
            "buy_current" => self.buy_current,
            "sell_current" => self.sell_current,
            "ac_input_voltage" => self.ac_input_voltage,
            "ac_output_voltage" => self.ac_output_voltage,
            "inverter_power" => self.inverter_power,
            "charger_power" => self.charger_power,
            "grid_power" => self.grid_power,
            _ => None,
        }
    }

    fn merge(&mut self, other: &Leg) {
        merge_fields!(self, other;
            inverter_current, charger_current, buy_current, sell_current,
            ac_input_voltage, ac_output_voltage, inverter_power, charger_power, grid_power,
        );
    }
} // }}}

// InverterReading {{{
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct InverterReading {
    pub l1: Leg,
    pub l2: Leg,

    pub inverter_current: Option<f64>,
    pub charger_current: Option<f64>,
    pub buy_current: Option<f64>,
    pub sell_current: Option<f64>,
    /// positive when buying from the grid, negative when selling
    pub grid_current: Option<f64>,
    pub ac_input_voltage: Option<f64>,
    pub ac_output_voltage: Option<f64>,
    pub inverter_power: Option<f64>,
    pub charger_power: Option<f64>,
    pub grid_power: Option<f64>,
    pub battery_voltage: Option<f64>,

    pub misc: Option<u16>,
    pub is_240v: Option<bool>,
    pub ac_source: Option<AcSource>,
    pub inverter_mode: Option<InverterMode>,
    pub ac_mode: Option<AcMode>,
}

impl InverterReading {
    pub const FIELDS: [&'static str; 34] = [
        "l1_inverter_current",
        "l1_charger_current",
        "l1_buy_current",
        "l1_sell_current",
        "l1_ac_input_voltage",
        "l1_ac_output_voltage",
        "l1_inverter_power",
        "l1_charger_power",
        "l1_grid_power",
        "l2_inverter_current",
        "l2_charger_current",
        "l2_buy_current",
        "l2_sell_current",
        "l2_ac_input_voltage",
        "l2_ac_output_voltage",
        "l2_inverter_power",
        "l2_charger_power",
        "l2_grid_power",
        "inverter_current",
        "charger_current",
        "buy_current",
        "sell_current",
        "grid_current",
        "ac_input_voltage",
        "ac_output_voltage",
        "inverter_power",
        "charger_power",
        "grid_power",
        "battery_voltage",
        "misc",
        "is_240v",
        "ac_source",
        "inverter_mode",
        "ac_mode",
    ];

    /// Builds the combined view from both legs.
    fn from_legs(l1: Leg, l2: Leg) -> Self {
        let sum = |a: Option<f64>, b: Option<f64>| Some(a.unwrap_or(0.0) + b.unwrap_or(0.0));
        let mean = |a: Option<f64>, b: Option<f64>| Some((a.unwrap_or(0.0) + b.unwrap_or(0.0)) / 2.0);

        let inverter_current = sum(l1.inverter_current, l2.inverter_current);
        let charger_current = sum(l1.charger_current, l2.charger_current);
        let buy_current = sum(l1.buy_current, l2.buy_current);
        let sell_current = sum(l1.sell_current, l2.sell_current);
        let grid_current = Some(signed_grid_current(
            buy_current.unwrap_or(0.0),
            sell_current.unwrap_or(0.0),
        ));
        let ac_input_voltage = mean(l1.ac_input_voltage, l2.ac_input_voltage);
        let ac_output_voltage = mean(l1.ac_output_voltage, l2.ac_output_voltage);

        let product = |a: Option<f64>, b: Option<f64>| a.zip(b).map(|(a, b)| a * b);

        Self {
            inverter_power: product(inverter_current, ac_output_voltage),
            charger_power: product(charger_current, ac_input_voltage),
            grid_power: product(grid_current, ac_input_voltage),
            l1,
            l2,
            inverter_current,
            charger_current,
            buy_current,
            sell_current,
            grid_current,
            ac_input_voltage,
            ac_output_voltage,
            ..Default::default()
        }
    }

    pub fn field(&self, name: &str) -> Option<FieldValue> {
        if let Some(rest) = name.strip_prefix("l1_") {
            return self.l1.field(rest).map(FieldValue::Number);
        }
        if let Some(rest) = name.strip_prefix("l2_") {
            return self.l2.field(rest).map(FieldValue::Number);
        }

        let number = match name {
            "inverter_current" => self.inverter_current,
            "charger_current" => self.charger_current,
            "buy_current" => self.buy_current,
            "sell_current" => self.sell_current,
            "grid_current" => self.grid_current,
            "ac_input_voltage" => self.ac_input_voltage,
            "ac_output_voltage" => self.ac_output_voltage,
            "inverter_power" => self.inverter_power,
            "charger_power" => self.charger_power,
            "grid_power" => self.grid_power,
            "battery_voltage" => self.battery_voltage,
            "misc" => self.misc.map(f64::from),
            "is_240v" => return self.is_240v.map(FieldValue::Flag),
            "ac_source" => return self.ac_source.map(|s| FieldValue::Text(s.label())),
            "inverter_mode" => return self.inverter_mode.map(|m| FieldValue::Text(m.label())),
            "ac_mode" => return self.ac_mode.map(|m| FieldValue::Text(m.label())),
            _ => None,
        };

        number.map(FieldValue::Number)
    }

    pub fn merge(&mut self, other: &InverterReading) {
        self.l1.merge(&other.l1);
        self.l2.merge(&other.l2);
        merge_fields!(self, other;
            inverter_current, charger_current, buy_current, sell_current, grid_current,
            ac_input_voltage, ac_output_voltage, inverter_power, charger_power, grid_power,
            battery_voltage, misc, is_240v, ac_source, inverter_mode, ac_mode,
        );
    }
} // }}}

// ChargeControllerReading {{{
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ChargeControllerReading {
    pub pv_current: Option<f64>,
    pub pv_voltage: Option<f64>,
    pub pv_power: Option<f64>,
    pub output_current: Option<f64>,
    pub battery_voltage: Option<f64>,
    /// output_current x battery_voltage, filled in by the aggregator
    pub output_power: Option<f64>,
    pub kwh_today: Option<f64>,
    pub charge_mode: Option<ChargeMode>,
}

impl ChargeControllerReading {
    pub const FIELDS: [&'static str; 8] = [
        "pv_current",
        "pv_voltage",
        "pv_power",
        "output_current",
        "battery_voltage",
        "output_power",
        "kwh_today",
        "charge_mode",
    ];

    pub fn field(&self, name: &str) -> Option<FieldValue> {
        let number = match name {
            "pv_current" => self.pv_current,
            "pv_voltage" => self.pv_voltage,
            "pv_power" => self.pv_power,
            "output_current" => self.output_current,
            "battery_voltage" => self.battery_voltage,
            "output_power" => self.output_power,
            "kwh_today" => self.kwh_today,
            "charge_mode" => return self.charge_mode.map(|m| FieldValue::Text(m.label())),
            _ => None,
        };

        number.map(FieldValue::Number)
    }

    pub fn merge(&mut self, other: &ChargeControllerReading) {
        merge_fields!(self, other;
            pv_current, pv_voltage, pv_power, output_current, battery_voltage,
            output_power, kwh_today, charge_mode,
        );
    }
} // }}}

// Reading {{{
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reading {
    Inverter(InverterReading),
    ChargeController(ChargeControllerReading),
}

impl Reading {
    pub fn kind(&self) -> DeviceKind {
        match self {
            Reading::Inverter(_) => DeviceKind::Inverter,
            Reading::ChargeController(_) => DeviceKind::ChargeController,
        }
    }

    pub fn field(&self, name: &str) -> Option<FieldValue> {
        match self {
            Reading::Inverter(r) => r.field(name),
            Reading::ChargeController(r) => r.field(name),
        }
    }

    /// Names of the fields that currently hold a value.
    pub fn fields(&self) -> BTreeSet<&'static str> {
        let names: &[&'static str] = match self {
            Reading::Inverter(_) => &InverterReading::FIELDS,
            Reading::ChargeController(_) => &ChargeControllerReading::FIELDS,
        };

        names
            .iter()
            .copied()
            .filter(|name| self.field(name).is_some())
            .collect()
    }

    /// Mode labels read "unknown" until a record carrying them arrives.
    pub fn with_placeholders(mut self) -> Self {
        match &mut self {
            Reading::Inverter(r) => {
                r.inverter_mode.get_or_insert(InverterMode::Unknown);
                r.ac_mode.get_or_insert(AcMode::Unknown);
            }
            Reading::ChargeController(r) => {
                r.charge_mode.get_or_insert(ChargeMode::Unknown);
            }
        }
        self
    }

    /// Overwrites the fields `other` carries and keeps the rest. A reading of
    /// a different kind replaces this one outright.
    pub fn merge(&mut self, other: Reading) {
        match (self, other) {
            (Reading::Inverter(a), Reading::Inverter(b)) => a.merge(&b),
            (Reading::ChargeController(a), Reading::ChargeController(b)) => a.merge(&b),
            (this, other) => *this = other.with_placeholders(),
        }
    }
} // }}}

// Fields {{{
struct Fields<'a> {
    values: Vec<&'a str>,
}

impl<'a> Fields<'a> {
    fn split(record: &'a str) -> Self {
        Self {
            values: record.split(',').map(str::trim).collect(),
        }
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn require(&self, layout: Layout) -> Result<(), RecordError> {
        if self.len() < layout.min_fields() {
            return Err(RecordError::TooFewFields {
                layout: layout.name(),
                expected: layout.min_fields(),
                got: self.len(),
            });
        }
        Ok(())
    }

    fn raw(&self, index: usize) -> Result<&'a str, RecordError> {
        self.values
            .get(index)
            .copied()
            .ok_or(RecordError::InvalidNumber {
                index,
                value: String::new(),
            })
    }

    fn number(&self, index: usize) -> Result<f64, RecordError> {
        let raw = self.raw(index)?;
        raw.parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .ok_or_else(|| RecordError::InvalidNumber {
                index,
                value: raw.to_string(),
            })
    }

    fn code(&self, index: usize) -> Result<u16, RecordError> {
        let raw = self.raw(index)?;
        raw.parse::<u16>().map_err(|_| RecordError::InvalidNumber {
            index,
            value: raw.to_string(),
        })
    }
} // }}}

/// Turns raw record strings into typed readings using the configured type
/// table and scale factors.
#[derive(Clone, Debug)]
pub struct Decoder {
    type_field: usize,
    types: HashMap<u16, Layout>,
    battery_voltage_divisor: f64,
    inverter_battery_voltage_field: Option<usize>,
}

impl Decoder {
    pub fn new(config: &config::Decoder) -> Self {
        Self {
            type_field: config.type_field,
            types: config
                .device_types
                .iter()
                .map(|t| (t.code, t.layout))
                .collect(),
            battery_voltage_divisor: config.battery_voltage_divisor,
            inverter_battery_voltage_field: config.inverter_battery_voltage_field,
        }
    }

    /// Looks up the layout for a record without decoding its fields.
    pub fn classify(&self, record: &str) -> Result<Layout, RecordError> {
        let fields = Fields::split(record);
        self.layout_of(&fields)
    }

    pub fn decode(&self, record: &str) -> Result<Record, RecordError> {
        let fields = Fields::split(record);
        let layout = self.layout_of(&fields)?;
        fields.require(layout)?;

        let slot = if layout.is_positional() {
            Slot::Positional
        } else {
            let index = self.type_field + 1;
            let raw = fields.raw(index)?;
            // device numbers start at 1
            let slot = raw.parse::<u16>().ok().filter(|slot| *slot > 0);
            Slot::Explicit(slot.ok_or_else(|| RecordError::InvalidSlot(raw.to_string()))?)
        };

        let reading = match layout {
            Layout::Inverter => Reading::Inverter(self.inverter(&fields)?),
            Layout::ChargeController => Reading::ChargeController(self.charge_controller(&fields)?),
            Layout::InverterStatus => Reading::Inverter(Self::inverter_status(&fields)?),
            Layout::InverterPower => Reading::Inverter(Self::inverter_power(&fields)?),
            Layout::ChargeControllerStatus => {
                Reading::ChargeController(Self::charge_controller_status(&fields)?)
            }
            Layout::ChargeControllerPower => {
                Reading::ChargeController(Self::charge_controller_power(&fields)?)
            }
        };

        Ok(Record {
            kind: layout.kind(),
            slot,
            reading,
        })
    }

    fn layout_of(&self, fields: &Fields) -> Result<Layout, RecordError> {
        let raw = fields
            .values
            .get(self.type_field)
            .copied()
            .filter(|v| !v.is_empty())
            .ok_or(RecordError::MissingType(self.type_field))?;
        let code = fields.code(self.type_field)?;

        trace!("record type {} ({})", code, raw);

        self.types
            .get(&code)
            .copied()
            .ok_or(RecordError::UnknownType(code))
    }

    fn inverter(&self, f: &Fields) -> Result<InverterReading, RecordError> {
        let misc = f.code(20)?;
        let is_240v = misc & (1 << 7) != 0;
        let voltage_factor = if is_240v { 2.0 } else { 1.0 };
        let ac_source = if misc & (1 << 6) != 0 {
            AcSource::Grid
        } else {
            AcSource::Generator
        };

        let l1 = Self::leg(f, 0, voltage_factor)?;
        let l2 = Self::leg(f, 7, voltage_factor)?;

        let mut reading = InverterReading::from_legs(l1, l2);
        reading.misc = Some(misc);
        reading.is_240v = Some(is_240v);
        reading.ac_source = Some(ac_source);
        reading.inverter_mode = Some(InverterMode::from(f.code(16)?));
        reading.ac_mode = Some(AcMode::from(f.code(18)?));

        // not every firmware puts battery voltage in the same place; a bad
        // value here never costs the rest of the record
        reading.battery_voltage = self
            .inverter_battery_voltage_field
            .and_then(|index| f.number(index).ok())
            .map(|v| v / self.battery_voltage_divisor);

        Ok(reading)
    }

    fn leg(f: &Fields, shift: usize, voltage_factor: f64) -> Result<Leg, RecordError> {
        Ok(Leg::new(
            f.number(2 + shift)?,
            f.number(3 + shift)?,
            f.number(4 + shift)?,
            f.number(5 + shift)?,
            f.number(6 + shift)? * voltage_factor,
            f.number(8 + shift)? * voltage_factor,
        ))
    }

    fn charge_controller(&self, f: &Fields) -> Result<ChargeControllerReading, RecordError> {
        let pv_current = f.number(4)?;
        let pv_voltage = f.number(5)?;

        Ok(ChargeControllerReading {
            pv_current: Some(pv_current),
            pv_voltage: Some(pv_voltage),
            pv_power: Some(pv_voltage * pv_current),
            output_current: Some(f.number(3)? + f.number(7)? / 10.0),
            battery_voltage: Some(f.number(11)? / self.battery_voltage_divisor),
            output_power: None,
            kwh_today: Some(f.number(6)? / 10.0),
            charge_mode: Some(ChargeMode::from(f.code(10)?)),
        })
    }

    fn inverter_status(f: &Fields) -> Result<InverterReading, RecordError> {
        Ok(InverterReading {
            inverter_mode: Some(InverterMode::from(f.code(11)?)),
            ac_mode: Some(AcMode::from(f.code(12)?)),
            ..Default::default()
        })
    }

    fn inverter_power(f: &Fields) -> Result<InverterReading, RecordError> {
        Ok(InverterReading {
            inverter_current: Some(f.number(3)?),
            charger_current: Some(f.number(4)?),
            grid_current: Some(f.number(5)?),
            ac_input_voltage: Some(f.number(6)?),
            ac_output_voltage: Some(f.number(7)?),
            inverter_power: Some(f.number(8)?),
            charger_power: Some(f.number(9)?),
            grid_power: Some(f.number(10)?),
            ..Default::default()
        })
    }

    fn charge_controller_status(f: &Fields) -> Result<ChargeControllerReading, RecordError> {
        Ok(ChargeControllerReading {
            charge_mode: Some(ChargeMode::from(f.code(7)?)),
            ..Default::default()
        })
    }

    fn charge_controller_power(f: &Fields) -> Result<ChargeControllerReading, RecordError> {
        Ok(ChargeControllerReading {
            pv_current: Some(f.number(3)?),
            pv_voltage: Some(f.number(4)?),
            battery_voltage: Some(f.number(5)?),
            pv_power: Some(f.number(6)?),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> Decoder {
        Decoder::new(&config::Decoder::default())
    }

    // port, type, then the leg/mode/misc fields in wire order
    fn inverter_record(l1: [f64; 7], l2: [f64; 7], mode: u16, ac_mode: u16, misc: u16) -> String {
        let mut fields = vec!["01".to_string(), "6".to_string()];
        fields.extend(l1.iter().map(|v| v.to_string()));
        fields.extend(l2.iter().map(|v| v.to_string()));
        fields.extend([mode, 0, ac_mode, 528, misc, 0].iter().map(|v| v.to_string()));
        fields.join(",")
    }

    fn inverter(record: &str) -> InverterReading {
        match decoder().decode(record).unwrap().reading {
            Reading::Inverter(r) => r,
            other => panic!("expected inverter, got {:?}", other),
        }
    }

    #[test]
    fn decodes_inverter_legs() {
        let record = inverter_record(
            [10.0, 2.0, 5.0, 0.0, 120.0, 0.0, 118.0],
            [8.0, 1.0, 0.0, 3.0, 122.0, 0.0, 120.0],
            2,
            2,
            0,
        );
        let r = inverter(&record);

        assert_eq!(r.l1.inverter_current, Some(10.0));
        assert_eq!(r.l1.charger_current, Some(2.0));
        assert_eq!(r.l1.buy_current, Some(5.0));
        assert_eq!(r.l2.sell_current, Some(3.0));
        assert_eq!(r.l1.ac_input_voltage, Some(120.0));
        assert_eq!(r.l1.ac_output_voltage, Some(118.0));
        assert_eq!(r.l2.ac_output_voltage, Some(120.0));

        assert_eq!(r.inverter_current, Some(18.0));
        assert_eq!(r.charger_current, Some(3.0));
        assert_eq!(r.ac_input_voltage, Some(121.0));
        assert_eq!(r.ac_output_voltage, Some(119.0));
        assert_eq!(r.inverter_power, Some(18.0 * 119.0));
        assert_eq!(r.charger_power, Some(3.0 * 121.0));

        assert_eq!(r.l1.inverter_power, Some(10.0 * 118.0));
        assert_eq!(r.l2.grid_power, Some(-3.0 * 122.0));

        assert_eq!(r.inverter_mode, Some(InverterMode::Inverting));
        assert_eq!(r.ac_mode, Some(AcMode::AcUse));
        assert_eq!(r.ac_source, Some(AcSource::Generator));
        assert_eq!(r.battery_voltage, None);
    }

    #[test]
    fn grid_current_prefers_buy() {
        let record = inverter_record(
            [0.0, 0.0, 5.0, 0.0, 120.0, 0.0, 120.0],
            [0.0, 0.0, 0.0, 3.0, 120.0, 0.0, 120.0],
            0,
            0,
            0,
        );
        let r = inverter(&record);

        assert_eq!(r.grid_current, Some(5.0));
        assert_eq!(r.grid_power, Some(600.0));
    }

    #[test]
    fn grid_current_reports_selling_as_negative() {
        let record = inverter_record(
            [0.0, 0.0, 0.0, 2.0, 120.0, 0.0, 120.0],
            [0.0, 0.0, 0.0, 1.0, 120.0, 0.0, 120.0],
            9,
            2,
            0,
        );
        let r = inverter(&record);

        assert_eq!(r.grid_current, Some(-3.0));
        assert_eq!(r.grid_power, Some(-360.0));
        assert_eq!(r.inverter_mode, Some(InverterMode::Selling));
    }

    #[test]
    fn idle_grid_is_zero_not_negative_zero() {
        let record = inverter_record([0.0; 7], [0.0; 7], 0, 0, 0);
        let r = inverter(&record);

        assert_eq!(r.grid_current, Some(0.0));
        assert!(r.grid_current.unwrap().is_sign_positive());
    }

    #[test]
    fn misc_bit_7_doubles_voltages() {
        let l1 = [1.0, 0.0, 0.0, 0.0, 60.0, 0.0, 61.0];
        let l2 = [1.0, 0.0, 0.0, 0.0, 62.0, 0.0, 63.0];

        let plain = inverter(&inverter_record(l1, l2, 2, 2, 0));
        let doubled = inverter(&inverter_record(l1, l2, 2, 2, 128));

        assert_eq!(plain.is_240v, Some(false));
        assert_eq!(doubled.is_240v, Some(true));
        assert_eq!(doubled.l1.ac_input_voltage, Some(120.0));
        assert_eq!(doubled.l1.ac_output_voltage, Some(122.0));
        assert_eq!(doubled.l2.ac_input_voltage, Some(124.0));
        assert_eq!(doubled.l2.ac_output_voltage, Some(126.0));
        assert_eq!(
            doubled.ac_input_voltage.unwrap(),
            plain.ac_input_voltage.unwrap() * 2.0
        );
        assert_eq!(
            doubled.ac_output_voltage.unwrap(),
            plain.ac_output_voltage.unwrap() * 2.0
        );
        // currents are untouched
        assert_eq!(doubled.inverter_current, plain.inverter_current);
    }

    #[test]
    fn misc_bit_6_selects_grid() {
        let r = inverter(&inverter_record([0.0; 7], [0.0; 7], 0, 0, 64));
        assert_eq!(r.ac_source, Some(AcSource::Grid));
        assert_eq!(r.is_240v, Some(false));

        let r = inverter(&inverter_record([0.0; 7], [0.0; 7], 0, 0, 192));
        assert_eq!(r.ac_source, Some(AcSource::Grid));
        assert_eq!(r.is_240v, Some(true));
    }

    #[test]
    fn unknown_inverter_mode_is_a_label_not_an_error() {
        let r = inverter(&inverter_record([0.0; 7], [0.0; 7], 99, 7, 0));
        assert_eq!(r.field("inverter_mode"), Some(FieldValue::Text("unknown")));
        assert_eq!(r.field("ac_mode"), Some(FieldValue::Text("unknown")));
    }

    #[test]
    fn inverter_battery_voltage_is_opt_in() {
        let record = inverter_record([0.0; 7], [0.0; 7], 0, 0, 0);

        let mut cfg = config::Decoder::default();
        cfg.inverter_battery_voltage_field = Some(19);
        let decoder = Decoder::new(&cfg);

        match decoder.decode(&record).unwrap().reading {
            Reading::Inverter(r) => assert_eq!(r.battery_voltage, Some(52.8)),
            other => panic!("expected inverter, got {:?}", other),
        }

        // an offset past the end of the record is simply absent
        cfg.inverter_battery_voltage_field = Some(40);
        match Decoder::new(&cfg).decode(&record).unwrap().reading {
            Reading::Inverter(r) => assert_eq!(r.battery_voltage, None),
            other => panic!("expected inverter, got {:?}", other),
        }
    }

    #[test]
    fn decodes_charge_controller() {
        let record = Decoder::new(&config::Decoder::default())
            .decode("04,3,00,12,8,140,123,5,00,000,2,528,000,000,055")
            .unwrap();

        assert_eq!(record.kind, DeviceKind::ChargeController);
        assert_eq!(record.slot, Slot::Positional);

        let r = match record.reading {
            Reading::ChargeController(r) => r,
            other => panic!("expected charge controller, got {:?}", other),
        };
        assert_eq!(r.pv_current, Some(8.0));
        assert_eq!(r.pv_voltage, Some(140.0));
        assert_eq!(r.pv_power, Some(1120.0));
        assert_eq!(r.output_current, Some(12.5));
        assert_eq!(r.battery_voltage, Some(52.8));
        assert_eq!(r.kwh_today, Some(12.3));
        assert_eq!(r.charge_mode, Some(ChargeMode::Bulk));
        assert_eq!(r.output_power, None);
    }

    #[test]
    fn battery_voltage_divisor_is_configurable() {
        let mut cfg = config::Decoder::default();
        cfg.battery_voltage_divisor = 1.0;

        let record = Decoder::new(&cfg)
            .decode("04,3,00,12,8,140,123,5,00,000,2,52,000")
            .unwrap();
        assert_eq!(
            record.reading.field("battery_voltage"),
            Some(FieldValue::Number(52.0))
        );
    }

    #[test]
    fn short_records_are_rejected() {
        assert_eq!(
            decoder().decode("04,3,00,12,8,140,123,5,00,000,2"),
            Err(RecordError::TooFewFields {
                layout: "charge_controller",
                expected: 12,
                got: 11,
            })
        );
        assert!(matches!(
            decoder().decode("01,6,1,2,3"),
            Err(RecordError::TooFewFields { expected: 21, .. })
        ));
    }

    #[test]
    fn non_numeric_fields_are_rejected() {
        assert_eq!(
            decoder().decode("04,3,00,12,x,140,123,5,00,000,2,528"),
            Err(RecordError::InvalidNumber {
                index: 4,
                value: "x".to_string(),
            })
        );
        assert!(matches!(
            decoder().decode("04,3,00,12,8,140,123,5,00,000,bulk,528"),
            Err(RecordError::InvalidNumber { index: 10, .. })
        ));
    }

    #[test]
    fn unknown_type_codes_are_rejected() {
        assert_eq!(decoder().decode("01,9,1,2,3"), Err(RecordError::UnknownType(9)));
        assert_eq!(decoder().decode("01"), Err(RecordError::MissingType(1)));
        assert_eq!(decoder().classify("01,3,0"), Ok(Layout::ChargeController));
    }

    #[test]
    fn split_records_carry_their_slot() {
        let mut cfg = config::Decoder::default();
        cfg.type_field = 0;
        cfg.device_types = vec![
            config::DeviceType { code: 1, layout: Layout::InverterStatus },
            config::DeviceType { code: 2, layout: Layout::InverterPower },
            config::DeviceType { code: 4, layout: Layout::ChargeControllerStatus },
            config::DeviceType { code: 5, layout: Layout::ChargeControllerPower },
        ];
        let decoder = Decoder::new(&cfg);

        let status = decoder.decode("1,2,0,0,0,0,0,0,0,0,0,2,2,0,0").unwrap();
        assert_eq!(status.slot, Slot::Explicit(2));
        assert_eq!(status.reading.field("inverter_mode"), Some(FieldValue::Text("inverting")));
        assert_eq!(status.reading.field("inverter_power"), None);

        let power = decoder
            .decode("2,2,0,10,1,-2,240,240,2400,240,-480,0,0,0,0")
            .unwrap();
        assert_eq!(power.slot, Slot::Explicit(2));
        assert_eq!(power.reading.field("grid_current"), Some(FieldValue::Number(-2.0)));
        assert_eq!(power.reading.field("inverter_power"), Some(FieldValue::Number(2400.0)));
        assert_eq!(power.reading.field("inverter_mode"), None);

        let cc = decoder.decode("5,1,0,20,100,52.4,2000,0").unwrap();
        assert_eq!(cc.kind, DeviceKind::ChargeController);
        assert_eq!(cc.reading.field("battery_voltage"), Some(FieldValue::Number(52.4)));

        assert_eq!(
            decoder.decode("4,x,0,0,0,0,0,1"),
            Err(RecordError::InvalidSlot("x".to_string()))
        );
        assert_eq!(
            decoder.decode("4,0,0,0,0,0,0,1"),
            Err(RecordError::InvalidSlot("0".to_string()))
        );
    }

    #[test]
    fn merge_keeps_fields_the_update_lacks() {
        let mut reading = Reading::Inverter(InverterReading {
            inverter_power: Some(100.0),
            ..Default::default()
        })
        .with_placeholders();

        assert_eq!(reading.field("inverter_mode"), Some(FieldValue::Text("unknown")));

        reading.merge(Reading::Inverter(InverterReading {
            inverter_mode: Some(InverterMode::Charging),
            ..Default::default()
        }));

        assert_eq!(reading.field("inverter_power"), Some(FieldValue::Number(100.0)));
        assert_eq!(reading.field("inverter_mode"), Some(FieldValue::Text("charging")));
        assert_eq!(
            reading.fields(),
            ["ac_mode", "inverter_mode", "inverter_power"]
                .into_iter()
                .collect::<BTreeSet<_>>()
        );
    }
}
