use num_enum::FromPrimitive;
use serde::{Serialize, Serializer};

// InverterMode {{{
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, FromPrimitive)]
#[repr(u16)]
pub enum InverterMode {
    Off = 0,
    Search = 1,
    Inverting = 2,
    Charging = 3,
    Silent = 4,
    Floating = 5,
    Equalizing = 6,
    #[num_enum(alternatives = [8])]
    ChargerOff = 7,
    Selling = 9,
    PassThrough = 10,
    SlaveOn = 11,
    SlaveOff = 12,
    Offsetting = 14,
    InverterError = 90,
    AgsError = 91,
    CommError = 92,
    #[default]
    Unknown = 0xFFFF,
}

impl InverterMode {
    pub fn label(&self) -> &'static str {
        use InverterMode::*;

        match self {
            Off => "off",
            Search => "search",
            Inverting => "inverting",
            Charging => "charging",
            Silent => "silent",
            Floating => "floating",
            Equalizing => "equalizing",
            ChargerOff => "charger-off",
            Selling => "selling",
            PassThrough => "pass-through",
            SlaveOn => "slave-on",
            SlaveOff => "slave-off",
            Offsetting => "offsetting",
            InverterError => "inverter-error",
            AgsError => "ags-error",
            CommError => "comm-error",
            Unknown => "unknown",
        }
    }
} // }}}

// AcMode {{{
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, FromPrimitive)]
#[repr(u16)]
pub enum AcMode {
    NoAc = 0,
    AcDrop = 1,
    AcUse = 2,
    #[default]
    Unknown = 0xFFFF,
}

impl AcMode {
    pub fn label(&self) -> &'static str {
        match self {
            AcMode::NoAc => "no-ac",
            AcMode::AcDrop => "ac-drop",
            AcMode::AcUse => "ac-use",
            AcMode::Unknown => "unknown",
        }
    }
} // }}}

// ChargeMode {{{
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, FromPrimitive)]
#[repr(u16)]
pub enum ChargeMode {
    Silent = 0,
    Float = 1,
    Bulk = 2,
    Absorb = 3,
    Equalize = 4,
    #[default]
    Unknown = 0xFFFF,
}

impl ChargeMode {
    pub fn label(&self) -> &'static str {
        match self {
            ChargeMode::Silent => "silent",
            ChargeMode::Float => "float",
            ChargeMode::Bulk => "bulk",
            ChargeMode::Absorb => "absorb",
            ChargeMode::Equalize => "equalize",
            ChargeMode::Unknown => "unknown",
        }
    }
} // }}}

// AcSource {{{
/// Where the inverter's AC input is coming from, per misc bit 6.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AcSource {
    Grid,
    Generator,
}

impl AcSource {
    pub fn label(&self) -> &'static str {
        match self {
            AcSource::Grid => "grid",
            AcSource::Generator => "generator",
        }
    }
} // }}}

macro_rules! label_impls {
    ($($t:ty),*) => {$(
        impl std::fmt::Display for $t {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.label())
            }
        }

        impl Serialize for $t {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(self.label())
            }
        }
    )*};
}

label_impls!(InverterMode, AcMode, ChargeMode, AcSource);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverter_mode_table() {
        assert_eq!(InverterMode::from(0).label(), "off");
        assert_eq!(InverterMode::from(2).label(), "inverting");
        assert_eq!(InverterMode::from(7).label(), "charger-off");
        assert_eq!(InverterMode::from(8).label(), "charger-off");
        assert_eq!(InverterMode::from(10).label(), "pass-through");
        assert_eq!(InverterMode::from(14).label(), "offsetting");
        assert_eq!(InverterMode::from(92).label(), "comm-error");
    }

    #[test]
    fn unlisted_codes_are_unknown() {
        assert_eq!(InverterMode::from(13), InverterMode::Unknown);
        assert_eq!(InverterMode::from(99).label(), "unknown");
        assert_eq!(AcMode::from(3).label(), "unknown");
        assert_eq!(ChargeMode::from(5).label(), "unknown");
    }

    #[test]
    fn ac_and_charge_modes() {
        assert_eq!(AcMode::from(0).to_string(), "no-ac");
        assert_eq!(AcMode::from(2).to_string(), "ac-use");
        assert_eq!(ChargeMode::from(2).to_string(), "bulk");
        assert_eq!(ChargeMode::from(4).to_string(), "equalize");
    }

    #[test]
    fn serializes_as_label() {
        assert_eq!(
            serde_json::to_string(&InverterMode::Selling).unwrap(),
            "\"selling\""
        );
        assert_eq!(serde_json::to_string(&AcSource::Grid).unwrap(), "\"grid\"");
    }
}
