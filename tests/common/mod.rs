#![allow(dead_code)]

use mate3_bridge::prelude::*;
use std::net::SocketAddr;

pub fn common_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub const CONTROLLER: &str = "AABBCCDDEEFF";

pub struct Factory;

impl Factory {
    pub fn controller() -> ControllerId {
        ControllerId::from_str(CONTROLLER).unwrap()
    }

    pub fn sender() -> SocketAddr {
        "192.168.0.64:57027".parse().unwrap()
    }

    pub fn config() -> ConfigWrapper {
        ConfigWrapper::from_config(Config::default())
    }

    pub fn coordinator() -> Coordinator {
        Self::coordinator_with(Config::default())
    }

    pub fn coordinator_with(config: Config) -> Coordinator {
        let config = ConfigWrapper::from_config(config);
        Coordinator::new(&config, Channels::new(), Store::new())
    }

    /// Full inverter record. Each leg is (inverter, charger, buy, sell,
    /// ac input voltage, ac output voltage).
    pub fn inverter(l1: [u32; 6], l2: [u32; 6], mode: u16, ac_mode: u16, misc: u16) -> String {
        let leg = |l: [u32; 6]| format!("{:02},{:02},{:02},{:02},{:03},00,{:03}", l[0], l[1], l[2], l[3], l[4], l[5]);

        format!(
            "01,6,{},{},{:02},00,{:02},528,{:03},000",
            leg(l1),
            leg(l2),
            mode,
            ac_mode,
            misc
        )
    }

    pub fn idle_inverter() -> String {
        Self::inverter([0, 0, 0, 0, 120, 120], [0, 0, 0, 0, 120, 120], 2, 2, 0)
    }

    /// Charge controller record: output amps (whole + tenths), PV amps and
    /// volts, kWh tenths, charge mode and raw battery voltage.
    pub fn charge_controller(
        port: u8,
        output: (u32, u32),
        pv: (u32, u32),
        kwh_tenths: u32,
        mode: u16,
        battery: u32,
    ) -> String {
        format!(
            "{:02},3,00,{:02},{:02},{:03},{:03},{},00,000,{},{:03},000,000,055",
            port, output.0, pv.0, pv.1, kwh_tenths, output.1, mode, battery
        )
    }

    pub fn datagram(records: &[String]) -> Vec<u8> {
        Self::datagram_for("AABBCC-DDEEFF", records)
    }

    pub fn datagram_for(header: &str, records: &[String]) -> Vec<u8> {
        let mut datagram = format!("[{}]", header);
        for record in records {
            datagram.push('<');
            datagram.push_str(record);
            datagram.push('>');
        }
        datagram.into_bytes()
    }
}
