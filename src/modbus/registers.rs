//! Slave ids and register addresses of the managed installation.
//!
//! The defaults describe the stock gateway layout. An energetic object may
//! carry a partial override in `energetic_objects.modbus_registers`; keys it
//! leaves out keep their default.

use crate::models::EnergeticObject;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterMap {
    pub battery_slave: u8,
    pub inverter_slave: u8,
    pub ess_slave: u8,
    pub solar_charger_slaves: Vec<u8>,
    pub battery: BatteryRegisters,
    pub inverter: InverterRegisters,
    pub ess: EssRegisters,
    pub solar: SolarRegisters,
    pub setpoints: SetpointRegisters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryRegisters {
    pub soc: u16,
    pub voltage: u16,
    pub current: u16,
    pub temperature: u16,
    pub power: u16,
    pub soh: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InverterRegisters {
    pub dc_power: u16,
    pub ac_output_l1: u16,
    pub ac_output_l2: u16,
    pub ac_output_l3: u16,
}

/// The ESS AC block is eighteen consecutive input registers: input voltage,
/// current, frequency, power (three phases each), then output voltage and
/// current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EssRegisters {
    pub first: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolarRegisters {
    pub window_start: u16,
    pub pv_power: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetpointRegisters {
    pub grid_feed: u16,
    pub soc_minimum: u16,
    pub max_charge_current: u16,
}

pub const ESS_BLOCK_LEN: u16 = 18;

/// Largest register count a single read (0x03/0x04) may ask for.
pub const MAX_READ_REGISTERS: u16 = 125;

fn span(start: u16, end: u16) -> u16 {
    let count = u32::from(end).saturating_sub(u32::from(start)) + 1;
    u16::try_from(count).unwrap_or(u16::MAX)
}

impl Default for RegisterMap {
    fn default() -> Self {
        let mut solar_charger_slaves: Vec<u8> = (1..=13).collect();
        solar_charger_slaves.push(100);
        Self {
            battery_slave: 225,
            inverter_slave: 100,
            ess_slave: 227,
            solar_charger_slaves,
            battery: BatteryRegisters::default(),
            inverter: InverterRegisters::default(),
            ess: EssRegisters::default(),
            solar: SolarRegisters::default(),
            setpoints: SetpointRegisters::default(),
        }
    }
}

impl Default for BatteryRegisters {
    fn default() -> Self {
        Self {
            soc: 266,
            voltage: 259,
            current: 261,
            temperature: 262,
            power: 258,
            soh: 304,
        }
    }
}

impl Default for InverterRegisters {
    fn default() -> Self {
        Self {
            dc_power: 870,
            ac_output_l1: 878,
            ac_output_l2: 880,
            ac_output_l3: 882,
        }
    }
}

impl Default for EssRegisters {
    fn default() -> Self {
        Self { first: 3 }
    }
}

impl Default for SolarRegisters {
    fn default() -> Self {
        Self {
            window_start: 3700,
            pv_power: vec![3724, 3725, 3726, 3727],
        }
    }
}

impl Default for SetpointRegisters {
    fn default() -> Self {
        Self {
            grid_feed: 2703,
            soc_minimum: 2901,
            max_charge_current: 2705,
        }
    }
}

impl BatteryRegisters {
    fn all(&self) -> [u16; 6] {
        [
            self.soc,
            self.voltage,
            self.current,
            self.temperature,
            self.power,
            self.soh,
        ]
    }

    /// Smallest contiguous (start, count) window covering every battery register.
    pub fn window(&self) -> (u16, u16) {
        let all = self.all();
        let start = all.iter().copied().min().unwrap_or(0);
        let end = all.iter().copied().max().unwrap_or(0);
        (start, span(start, end))
    }
}

impl SolarRegisters {
    pub fn window(&self) -> (u16, u16) {
        let end = self
            .pv_power
            .iter()
            .copied()
            .max()
            .unwrap_or(self.window_start)
            .max(self.window_start);
        (self.window_start, span(self.window_start, end))
    }
}

impl RegisterMap {
    /// Register map for an object, falling back to the default layout when
    /// the object carries no override or an unusable one.
    pub fn for_object(object: &EnergeticObject) -> Self {
        let Some(raw) = &object.modbus_registers else {
            return Self::default();
        };
        match serde_json::from_value::<RegisterMap>(raw.clone()) {
            Ok(map) => match map.check() {
                Ok(()) => map,
                Err(reason) => {
                    warn!(object_id = %object.id, reason, "register override out of range; using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(object_id = %object.id, error = %e, "invalid register override; using defaults");
                Self::default()
            }
        }
    }

    fn check(&self) -> Result<(), &'static str> {
        if self.solar.pv_power.is_empty() {
            return Err("solar layout has no pv_power registers");
        }
        if self.solar.pv_power.iter().any(|&r| r < self.solar.window_start) {
            return Err("solar pv_power register below window_start");
        }
        if self.solar.window().1 > MAX_READ_REGISTERS {
            return Err("solar window wider than one read");
        }
        if self.battery.window().1 > MAX_READ_REGISTERS {
            return Err("battery window wider than one read");
        }
        if self.ess.first.checked_add(ESS_BLOCK_LEN - 1).is_none() {
            return Err("ess block runs past the last register");
        }
        let inverter = &self.inverter;
        let inverter_regs = [
            inverter.dc_power,
            inverter.ac_output_l1,
            inverter.ac_output_l2,
            inverter.ac_output_l3,
        ];
        if inverter_regs.iter().any(|r| r.checked_add(1).is_none()) {
            return Err("inverter signed-32 pair runs past the last register");
        }
        Ok(())
    }
}
