//! Per-tick register polling. Five read groups run one after another over the
//! shared transport; each is best-effort and a failed group only leaves its
//! own fields empty.

use crate::modbus::registers::ESS_BLOCK_LEN;
use crate::modbus::{decode_signed_16, decode_signed_32, ensure_len, ModbusError, ModbusIo, RegisterMap};
use crate::models::{BatteryReadings, CollectedData, EssReadings, InverterReadings};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct DataCollector {
    object_id: String,
    modbus: Arc<dyn ModbusIo>,
    registers: RegisterMap,
}

/// A register window read in one request, addressed by absolute register.
struct Window<'a> {
    start: u16,
    regs: &'a [u16],
}

impl Window<'_> {
    fn at(&self, register: u16) -> u16 {
        self.regs[usize::from(register - self.start)]
    }
}

impl DataCollector {
    pub fn new(object_id: impl Into<String>, modbus: Arc<dyn ModbusIo>, registers: RegisterMap) -> Self {
        Self {
            object_id: object_id.into(),
            modbus,
            registers,
        }
    }

    pub async fn collect(&self, tick: Uuid) -> CollectedData {
        let mut data = CollectedData::default();

        match self.battery().await {
            Ok((readings, general_power)) => {
                data.battery = Some(readings);
                data.general_battery_power = Some(general_power);
            }
            Err(e) => self.group_failed(tick, "battery", &e),
        }

        match self.inverter().await {
            Ok((readings, total)) => {
                data.inverter = Some(readings);
                data.inverter_total_ac_output = Some(total);
            }
            Err(e) => self.group_failed(tick, "inverter", &e),
        }

        match self.ess().await {
            Ok((readings, total)) => {
                data.ess = Some(readings);
                data.ess_total_input_power = Some(total);
            }
            Err(e) => self.group_failed(tick, "ess", &e),
        }

        match self.solar(tick).await {
            Ok(total) => data.solar_total_pv_power = Some(total),
            Err(e) => self.group_failed(tick, "solar", &e),
        }

        match self.soc().await {
            Ok(soc) => data.soc = Some(soc),
            Err(e) => self.group_failed(tick, "soc", &e),
        }

        data
    }

    fn group_failed(&self, tick: Uuid, group: &'static str, err: &ModbusError) {
        warn!(object_id = %self.object_id, %tick, group, error = %err, "read group failed");
    }

    async fn read_battery_window(&self) -> Result<Vec<u16>, ModbusError> {
        let (start, count) = self.registers.battery.window();
        let regs = self
            .modbus
            .read_input_registers(start, count, self.registers.battery_slave)
            .await?;
        ensure_len("read_input_registers", &regs, usize::from(count))?;
        Ok(regs)
    }

    async fn battery(&self) -> Result<(BatteryReadings, f64), ModbusError> {
        let map = &self.registers.battery;
        let regs = self.read_battery_window().await?;
        let w = Window {
            start: map.window().0,
            regs: &regs,
        };

        let voltage = f64::from(w.at(map.voltage)) / 100.0;
        let current = f64::from(decode_signed_16(w.at(map.current))) / 10.0;
        let readings = BatteryReadings {
            battery_voltage: Some(voltage),
            battery_current: Some(current),
            battery_soc: Some(f64::from(w.at(map.soc)) / 10.0),
            battery_temperature: Some(f64::from(w.at(map.temperature)) / 10.0),
            battery_power_reg: Some(f64::from(decode_signed_16(w.at(map.power)))),
            battery_soh: Some(f64::from(w.at(map.soh)) / 10.0),
        };
        Ok((readings, round2(voltage * current)))
    }

    async fn read_signed_32(&self, register: u16) -> Result<f64, ModbusError> {
        let regs = self
            .modbus
            .read_holding_registers(register, 2, self.registers.inverter_slave)
            .await?;
        ensure_len("read_holding_registers", &regs, 2)?;
        Ok(f64::from(decode_signed_32(regs[0], regs[1])))
    }

    async fn inverter(&self) -> Result<(InverterReadings, f64), ModbusError> {
        let map = &self.registers.inverter;
        let dc_power = self.read_signed_32(map.dc_power).await?;
        let l1 = self.read_signed_32(map.ac_output_l1).await?;
        let l2 = self.read_signed_32(map.ac_output_l2).await?;
        let l3 = self.read_signed_32(map.ac_output_l3).await?;

        let readings = InverterReadings {
            inverter_dc_power: Some(dc_power),
            inverter_ac_output_l1: Some(l1),
            inverter_ac_output_l2: Some(l2),
            inverter_ac_output_l3: Some(l3),
        };
        Ok((readings, round2(l1 + l2 + l3)))
    }

    async fn ess(&self) -> Result<(EssReadings, f64), ModbusError> {
        let regs = self
            .modbus
            .read_input_registers(self.registers.ess.first, ESS_BLOCK_LEN, self.registers.ess_slave)
            .await?;
        ensure_len("read_input_registers", &regs, usize::from(ESS_BLOCK_LEN))?;

        let voltage = |i: usize| Some(round2(f64::from(regs[i]) / 10.0));
        let current = |i: usize| Some(round2(f64::from(decode_signed_16(regs[i])) / 10.0));
        let frequency = |i: usize| Some(round2(f64::from(decode_signed_16(regs[i])) / 100.0));
        let power = |i: usize| f64::from(decode_signed_16(regs[i])) * 10.0;

        let (p1, p2, p3) = (power(9), power(10), power(11));
        let readings = EssReadings {
            ess_input_voltage_l1: voltage(0),
            ess_input_voltage_l2: voltage(1),
            ess_input_voltage_l3: voltage(2),
            ess_input_current_l1: current(3),
            ess_input_current_l2: current(4),
            ess_input_current_l3: current(5),
            ess_input_frequency_l1: frequency(6),
            ess_input_frequency_l2: frequency(7),
            ess_input_frequency_l3: frequency(8),
            ess_input_power_l1: Some(p1),
            ess_input_power_l2: Some(p2),
            ess_input_power_l3: Some(p3),
            ess_output_voltage_l1: voltage(12),
            ess_output_voltage_l2: voltage(13),
            ess_output_voltage_l3: voltage(14),
            ess_output_current_l1: current(15),
            ess_output_current_l2: current(16),
            ess_output_current_l3: current(17),
        };
        Ok((readings, round2(p1 + p2 + p3)))
    }

    /// Sum of MPPT power over every charger. A charger answering with a
    /// Modbus exception or a short frame counts as zero; a broken session
    /// ends the group.
    async fn solar(&self, tick: Uuid) -> Result<f64, ModbusError> {
        let map = &self.registers.solar;
        let (start, count) = map.window();
        let mut total = 0.0;

        for &slave in &self.registers.solar_charger_slaves {
            let regs = match self.modbus.read_input_registers(start, count, slave).await {
                Ok(regs) => regs,
                Err(e) if e.is_transport() => return Err(e),
                Err(e) => {
                    warn!(object_id = %self.object_id, %tick, slave, error = %e, "solar charger skipped");
                    continue;
                }
            };
            if let Err(e) = ensure_len("read_input_registers", &regs, usize::from(count)) {
                warn!(object_id = %self.object_id, %tick, slave, error = %e, "solar charger skipped");
                continue;
            }
            let w = Window { start, regs: &regs };
            let charger: f64 = map.pv_power.iter().map(|&r| f64::from(w.at(r))).sum();
            debug!(%tick, slave, power = charger, "solar charger read");
            total += charger;
        }

        Ok(round2(total))
    }

    async fn soc(&self) -> Result<f64, ModbusError> {
        let map = &self.registers.battery;
        let regs = self.read_battery_window().await?;
        let w = Window {
            start: map.window().0,
            regs: &regs,
        };
        Ok(f64::from(w.at(map.soc)) / 10.0)
    }
}
