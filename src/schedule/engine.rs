use super::setpoints::{SetpointWords, Setpoints};
use super::window::select_active;
use crate::clock::Clock;
use crate::error::Result;
use crate::modbus::registers::SetpointRegisters;
use crate::modbus::{ensure_len, ModbusError, ModbusIo, RegisterMap};
use crate::models::Schedule;
use crate::repositories::ScheduleStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowState {
    Idle,
    Running(String),
}

impl WindowState {
    fn from_active(active: Option<&Schedule>) -> Self {
        match active {
            Some(s) => WindowState::Running(s.id.clone()),
            None => WindowState::Idle,
        }
    }
}

/// What one schedule tick ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A read-back failed; nothing else was attempted.
    Deferred,
    /// Inverter already holds the desired setpoints.
    InSync,
    /// Setpoints were written.
    Applied,
    /// Setpoints differ but writes are disabled.
    WritesDisabled,
    /// Desired setpoints cannot be encoded; no writes.
    Refused,
    /// A write failed; flags and state are left for the next tick.
    WriteFailed,
}

/// Per-object schedule enforcer. Each tick re-reads the schedules and the
/// inverter, so the only state carried between ticks is the window the
/// engine last settled on.
pub struct ScheduleEngine {
    object_id: String,
    store: Arc<dyn ScheduleStore>,
    modbus: Arc<dyn ModbusIo>,
    clock: Arc<dyn Clock>,
    registers: SetpointRegisters,
    inverter_slave: u8,
    fallback: Setpoints,
    writes_enabled: bool,
    state: WindowState,
}

impl ScheduleEngine {
    pub fn new(
        object_id: impl Into<String>,
        register_map: &RegisterMap,
        store: Arc<dyn ScheduleStore>,
        modbus: Arc<dyn ModbusIo>,
        clock: Arc<dyn Clock>,
        fallback: Setpoints,
        writes_enabled: bool,
    ) -> Self {
        Self {
            object_id: object_id.into(),
            store,
            modbus,
            clock,
            registers: register_map.setpoints.clone(),
            inverter_slave: register_map.inverter_slave,
            fallback,
            writes_enabled,
            state: WindowState::Idle,
        }
    }

    pub fn state(&self) -> &WindowState {
        &self.state
    }

    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let schedules = self.store.list_for_object(&self.object_id).await?;
        let now = self.clock.now().time();
        let active = select_active(&schedules, now);
        let desired = active.map(Schedule::setpoints).unwrap_or(self.fallback);

        let current = match self.read_back().await {
            Ok(words) => words,
            Err(e) => {
                warn!(object_id = %self.object_id, error = %e, "setpoint read-back failed; deferring tick");
                return Ok(TickOutcome::Deferred);
            }
        };

        let outcome = match desired.encode() {
            Err(e) => {
                warn!(object_id = %self.object_id, error = %e, "refusing to write setpoints");
                TickOutcome::Refused
            }
            Ok(words) if words == current => {
                debug!(object_id = %self.object_id, ?desired, "setpoints in sync");
                TickOutcome::InSync
            }
            Ok(_) if !self.writes_enabled => {
                info!(
                    object_id = %self.object_id,
                    current = ?current.decode(),
                    ?desired,
                    "setpoints differ; writes disabled"
                );
                TickOutcome::WritesDisabled
            }
            Ok(words) => {
                if let Err(e) = self.write_words(words).await {
                    warn!(object_id = %self.object_id, error = %e, "setpoint write failed");
                    return Ok(TickOutcome::WriteFailed);
                }
                info!(
                    object_id = %self.object_id,
                    previous = ?current.decode(),
                    applied = ?desired,
                    "setpoints written"
                );
                TickOutcome::Applied
            }
        };

        let active_id = active.map(|s| s.id.as_str());
        if flags_need_update(&schedules, active_id) {
            let changed = self
                .store
                .apply_active_flags(&self.object_id, active_id)
                .await?;
            debug!(object_id = %self.object_id, changed, "schedule flags updated");
        }

        let next = WindowState::from_active(active);
        if next != self.state {
            info!(object_id = %self.object_id, from = ?self.state, to = ?next, "schedule window changed");
            self.state = next;
        }

        Ok(outcome)
    }

    async fn read_word(&self, address: u16) -> std::result::Result<u16, ModbusError> {
        let regs = self
            .modbus
            .read_holding_registers(address, 1, self.inverter_slave)
            .await?;
        ensure_len("read_holding_registers", &regs, 1)?;
        Ok(regs[0])
    }

    async fn read_back(&self) -> std::result::Result<SetpointWords, ModbusError> {
        Ok(SetpointWords {
            grid_feed: self.read_word(self.registers.grid_feed).await?,
            soc_minimum: self.read_word(self.registers.soc_minimum).await?,
            max_charge_current: self.read_word(self.registers.max_charge_current).await?,
        })
    }

    async fn write_words(&self, words: SetpointWords) -> std::result::Result<(), ModbusError> {
        let writes = [
            (self.registers.grid_feed, words.grid_feed),
            (self.registers.soc_minimum, words.soc_minimum),
            (self.registers.max_charge_current, words.max_charge_current),
        ];
        for (register, value) in writes {
            self.modbus
                .write_register(register, value, self.inverter_slave)
                .await?;
            debug!(object_id = %self.object_id, register, value, "register written");
        }
        Ok(())
    }
}

fn flags_need_update(schedules: &[Schedule], active_id: Option<&str>) -> bool {
    schedules
        .iter()
        .filter(|s| !s.is_manual_mode)
        .any(|s| s.is_active != (Some(s.id.as_str()) == active_id))
}
