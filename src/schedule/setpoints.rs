use crate::error::AppError;
use crate::modbus::{decode_signed_16, encode_signed_16};
use serde::{Deserialize, Serialize};

/// Inverter setpoints in engineering units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setpoints {
    /// Grid feed-in, watts. Negative imports from the grid.
    pub grid_feed_w: i32,
    /// VE.Bus minimum SoC, percent.
    pub battery_level_percent: i32,
    /// DVCC maximum charge current, amperes.
    pub charge_battery_value: i32,
}

/// Raw register words for 2703 / 2901 / 2705, in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetpointWords {
    pub grid_feed: u16,
    pub soc_minimum: u16,
    pub max_charge_current: u16,
}

impl Setpoints {
    /// Register encoding. Grid feed is stored in 100 W steps (truncated
    /// toward zero), SoC in tenths of a percent.
    pub fn encode(&self) -> Result<SetpointWords, AppError> {
        let grid_steps = self.grid_feed_w / 100;
        let grid_steps = i16::try_from(grid_steps).map_err(|_| {
            AppError::Validation(format!(
                "grid_feed_w {} does not fit the 2703 register",
                self.grid_feed_w
            ))
        })?;

        if !(0..=100).contains(&self.battery_level_percent) {
            return Err(AppError::Validation(format!(
                "battery_level_percent {} outside 0..=100",
                self.battery_level_percent
            )));
        }
        let soc_word = (self.battery_level_percent * 10) as u16;

        let charge = i16::try_from(self.charge_battery_value).map_err(|_| {
            AppError::Validation(format!(
                "charge_battery_value {} does not fit the 2705 register",
                self.charge_battery_value
            ))
        })?;

        Ok(SetpointWords {
            grid_feed: encode_signed_16(grid_steps),
            soc_minimum: soc_word,
            max_charge_current: encode_signed_16(charge),
        })
    }
}

impl SetpointWords {
    pub fn decode(&self) -> Setpoints {
        Setpoints {
            grid_feed_w: i32::from(decode_signed_16(self.grid_feed)) * 100,
            battery_level_percent: i32::from(self.soc_minimum / 10),
            charge_battery_value: i32::from(decode_signed_16(self.max_charge_current)),
        }
    }
}
