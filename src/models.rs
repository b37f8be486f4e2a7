use crate::error::AppError;
use crate::schedule::Setpoints;
use chrono::{DateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A managed installation: one gateway-side register layout plus its
/// schedules and measurement history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EnergeticObject {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub modbus_registers: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct BatteryReadings {
    pub battery_voltage: Option<f64>,
    pub battery_current: Option<f64>,
    pub battery_soc: Option<f64>,
    pub battery_temperature: Option<f64>,
    pub battery_power_reg: Option<f64>,
    pub battery_soh: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct InverterReadings {
    pub inverter_dc_power: Option<f64>,
    pub inverter_ac_output_l1: Option<f64>,
    pub inverter_ac_output_l2: Option<f64>,
    pub inverter_ac_output_l3: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EssReadings {
    pub ess_input_voltage_l1: Option<f64>,
    pub ess_input_voltage_l2: Option<f64>,
    pub ess_input_voltage_l3: Option<f64>,
    pub ess_input_current_l1: Option<f64>,
    pub ess_input_current_l2: Option<f64>,
    pub ess_input_current_l3: Option<f64>,
    pub ess_input_frequency_l1: Option<f64>,
    pub ess_input_frequency_l2: Option<f64>,
    pub ess_input_frequency_l3: Option<f64>,
    pub ess_input_power_l1: Option<f64>,
    pub ess_input_power_l2: Option<f64>,
    pub ess_input_power_l3: Option<f64>,
    pub ess_output_voltage_l1: Option<f64>,
    pub ess_output_voltage_l2: Option<f64>,
    pub ess_output_voltage_l3: Option<f64>,
    pub ess_output_current_l1: Option<f64>,
    pub ess_output_current_l2: Option<f64>,
    pub ess_output_current_l3: Option<f64>,
}

/// One persisted row of `cerbo_measurements`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Measurement {
    pub id: String,
    pub energetic_object_id: String,
    pub object_name: String,
    pub measured_at: DateTime<Utc>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub battery: BatteryReadings,
    pub general_battery_power: f64,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub inverter: InverterReadings,
    pub inverter_total_ac_output: f64,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub ess: EssReadings,
    pub ess_total_input_power: f64,
    pub solar_total_pv_power: f64,
    pub soc: f64,
}

/// What one collection tick managed to read. Groups that failed stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedData {
    pub battery: Option<BatteryReadings>,
    pub general_battery_power: Option<f64>,
    pub inverter: Option<InverterReadings>,
    pub inverter_total_ac_output: Option<f64>,
    pub ess: Option<EssReadings>,
    pub ess_total_input_power: Option<f64>,
    pub solar_total_pv_power: Option<f64>,
    pub soc: Option<f64>,
}

impl CollectedData {
    /// Names of required fields that are still missing.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.general_battery_power.is_none() {
            missing.push("general_battery_power");
        }
        if self.inverter_total_ac_output.is_none() {
            missing.push("inverter_total_ac_output");
        }
        if self.ess_total_input_power.is_none() {
            missing.push("ess_total_input_power");
        }
        if self.solar_total_pv_power.is_none() {
            missing.push("solar_total_pv_power");
        }
        if self.soc.is_none() {
            missing.push("soc");
        }
        missing
    }

    pub fn into_measurement(
        self,
        id: String,
        object: &EnergeticObject,
        measured_at: DateTime<Utc>,
    ) -> Result<Measurement, AppError> {
        let mut missing = self.missing_required();
        if object.name.trim().is_empty() {
            missing.push("object_name");
        }

        match (
            self.general_battery_power,
            self.inverter_total_ac_output,
            self.ess_total_input_power,
            self.solar_total_pv_power,
            self.soc,
        ) {
            (Some(gbp), Some(inv), Some(ess), Some(solar), Some(soc)) if missing.is_empty() => {
                Ok(Measurement {
                    id,
                    energetic_object_id: object.id.clone(),
                    object_name: object.name.clone(),
                    measured_at,
                    battery: self.battery.unwrap_or_default(),
                    general_battery_power: gbp,
                    inverter: self.inverter.unwrap_or_default(),
                    inverter_total_ac_output: inv,
                    ess: self.ess.unwrap_or_default(),
                    ess_total_input_power: ess,
                    solar_total_pv_power: solar,
                    soc,
                })
            }
            _ => Err(AppError::Incomplete(missing)),
        }
    }
}

/// Paginated read filter over `cerbo_measurements`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementQuery {
    pub page: i64,
    pub page_size: i64,
    pub object_name: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

pub const MAX_PAGE_SIZE: i64 = 1000;

impl Default for MeasurementQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 50,
            object_name: None,
            start_date: None,
            end_date: None,
        }
    }
}

impl MeasurementQuery {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.page < 1 {
            return Err(AppError::Validation(format!(
                "page must be >= 1, got {}",
                self.page
            )));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(AppError::Validation(format!(
                "page_size must be within 1..={}, got {}",
                MAX_PAGE_SIZE, self.page_size
            )));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(AppError::Validation(
                    "start_date must not be after end_date".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MeasurementPage {
    pub data: Vec<Measurement>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

/// Row of `energetic_schedule`. The interval column is read as whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Schedule {
    pub id: String,
    pub energetic_object_id: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_secs: i64,
    pub grid_feed_w: i32,
    pub battery_level_percent: i32,
    pub charge_battery_value: i32,
    pub is_manual_mode: bool,
    pub is_active: bool,
}

impl Schedule {
    pub fn setpoints(&self) -> Setpoints {
        Setpoints {
            grid_feed_w: self.grid_feed_w,
            battery_level_percent: self.battery_level_percent,
            charge_battery_value: self.charge_battery_value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSchedule {
    pub energetic_object_id: String,
    pub start_time: NaiveTime,
    pub duration_hours: u32,
    pub duration_minutes: u32,
    pub grid_feed_w: i32,
    pub battery_level_percent: i32,
    pub charge_battery_value: i32,
    #[serde(default)]
    pub is_manual_mode: bool,
}

impl NewSchedule {
    pub fn duration_secs(&self) -> i64 {
        i64::from(self.duration_hours) * 3600 + i64::from(self.duration_minutes) * 60
    }

    /// `start_time + duration`, wrapped at midnight.
    pub fn end_time(&self) -> NaiveTime {
        let secs = (i64::from(self.start_time.num_seconds_from_midnight()) + self.duration_secs())
            .rem_euclid(86_400);
        NaiveTime::from_num_seconds_from_midnight_opt(secs as u32, 0).unwrap_or(self.start_time)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.duration_minutes >= 60 {
            return Err(AppError::Validation(format!(
                "duration_minutes must be < 60, got {}",
                self.duration_minutes
            )));
        }
        if self.duration_secs() == 0 {
            return Err(AppError::Validation("duration must be positive".into()));
        }
        if !(0..=100).contains(&self.battery_level_percent) {
            return Err(AppError::Validation(format!(
                "battery_level_percent must be within 0..=100, got {}",
                self.battery_level_percent
            )));
        }
        Ok(())
    }
}
