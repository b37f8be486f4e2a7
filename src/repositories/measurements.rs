use super::MeasurementStore;
use crate::db::DbPool;
use crate::error::Result;
use crate::models::{Measurement, MeasurementPage, MeasurementQuery};
use async_trait::async_trait;
use sqlx::Row;

const COLUMNS: &str = "id, energetic_object_id, object_name, measured_at, \
    battery_voltage, battery_current, battery_soc, battery_temperature, battery_power_reg, battery_soh, \
    general_battery_power, \
    inverter_dc_power, inverter_ac_output_l1, inverter_ac_output_l2, inverter_ac_output_l3, \
    inverter_total_ac_output, \
    ess_input_voltage_l1, ess_input_voltage_l2, ess_input_voltage_l3, \
    ess_input_current_l1, ess_input_current_l2, ess_input_current_l3, \
    ess_input_frequency_l1, ess_input_frequency_l2, ess_input_frequency_l3, \
    ess_input_power_l1, ess_input_power_l2, ess_input_power_l3, \
    ess_output_voltage_l1, ess_output_voltage_l2, ess_output_voltage_l3, \
    ess_output_current_l1, ess_output_current_l2, ess_output_current_l3, \
    ess_total_input_power, solar_total_pv_power, soc";

const COLUMN_COUNT: usize = 37;

#[derive(Clone)]
pub struct MeasurementRepository {
    pool: DbPool,
}

impl MeasurementRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append one row. Rows are never updated.
    pub async fn append(&self, m: &Measurement) -> Result<()> {
        let placeholders: Vec<String> = (1..=COLUMN_COUNT).map(|i| format!("${}", i)).collect();
        let sql = format!(
            "INSERT INTO cerbo_measurements ({}) VALUES ({})",
            COLUMNS,
            placeholders.join(", ")
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(&sql)
            .bind(&m.id)
            .bind(&m.energetic_object_id)
            .bind(&m.object_name)
            .bind(m.measured_at)
            .bind(m.battery.battery_voltage)
            .bind(m.battery.battery_current)
            .bind(m.battery.battery_soc)
            .bind(m.battery.battery_temperature)
            .bind(m.battery.battery_power_reg)
            .bind(m.battery.battery_soh)
            .bind(m.general_battery_power)
            .bind(m.inverter.inverter_dc_power)
            .bind(m.inverter.inverter_ac_output_l1)
            .bind(m.inverter.inverter_ac_output_l2)
            .bind(m.inverter.inverter_ac_output_l3)
            .bind(m.inverter_total_ac_output)
            .bind(m.ess.ess_input_voltage_l1)
            .bind(m.ess.ess_input_voltage_l2)
            .bind(m.ess.ess_input_voltage_l3)
            .bind(m.ess.ess_input_current_l1)
            .bind(m.ess.ess_input_current_l2)
            .bind(m.ess.ess_input_current_l3)
            .bind(m.ess.ess_input_frequency_l1)
            .bind(m.ess.ess_input_frequency_l2)
            .bind(m.ess.ess_input_frequency_l3)
            .bind(m.ess.ess_input_power_l1)
            .bind(m.ess.ess_input_power_l2)
            .bind(m.ess.ess_input_power_l3)
            .bind(m.ess.ess_output_voltage_l1)
            .bind(m.ess.ess_output_voltage_l2)
            .bind(m.ess.ess_output_voltage_l3)
            .bind(m.ess.ess_output_current_l1)
            .bind(m.ess.ess_output_current_l2)
            .bind(m.ess.ess_output_current_l3)
            .bind(m.ess_total_input_power)
            .bind(m.solar_total_pv_power)
            .bind(m.soc)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Filter clause shared by the page and count queries. Placeholders
    /// are numbered from `$1` in the order the filters are bound.
    fn filter_clause(query: &MeasurementQuery) -> (String, usize) {
        let mut conditions = Vec::new();
        let mut arg_index = 1;

        if query.object_name.is_some() {
            conditions.push(format!("object_name = ${}", arg_index));
            arg_index += 1;
        }
        if query.start_date.is_some() {
            conditions.push(format!("measured_at >= ${}", arg_index));
            arg_index += 1;
        }
        if query.end_date.is_some() {
            conditions.push(format!("measured_at <= ${}", arg_index));
            arg_index += 1;
        }

        let clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" AND {}", conditions.join(" AND "))
        };
        (clause, arg_index)
    }

    pub async fn find_page(&self, query: &MeasurementQuery) -> Result<Vec<Measurement>> {
        query.validate()?;
        let (clause, arg_index) = Self::filter_clause(query);
        let sql = format!(
            "SELECT {} FROM cerbo_measurements WHERE 1=1{} ORDER BY measured_at DESC LIMIT ${} OFFSET ${}",
            COLUMNS,
            clause,
            arg_index,
            arg_index + 1
        );

        let mut q = sqlx::query_as::<_, Measurement>(&sql);
        if let Some(name) = &query.object_name {
            q = q.bind(name);
        }
        if let Some(start) = query.start_date {
            q = q.bind(start);
        }
        if let Some(end) = query.end_date {
            q = q.bind(end);
        }
        q = q.bind(query.page_size).bind(query.offset());

        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows)
    }

    pub async fn count(&self, query: &MeasurementQuery) -> Result<i64> {
        query.validate()?;
        let (clause, _) = Self::filter_clause(query);
        let sql = format!(
            "SELECT COUNT(*) AS count FROM cerbo_measurements WHERE 1=1{}",
            clause
        );

        let mut q = sqlx::query(&sql);
        if let Some(name) = &query.object_name {
            q = q.bind(name);
        }
        if let Some(start) = query.start_date {
            q = q.bind(start);
        }
        if let Some(end) = query.end_date {
            q = q.bind(end);
        }

        let row = q.fetch_one(&self.pool).await?;
        let count: i64 = row.get("count");
        Ok(count)
    }

    pub async fn page(&self, query: &MeasurementQuery) -> Result<MeasurementPage> {
        let data = self.find_page(query).await?;
        let total = self.count(query).await?;
        Ok(MeasurementPage {
            data,
            total,
            page: query.page,
            page_size: query.page_size,
        })
    }
}

#[async_trait]
impl MeasurementStore for MeasurementRepository {
    async fn append(&self, measurement: &Measurement) -> Result<()> {
        MeasurementRepository::append(self, measurement).await
    }
}
