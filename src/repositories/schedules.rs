use super::ScheduleStore;
use crate::db::DbPool;
use crate::error::Result;
use crate::models::{NewSchedule, Schedule};
use async_trait::async_trait;
use uuid::Uuid;

const SELECT_COLUMNS: &str = "id, energetic_object_id, start_time, end_time, \
    EXTRACT(EPOCH FROM duration)::BIGINT AS duration_secs, \
    grid_feed_w, battery_level_percent, charge_battery_value, is_manual_mode, is_active";

#[derive(Clone)]
pub struct ScheduleRepository {
    pool: DbPool,
}

impl ScheduleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list_for_object(&self, object_id: &str) -> Result<Vec<Schedule>> {
        let sql = format!(
            "SELECT {} FROM energetic_schedule WHERE energetic_object_id = $1 ORDER BY start_time, id",
            SELECT_COLUMNS
        );
        let schedules = sqlx::query_as::<_, Schedule>(&sql)
            .bind(object_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(schedules)
    }

    /// Deactivate every other non-manual schedule of the object, then
    /// activate `active`, in one transaction. Manual-mode rows are left alone.
    pub async fn apply_active_flags(&self, object_id: &str, active: Option<&str>) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let deactivated = match active {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE energetic_schedule
                    SET is_active = FALSE
                    WHERE energetic_object_id = $1
                      AND is_manual_mode = FALSE
                      AND is_active = TRUE
                      AND id <> $2
                    "#,
                )
                .bind(object_id)
                .bind(id)
                .execute(&mut *tx)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE energetic_schedule
                    SET is_active = FALSE
                    WHERE energetic_object_id = $1
                      AND is_manual_mode = FALSE
                      AND is_active = TRUE
                    "#,
                )
                .bind(object_id)
                .execute(&mut *tx)
                .await?
            }
        }
        .rows_affected();

        let activated = match active {
            Some(id) => sqlx::query(
                r#"
                UPDATE energetic_schedule
                SET is_active = TRUE
                WHERE energetic_object_id = $1
                  AND id = $2
                  AND is_manual_mode = FALSE
                  AND is_active = FALSE
                "#,
            )
            .bind(object_id)
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected(),
            None => 0,
        };

        tx.commit().await?;
        Ok(deactivated + activated)
    }

    /// Insert a schedule; `end_time` is derived from start and duration.
    pub async fn create(&self, new: &NewSchedule) -> Result<Schedule> {
        new.validate()?;
        let id = Uuid::new_v4().to_string();
        let sql = format!(
            r#"
            INSERT INTO energetic_schedule (
                id, energetic_object_id, start_time, duration, end_time,
                grid_feed_w, battery_level_percent, charge_battery_value,
                is_manual_mode, is_active
            ) VALUES (
                $1, $2, $3, make_interval(secs => $4::DOUBLE PRECISION), $5,
                $6, $7, $8, $9, FALSE
            )
            RETURNING {}
            "#,
            SELECT_COLUMNS
        );

        let schedule = sqlx::query_as::<_, Schedule>(&sql)
            .bind(&id)
            .bind(&new.energetic_object_id)
            .bind(new.start_time)
            .bind(new.duration_secs())
            .bind(new.end_time())
            .bind(new.grid_feed_w)
            .bind(new.battery_level_percent)
            .bind(new.charge_battery_value)
            .bind(new.is_manual_mode)
            .fetch_one(&self.pool)
            .await?;

        Ok(schedule)
    }
}

#[async_trait]
impl ScheduleStore for ScheduleRepository {
    async fn list_for_object(&self, object_id: &str) -> Result<Vec<Schedule>> {
        ScheduleRepository::list_for_object(self, object_id).await
    }

    async fn apply_active_flags(&self, object_id: &str, active: Option<&str>) -> Result<u64> {
        ScheduleRepository::apply_active_flags(self, object_id, active).await
    }
}
