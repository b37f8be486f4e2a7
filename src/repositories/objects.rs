use super::ObjectDirectory;
use crate::db::DbPool;
use crate::error::Result;
use crate::models::EnergeticObject;
use async_trait::async_trait;

#[derive(Clone)]
pub struct ObjectRepository {
    pool: DbPool,
}

impl ObjectRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list_active(&self) -> Result<Vec<EnergeticObject>> {
        let objects = sqlx::query_as::<_, EnergeticObject>(
            r#"
            SELECT id, name, is_active, modbus_registers
            FROM energetic_objects
            WHERE is_active = TRUE
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(objects)
    }
}

#[async_trait]
impl ObjectDirectory for ObjectRepository {
    async fn list_active(&self) -> Result<Vec<EnergeticObject>> {
        ObjectRepository::list_active(self).await
    }
}
