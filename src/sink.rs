use crate::error::Result;
use crate::models::{CollectedData, EnergeticObject, Measurement};
use crate::repositories::MeasurementStore;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Turns a collection tick into a persisted row, or rejects it as incomplete.
#[derive(Clone)]
pub struct MeasurementSink {
    store: Arc<dyn MeasurementStore>,
}

impl MeasurementSink {
    pub fn new(store: Arc<dyn MeasurementStore>) -> Self {
        Self { store }
    }

    pub async fn record(&self, object: &EnergeticObject, data: CollectedData) -> Result<Measurement> {
        let measurement = data.into_measurement(Uuid::new_v4().to_string(), object, Utc::now())?;
        self.store.append(&measurement).await?;
        Ok(measurement)
    }
}
