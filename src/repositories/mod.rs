pub mod measurements;
pub mod objects;
pub mod schedules;

pub use measurements::MeasurementRepository;
pub use objects::ObjectRepository;
pub use schedules::ScheduleRepository;

use crate::error::Result;
use crate::models::{EnergeticObject, Measurement, Schedule};
use async_trait::async_trait;

/// Source of the objects the supervisor should be running workers for.
#[async_trait]
pub trait ObjectDirectory: Send + Sync {
    async fn list_active(&self) -> Result<Vec<EnergeticObject>>;
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// All schedules of an object, ordered by `start_time` then id.
    async fn list_for_object(&self, object_id: &str) -> Result<Vec<Schedule>>;

    /// Mark `active` as the only active non-manual schedule of the object.
    /// Returns the number of rows whose flag changed.
    async fn apply_active_flags(&self, object_id: &str, active: Option<&str>) -> Result<u64>;
}

#[async_trait]
pub trait MeasurementStore: Send + Sync {
    async fn append(&self, measurement: &Measurement) -> Result<()>;
}
