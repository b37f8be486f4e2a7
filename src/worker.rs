//! The two long-lived loops bound to one energetic object.
//!
//! Each iteration is its own error boundary: failures are logged and the
//! loop carries on after the next sleep. Cancellation is checked both while a
//! tick is in flight and while sleeping, so a cancelled loop stops at its
//! next suspension point without further Modbus traffic.

use crate::collector::DataCollector;
use crate::error::AppError;
use crate::models::EnergeticObject;
use crate::schedule::ScheduleEngine;
use crate::sink::MeasurementSink;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct CollectionWorker {
    object: EnergeticObject,
    collector: DataCollector,
    sink: MeasurementSink,
    interval: Duration,
}

impl CollectionWorker {
    pub fn new(
        object: EnergeticObject,
        collector: DataCollector,
        sink: MeasurementSink,
        interval: Duration,
    ) -> Self {
        Self {
            object,
            collector,
            sink,
            interval,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(object_id = %self.object.id, object_name = %self.object.name, "collection loop started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.tick() => {}
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!(object_id = %self.object.id, "collection loop stopped");
    }

    async fn tick(&self) {
        let tick = Uuid::new_v4();
        let data = self.collector.collect(tick).await;
        match self.sink.record(&self.object, data).await {
            Ok(m) => debug!(object_id = %self.object.id, %tick, soc = m.soc, "measurement stored"),
            Err(AppError::Incomplete(missing)) => warn!(
                object_id = %self.object.id,
                %tick,
                missing = %missing.join(", "),
                "incomplete measurement; tick skipped"
            ),
            Err(e @ AppError::Db(_)) => {
                error!(object_id = %self.object.id, %tick, error = %e, "failed to store measurement")
            }
            Err(e) => warn!(object_id = %self.object.id, %tick, error = %e, "collection tick failed"),
        }
    }
}

pub struct ScheduleWorker {
    object_id: String,
    engine: ScheduleEngine,
    interval: Duration,
}

impl ScheduleWorker {
    pub fn new(object_id: impl Into<String>, engine: ScheduleEngine, interval: Duration) -> Self {
        Self {
            object_id: object_id.into(),
            engine,
            interval,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!(object_id = %self.object_id, "schedule loop started");
        loop {
            let res = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                res = self.engine.tick() => res,
            };
            match res {
                Ok(outcome) => debug!(object_id = %self.object_id, ?outcome, "schedule tick"),
                Err(e @ AppError::Db(_)) => {
                    error!(object_id = %self.object_id, error = %e, "schedule tick abandoned")
                }
                Err(e) => warn!(object_id = %self.object_id, error = %e, "schedule tick failed"),
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!(object_id = %self.object_id, "schedule loop stopped");
    }
}
