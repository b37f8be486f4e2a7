use crate::clock::Clock;
use crate::collector::DataCollector;
use crate::config::WorkerSettings;
use crate::error::Result;
use crate::modbus::{ModbusHealth, ModbusIo, RegisterMap};
use crate::models::EnergeticObject;
use crate::repositories::{MeasurementStore, ObjectDirectory, ScheduleStore};
use crate::schedule::ScheduleEngine;
use crate::sink::MeasurementSink;
use crate::worker::{CollectionWorker, ScheduleWorker};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

/// Everything a worker pair needs besides its object.
#[derive(Clone)]
pub struct WorkerContext {
    pub modbus: Arc<dyn ModbusIo>,
    pub schedules: Arc<dyn ScheduleStore>,
    pub measurements: Arc<dyn MeasurementStore>,
    pub clock: Arc<dyn Clock>,
    pub settings: WorkerSettings,
}

/// The parts of an object a running pair was built from. A change restarts
/// the pair.
#[derive(Debug, Clone, PartialEq)]
struct Fingerprint {
    name: String,
    modbus_registers: Option<serde_json::Value>,
}

impl From<&EnergeticObject> for Fingerprint {
    fn from(object: &EnergeticObject) -> Self {
        Self {
            name: object.name.clone(),
            modbus_registers: object.modbus_registers.clone(),
        }
    }
}

/// Dropping the handles (including while a panicking supervisor unwinds)
/// cancels the pair.
struct WorkerHandles {
    fingerprint: Fingerprint,
    cancel: CancellationToken,
    _cancel_on_drop: DropGuard,
    collector: JoinHandle<()>,
    scheduler: JoinHandle<()>,
}

impl WorkerHandles {
    fn is_finished(&self) -> bool {
        self.collector.is_finished() || self.scheduler.is_finished()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub started: usize,
    pub stopped: usize,
    pub restarted: usize,
}

/// Keeps exactly one (collector, scheduler) pair running per active object.
pub struct WorkerSupervisor {
    directory: Arc<dyn ObjectDirectory>,
    ctx: WorkerContext,
    health: Arc<ModbusHealth>,
    workers: HashMap<String, WorkerHandles>,
}

impl WorkerSupervisor {
    pub fn new(directory: Arc<dyn ObjectDirectory>, ctx: WorkerContext, health: Arc<ModbusHealth>) -> Self {
        Self {
            directory,
            ctx,
            health,
            workers: HashMap::new(),
        }
    }

    pub fn managed_objects(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// True while both tasks of the object's pair are alive.
    pub fn is_running(&self, object_id: &str) -> bool {
        self.workers
            .get(object_id)
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            interval_s = self.ctx.settings.supervisor_check_interval.as_secs(),
            "worker supervisor started"
        );
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            if let Err(e) = self.reconcile(&shutdown).await {
                error!(error = %e, "failed to list active objects; keeping current workers");
            }
            self.log_health().await;

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.ctx.settings.supervisor_check_interval) => {}
            }
        }
        self.shutdown_all().await;
        info!("worker supervisor stopped");
    }

    /// One supervisory pass against the current set of active objects.
    pub async fn reconcile(&mut self, shutdown: &CancellationToken) -> Result<ReconcileSummary> {
        let active = self.directory.list_active().await?;
        let active_ids: HashSet<&str> = active.iter().map(|o| o.id.as_str()).collect();
        let mut summary = ReconcileSummary::default();

        let gone: Vec<String> = self
            .workers
            .keys()
            .filter(|id| !active_ids.contains(id.as_str()))
            .cloned()
            .collect();
        for id in gone {
            if let Some(handles) = self.workers.remove(&id) {
                info!(object_id = %id, "object no longer active; stopping workers");
                stop_pair(&id, handles).await;
                summary.stopped += 1;
            }
        }

        for object in &active {
            let fingerprint = Fingerprint::from(object);
            let restart = match self.workers.get(&object.id) {
                None => false,
                Some(h) if h.fingerprint != fingerprint => {
                    info!(object_id = %object.id, "object settings changed; restarting workers");
                    true
                }
                Some(h) if h.is_finished() => {
                    warn!(object_id = %object.id, "worker ended unexpectedly; respawning");
                    true
                }
                Some(_) => continue,
            };

            if restart {
                if let Some(handles) = self.workers.remove(&object.id) {
                    stop_pair(&object.id, handles).await;
                }
                summary.restarted += 1;
            } else {
                info!(object_id = %object.id, object_name = %object.name, "starting workers");
                summary.started += 1;
            }

            let handles = self.spawn_pair(object, fingerprint, shutdown);
            self.workers.insert(object.id.clone(), handles);
        }

        if summary != ReconcileSummary::default() {
            debug!(?summary, "reconcile pass changed workers");
        }
        Ok(summary)
    }

    fn spawn_pair(
        &self,
        object: &EnergeticObject,
        fingerprint: Fingerprint,
        shutdown: &CancellationToken,
    ) -> WorkerHandles {
        let settings = &self.ctx.settings;
        let registers = RegisterMap::for_object(object);
        let cancel = shutdown.child_token();

        let collection = CollectionWorker::new(
            object.clone(),
            DataCollector::new(object.id.clone(), self.ctx.modbus.clone(), registers.clone()),
            MeasurementSink::new(self.ctx.measurements.clone()),
            settings.collection_interval,
        );
        let engine = ScheduleEngine::new(
            object.id.clone(),
            &registers,
            self.ctx.schedules.clone(),
            self.ctx.modbus.clone(),
            self.ctx.clock.clone(),
            settings.fallback,
            settings.writes_enabled,
        );
        let scheduling = ScheduleWorker::new(object.id.clone(), engine, settings.schedule_check_interval);

        WorkerHandles {
            fingerprint,
            collector: tokio::spawn(collection.run(cancel.clone())),
            scheduler: tokio::spawn(scheduling.run(cancel.clone())),
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
        }
    }

    async fn log_health(&self) {
        let modbus_connected = self.ctx.modbus.is_connected().await;
        info!(
            managed = self.workers.len(),
            modbus_errors = self.health.error_count(),
            modbus_connected = modbus_connected,
            "supervisor health"
        );
    }

    /// Cancel every pair and wait for all tasks to finish.
    pub async fn shutdown_all(&mut self) {
        for (id, handles) in self.workers.drain() {
            stop_pair(&id, handles).await;
        }
    }
}

async fn stop_pair(object_id: &str, handles: WorkerHandles) {
    handles.cancel.cancel();
    for (task, handle) in [("collector", handles.collector), ("scheduler", handles.scheduler)] {
        match handle.await {
            Ok(()) => {}
            Err(e) if e.is_panic() => error!(object_id, task, error = %e, "worker task panicked"),
            Err(e) => warn!(object_id, task, error = %e, "worker task did not finish cleanly"),
        }
    }
}
