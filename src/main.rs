use cerbo_worker::clock::SystemClock;
use cerbo_worker::modbus::{ModbusHealth, ModbusTransport};
use cerbo_worker::repositories::{MeasurementRepository, ObjectRepository, ScheduleRepository};
use cerbo_worker::supervisor::{WorkerContext, WorkerSupervisor};
use cerbo_worker::{db, Config};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let cfg_path = std::env::var("APP_CONFIG").unwrap_or_else(|_| "config/config.yaml".into());
    let cfg = Config::load(&cfg_path)?;
    let settings = cfg.worker_settings();
    info!(
        modbus = %format!("{}:{}", cfg.modbus.host, cfg.modbus.port),
        writes_enabled = settings.writes_enabled,
        "loaded config from {}",
        cfg_path
    );
    if !settings.writes_enabled {
        warn!("setpoint writes are disabled; running dry");
    }

    let pool = db::connect(&cfg.database.url, cfg.database.max_connections).await?;
    sqlx::query("SELECT 1").execute(&pool).await?;
    info!("connected to database");

    let health = Arc::new(ModbusHealth::new());
    let transport = Arc::new(ModbusTransport::new(
        cfg.modbus.host.clone(),
        cfg.modbus.port,
        cfg.modbus_timeout(),
        health.clone(),
    ));
    match transport.connect().await {
        Ok(()) => info!("connected to modbus gateway"),
        Err(e) => warn!(error = %e, "modbus gateway unavailable at startup; will retry on demand"),
    }

    let ctx = WorkerContext {
        modbus: transport,
        schedules: Arc::new(ScheduleRepository::new(pool.clone())),
        measurements: Arc::new(MeasurementRepository::new(pool.clone())),
        clock: Arc::new(SystemClock),
        settings,
    };
    let supervisor = WorkerSupervisor::new(Arc::new(ObjectRepository::new(pool)), ctx, health);

    let shutdown = CancellationToken::new();
    let mut supervisor_task = tokio::spawn(supervisor.run(shutdown.clone()));

    tokio::select! {
        _ = wait_for_signal() => {
            info!("shutdown requested");
            shutdown.cancel();
            supervisor_task.await?;
        }
        res = &mut supervisor_task => {
            shutdown.cancel();
            res?;
            anyhow::bail!("worker supervisor exited unexpectedly");
        }
    }

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "cannot install SIGTERM handler; waiting for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
