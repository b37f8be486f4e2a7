use crate::schedule::Setpoints;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DbConfig,
    pub modbus: ModbusConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub defaults: DefaultSetpoints,
    #[serde(default)]
    pub control: ControlConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConfig {
    pub host: String,
    #[serde(default = "default_modbus_port")]
    pub port: u16,
    /// Bound on connect and on every request
    #[serde(default = "default_modbus_timeout_s")]
    pub timeout_s: u64,
}

fn default_modbus_port() -> u16 {
    502
}

fn default_modbus_timeout_s() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_collection_interval_s")]
    pub collection_interval_s: u64,
    #[serde(default = "default_schedule_check_interval_s")]
    pub schedule_check_interval_s: u64,
    #[serde(default = "default_supervisor_check_interval_s")]
    pub supervisor_check_interval_s: u64,
}

fn default_collection_interval_s() -> u64 {
    2
}

fn default_schedule_check_interval_s() -> u64 {
    3
}

fn default_supervisor_check_interval_s() -> u64 {
    5
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            collection_interval_s: default_collection_interval_s(),
            schedule_check_interval_s: default_schedule_check_interval_s(),
            supervisor_check_interval_s: default_supervisor_check_interval_s(),
        }
    }
}

/// Setpoints applied while no schedule window is active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultSetpoints {
    #[serde(default = "default_grid_feed_w")]
    pub grid_feed_w: i32,
    #[serde(default = "default_battery_level_percent")]
    pub battery_level_percent: i32,
    #[serde(default = "default_charge_battery_value")]
    pub charge_battery_value: i32,
}

fn default_grid_feed_w() -> i32 {
    70000
}

fn default_battery_level_percent() -> i32 {
    30
}

fn default_charge_battery_value() -> i32 {
    300
}

impl Default for DefaultSetpoints {
    fn default() -> Self {
        Self {
            grid_feed_w: default_grid_feed_w(),
            battery_level_percent: default_battery_level_percent(),
            charge_battery_value: default_charge_battery_value(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlConfig {
    /// When false the schedule engine runs dry: read-backs and flag updates
    /// happen, inverter writes do not.
    #[serde(default)]
    pub writes_enabled: bool,
}

/// Runtime form of the worker-related settings, shared by every worker pair.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub collection_interval: Duration,
    pub schedule_check_interval: Duration,
    pub supervisor_check_interval: Duration,
    pub fallback: Setpoints,
    pub writes_enabled: bool,
}

impl Config {
    /// Load YAML from disk, substitute $(VAR)/${VAR} with env vars, then parse.
    /// Afterwards DATABASE_URL, MODBUS_HOST, MODBUS_PORT and WRITES_ENABLED
    /// override the file; APP_ENV is honoured when WRITES_ENABLED is unset.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let raw = std::fs::read_to_string(path)?;
        let expanded = expand_env_placeholders(&raw)?;
        let mut cfg: Self = serde_yaml::from_str(&expanded)?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            cfg.database.url = url;
        }
        if let Ok(host) = std::env::var("MODBUS_HOST") {
            cfg.modbus.host = host;
        }
        if let Ok(port) = std::env::var("MODBUS_PORT") {
            cfg.modbus.port = port
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid MODBUS_PORT '{}': {}", port, e))?;
        }
        if let Ok(flag) = std::env::var("WRITES_ENABLED") {
            cfg.control.writes_enabled = parse_bool(&flag)
                .ok_or_else(|| anyhow::anyhow!("invalid WRITES_ENABLED '{}'", flag))?;
        } else if let Ok(app_env) = std::env::var("APP_ENV") {
            cfg.control.writes_enabled = app_env == "development";
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        anyhow::ensure!(!self.modbus.host.is_empty(), "modbus.host must not be empty");
        anyhow::ensure!(self.modbus.timeout_s > 0, "modbus.timeout_s must be > 0");
        anyhow::ensure!(
            self.worker.collection_interval_s > 0
                && self.worker.schedule_check_interval_s > 0
                && self.worker.supervisor_check_interval_s > 0,
            "worker intervals must be > 0"
        );
        Ok(())
    }

    pub fn modbus_timeout(&self) -> Duration {
        Duration::from_secs(self.modbus.timeout_s)
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            collection_interval: Duration::from_secs(self.worker.collection_interval_s),
            schedule_check_interval: Duration::from_secs(self.worker.schedule_check_interval_s),
            supervisor_check_interval: Duration::from_secs(
                self.worker.supervisor_check_interval_s,
            ),
            fallback: Setpoints {
                grid_feed_w: self.defaults.grid_feed_w,
                battery_level_percent: self.defaults.battery_level_percent,
                charge_battery_value: self.defaults.charge_battery_value,
            },
            writes_enabled: self.control.writes_enabled,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Expand $(VAR) and ${VAR} placeholders using environment variables.
/// "$$" becomes a literal "$".
fn expand_env_placeholders(input: &str) -> Result<String, anyhow::Error> {
    use anyhow::Context;

    let mut out = String::with_capacity(input.len());
    let mut it = input.chars().peekable();

    while let Some(c) = it.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let close = match it.peek().copied() {
            Some('$') => {
                it.next();
                out.push('$');
                continue;
            }
            Some('(') => ')',
            Some('{') => '}',
            _ => {
                out.push('$');
                continue;
            }
        };
        it.next();
        let var = read_until(&mut it, close)
            .with_context(|| format!("unterminated env placeholder: missing '{}'", close))?;
        let val = std::env::var(&var)
            .with_context(|| format!("missing environment variable: {}", var))?;
        out.push_str(&val);
    }

    Ok(out)
}

/// Read characters until we hit `end`, consuming the closing delimiter.
fn read_until<I>(it: &mut std::iter::Peekable<I>, end: char) -> Option<String>
where
    I: Iterator<Item = char>,
{
    let mut buf = String::new();
    for ch in it.by_ref() {
        if ch == end {
            return Some(buf);
        }
        buf.push(ch);
    }
    None
}
