pub mod clock;
pub mod collector;
pub mod config;
pub mod db;
pub mod error;
pub mod modbus;
pub mod models;
pub mod repositories;
pub mod schedule;
pub mod sink;
pub mod supervisor;
pub mod worker;

pub use config::Config;
pub use error::{AppError, Result};
