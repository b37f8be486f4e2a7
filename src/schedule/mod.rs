//! Schedule enforcement: pick the window in force for an object and keep the
//! inverter setpoints in line with it.

pub mod engine;
pub mod setpoints;
pub mod window;

pub use engine::{ScheduleEngine, TickOutcome, WindowState};
pub use setpoints::{SetpointWords, Setpoints};
pub use window::{contains, select_active};
