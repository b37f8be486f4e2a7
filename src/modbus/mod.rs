//! Modbus/TCP access to the gateway in front of the inverter fleet.
//!
//! Every caller in the process goes through one [`ModbusIo`] implementation;
//! [`ModbusTransport`] is the production one and keeps a single TCP session.

pub mod codec;
pub mod registers;
pub mod transport;

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

pub use codec::{decode_signed_16, decode_signed_32, encode_signed_16, encode_signed_32};
pub use registers::RegisterMap;
pub use transport::ModbusTransport;

#[derive(Debug, Error)]
pub enum ModbusError {
    #[error("connect to {addr} failed: {reason}")]
    Connect { addr: String, reason: String },
    #[error("{op} timed out")]
    Timeout { op: &'static str },
    #[error("{op} transport failure: {reason}")]
    Transport { op: &'static str, reason: String },
    #[error("{op} rejected by slave {slave}: {code}")]
    Exception {
        op: &'static str,
        slave: u8,
        code: String,
    },
    #[error("{op} returned {got} registers, expected {expected}")]
    ShortResponse {
        op: &'static str,
        expected: usize,
        got: usize,
    },
}

impl ModbusError {
    /// True when the failure left the TCP session unusable.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ModbusError::Connect { .. } | ModbusError::Timeout { .. } | ModbusError::Transport { .. }
        )
    }
}

/// Register-level operations against the gateway. Implementations serialize
/// callers so that one logical operation completes before the next begins.
#[async_trait]
pub trait ModbusIo: Send + Sync {
    async fn read_input_registers(
        &self,
        start: u16,
        count: u16,
        slave: u8,
    ) -> Result<Vec<u16>, ModbusError>;

    async fn read_holding_registers(
        &self,
        address: u16,
        count: u16,
        slave: u8,
    ) -> Result<Vec<u16>, ModbusError>;

    async fn write_register(&self, address: u16, value: u16, slave: u8) -> Result<(), ModbusError>;

    async fn is_connected(&self) -> bool;
}

/// Process-wide Modbus error counter, exposed for health reporting.
#[derive(Debug, Default)]
pub struct ModbusHealth {
    errors: AtomicU64,
}

impl ModbusHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_error(&self) -> u64 {
        self.errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// Checks that a read returned at least `expected` registers.
pub fn ensure_len(
    op: &'static str,
    regs: &[u16],
    expected: usize,
) -> Result<(), ModbusError> {
    if regs.len() < expected {
        return Err(ModbusError::ShortResponse {
            op,
            expected,
            got: regs.len(),
        });
    }
    Ok(())
}
