use super::{ModbusError, ModbusHealth, ModbusIo};
use async_trait::async_trait;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_modbus::client::{tcp, Context};
use tokio_modbus::prelude::*;
use tracing::{debug, info, warn};

/// Single shared Modbus/TCP session.
///
/// The context is moved out of the mutex while a request is in flight and put
/// back only when the request finished cleanly. A request that times out,
/// fails at the I/O level, or is dropped mid-flight by cancellation therefore
/// takes its socket with it, and the next caller connects afresh.
pub struct ModbusTransport {
    host: String,
    port: u16,
    timeout: Duration,
    session: Mutex<Option<Context>>,
    connected: AtomicBool,
    health: Arc<ModbusHealth>,
}

impl std::fmt::Debug for ModbusTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusTransport")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish()
    }
}

impl ModbusTransport {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration, health: Arc<ModbusHealth>) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            session: Mutex::new(None),
            connected: AtomicBool::new(false),
            health,
        }
    }

    pub fn health(&self) -> Arc<ModbusHealth> {
        self.health.clone()
    }

    /// Establish the session up front. Failure is not fatal: every operation
    /// reconnects on demand.
    pub async fn connect(&self) -> Result<(), ModbusError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(());
        }
        match self.open().await {
            Ok(ctx) => {
                *session = Some(ctx);
                self.connected.store(true, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn addr_label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn resolve(&self) -> Result<SocketAddr, ModbusError> {
        let mut addrs = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| ModbusError::Connect {
                addr: self.addr_label(),
                reason: e.to_string(),
            })?;
        addrs.next().ok_or_else(|| ModbusError::Connect {
            addr: self.addr_label(),
            reason: "no address resolved".into(),
        })
    }

    /// Resolve and connect, both bounded by the request timeout.
    async fn open(&self) -> Result<Context, ModbusError> {
        let dial = async {
            let addr = self.resolve().await?;
            debug!(%addr, "connecting to modbus gateway");
            let ctx = tcp::connect(addr).await.map_err(|e| ModbusError::Connect {
                addr: self.addr_label(),
                reason: e.to_string(),
            })?;
            Ok::<_, ModbusError>((addr, ctx))
        };
        match timeout(self.timeout, dial).await {
            Ok(Ok((addr, ctx))) => {
                info!(%addr, "modbus session established");
                Ok(ctx)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ModbusError::Connect {
                addr: self.addr_label(),
                reason: format!("no answer within {:?}", self.timeout),
            }),
        }
    }

    fn fail(&self, err: ModbusError) -> ModbusError {
        let count = self.health.record_error();
        warn!(error = %err, error_count = count, "modbus error");
        err
    }

    async fn execute<T, F, Fut>(&self, op: &'static str, slave: u8, request: F) -> Result<T, ModbusError>
    where
        F: FnOnce(Context) -> Fut + Send,
        Fut: Future<Output = (Context, tokio_modbus::Result<T>)> + Send,
        T: Send,
    {
        let mut session = self.session.lock().await;
        let mut ctx = match session.take() {
            Some(ctx) => ctx,
            None => self.open().await.map_err(|e| self.fail(e))?,
        };
        let lease = Lease {
            connected: &self.connected,
            returned: false,
        };
        ctx.set_slave(Slave(slave));

        match timeout(self.timeout, request(ctx)).await {
            Err(_) => Err(self.fail(ModbusError::Timeout { op })),
            Ok((_broken, Err(e))) => Err(self.fail(ModbusError::Transport {
                op,
                reason: e.to_string(),
            })),
            Ok((ctx, Ok(Err(code)))) => {
                *session = Some(ctx);
                lease.hand_back();
                Err(self.fail(ModbusError::Exception {
                    op,
                    slave,
                    code: format!("{:?}", code),
                }))
            }
            Ok((ctx, Ok(Ok(value)))) => {
                *session = Some(ctx);
                lease.hand_back();
                Ok(value)
            }
        }
    }
}

/// A context checked out of the session. Unless it is handed back, dropping
/// the lease (error, timeout or a cancelled caller) marks the session gone.
struct Lease<'a> {
    connected: &'a AtomicBool,
    returned: bool,
}

impl Lease<'_> {
    fn hand_back(mut self) {
        self.returned = true;
        self.connected.store(true, Ordering::Relaxed);
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        if !self.returned {
            self.connected.store(false, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl ModbusIo for ModbusTransport {
    async fn read_input_registers(
        &self,
        start: u16,
        count: u16,
        slave: u8,
    ) -> Result<Vec<u16>, ModbusError> {
        self.execute("read_input_registers", slave, move |mut ctx| async move {
            let res = ctx.read_input_registers(start, count).await;
            (ctx, res)
        })
        .await
    }

    async fn read_holding_registers(
        &self,
        address: u16,
        count: u16,
        slave: u8,
    ) -> Result<Vec<u16>, ModbusError> {
        self.execute("read_holding_registers", slave, move |mut ctx| async move {
            let res = ctx.read_holding_registers(address, count).await;
            (ctx, res)
        })
        .await
    }

    async fn write_register(&self, address: u16, value: u16, slave: u8) -> Result<(), ModbusError> {
        self.execute("write_register", slave, move |mut ctx| async move {
            let res = ctx.write_single_register(address, value).await;
            (ctx, res)
        })
        .await
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}
