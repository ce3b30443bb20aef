use crate::error::CoreError;
use crate::supervisor::options::StartOptions;

use models::CoreMode;
use models::ipc::IpcCoreStatus;

use std::time::Duration;

use async_trait::async_trait;

/// What one side knows about the core it owns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreProbe {
    pub running: bool,
    pub pid: Option<u32>,
    pub version: Option<String>,
    pub uptime: Option<Duration>,
    pub message: Option<String>,
    pub tun_enabled: bool,
}

impl CoreProbe {
    pub fn stopped() -> Self {
        Self::default()
    }
}

impl From<IpcCoreStatus> for CoreProbe {
    fn from(status: IpcCoreStatus) -> Self {
        Self {
            running: status.running,
            pid: status.pid,
            version: status.version,
            uptime: status.uptime_secs.map(Duration::from_secs),
            message: status.last_error,
            tun_enabled: status.tun_enabled,
        }
    }
}

/// One way of running the core: as our own subprocess or inside the daemon.
#[async_trait]
pub trait CoreBackend: Send + Sync {
    fn mode(&self) -> CoreMode;

    /// Launch and wait until the controller answers.
    async fn start(&self, options: &StartOptions) -> Result<CoreProbe, CoreError>;

    /// Graceful stop with a bounded wait, then forced.
    async fn stop(&self) -> Result<(), CoreError>;

    /// Cheap liveness check for status refreshes and health polling.
    async fn probe(&self) -> Result<CoreProbe, CoreError>;

    /// Take over a core that is already running for `options`, if any.
    async fn adopt(&self, options: &StartOptions) -> Result<Option<CoreProbe>, CoreError>;

    /// `dns_servers` replace the system resolvers while TUN is on.
    async fn set_tun(&self, enabled: bool, dns_servers: &[String]) -> Result<(), CoreError>;
}
