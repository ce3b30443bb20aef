//! Service mode: the daemon owns the core, we talk to it over IPC.

use crate::error::CoreError;
use crate::error::ipc::IpcError;
use crate::ipc::IpcClient;
use crate::supervisor::backend::{CoreBackend, CoreProbe};
use crate::supervisor::options::StartOptions;

use common::ErrorLocation;
use models::CoreMode;

use std::panic::Location;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};

/// Daemon-side stop budget: SIGTERM grace plus the forced kill.
const STOP_WINDOW: Duration = Duration::from_secs(6);

pub struct ServiceBackend {
    ipc: IpcClient,
    stop_window: Duration,
}

impl ServiceBackend {
    pub fn new(ipc: IpcClient) -> Self {
        Self {
            ipc,
            stop_window: STOP_WINDOW,
        }
    }

    /// How long the daemon may take to stop the core, on top of the IPC deadline.
    pub fn with_stop_window(mut self, stop_window: Duration) -> Self {
        self.stop_window = stop_window;
        self
    }

    /// A timed out mutation is inconclusive; ask the daemon what happened.
    async fn reverify(&self, error: IpcError) -> Result<CoreProbe, CoreError> {
        warn!("{error}; re-querying daemon status");
        match self.probe().await {
            Ok(probe) => Ok(probe),
            Err(_) => Err(error.into()),
        }
    }
}

#[async_trait]
impl CoreBackend for ServiceBackend {
    fn mode(&self) -> CoreMode {
        CoreMode::Service
    }

    async fn start(&self, options: &StartOptions) -> Result<CoreProbe, CoreError> {
        // The daemon waits for the controller itself.
        let client = self
            .ipc
            .with_timeout(options.startup_timeout + self.ipc.timeout());

        match client.start_core(options.to_ipc()).await {
            Ok(status) => {
                info!("Daemon started core (PID: {:?})", status.pid);
                Ok(CoreProbe::from(status))
            }
            Err(e @ IpcError::Timeout { .. }) => {
                let probe = self.reverify(e).await?;
                if probe.running {
                    Ok(probe)
                } else {
                    Err(IpcError::Timeout {
                        message: "Daemon did not confirm the core start".to_string(),
                        method: "start_core",
                        location: ErrorLocation::from(Location::caller()),
                    }
                    .into())
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn stop(&self) -> Result<(), CoreError> {
        let client = self.ipc.with_timeout(self.stop_window + self.ipc.timeout());

        match client.stop_core().await {
            Ok(()) => Ok(()),
            Err(e @ IpcError::Timeout { .. }) => {
                let probe = self.reverify(e).await?;
                if probe.running {
                    return Err(IpcError::Timeout {
                        message: format!(
                            "Daemon still reports the core running (PID: {:?}) after stop",
                            probe.pid
                        ),
                        method: "stop_core",
                        location: ErrorLocation::from(Location::caller()),
                    }
                    .into());
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn probe(&self) -> Result<CoreProbe, CoreError> {
        Ok(CoreProbe::from(self.ipc.status().await?))
    }

    async fn adopt(&self, _options: &StartOptions) -> Result<Option<CoreProbe>, CoreError> {
        match self.ipc.status().await {
            Ok(status) if status.running => {
                info!("Daemon already runs a core (PID: {:?})", status.pid);
                Ok(Some(CoreProbe::from(status)))
            }
            Ok(_) => Ok(None),
            Err(e) => {
                debug!("Daemon not reachable for adoption: {e}");
                Ok(None)
            }
        }
    }

    async fn set_tun(&self, enabled: bool, dns_servers: &[String]) -> Result<(), CoreError> {
        Ok(self.ipc.set_tun_mode(enabled, dns_servers).await?)
    }
}
