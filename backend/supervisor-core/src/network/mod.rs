//! OS network side effects around the core: system proxy and DNS override.
//!
//! Each platform implements [`NetworkConfigurator`] by driving its native
//! tools through a [`CommandRunner`]. [`DnsOverride`] layers the snapshot
//! discipline on top: the previous DNS state is written to disk before any
//! change and the file is removed only once that state has been restored.

pub mod linux;
pub mod macos;
pub mod snapshot;
pub mod windows;

pub use snapshot::{DnsSnapshot, NetworkOverrideSnapshot, SnapshotStore};

use crate::command::{CommandOutput, CommandRunner};
use crate::error::network::NetworkError;

use common::ErrorLocation;

use std::panic::Location;
use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use serde::Serialize;

/// Proxy endpoint pushed into the OS settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub host: String,
    pub port: u16,
    pub bypass: Vec<String>,
}

/// System proxy as the OS currently reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProxyStatus {
    pub enabled: bool,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// DNS servers of one network service/interface. Empty means DHCP-provided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsState {
    pub scope: String,
    pub servers: Vec<String>,
}

#[async_trait]
pub trait NetworkConfigurator: Send + Sync {
    /// Point the OS proxy at `settings`, or switch it off. Idempotent.
    async fn set_system_proxy(&self, settings: &ProxySettings, enabled: bool)
    -> Result<(), NetworkError>;

    /// Read the OS proxy state regardless of whether the core is running.
    async fn get_system_proxy_status(&self) -> Result<ProxyStatus, NetworkError>;

    /// DNS configuration of the primary network service.
    async fn current_dns(&self) -> Result<DnsState, NetworkError>;

    async fn set_dns(&self, scope: &str, servers: &[String]) -> Result<(), NetworkError>;

    /// Drop static servers and fall back to DHCP.
    async fn reset_dns(&self, scope: &str) -> Result<(), NetworkError>;
}

/// Configurator for the platform this binary was built for.
pub fn platform_configurator(runner: Arc<dyn CommandRunner>) -> Arc<dyn NetworkConfigurator> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(macos::MacosNetwork::new(runner))
    }
    #[cfg(target_os = "windows")]
    {
        Arc::new(windows::WindowsNetwork::new(runner))
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Arc::new(linux::LinuxNetwork::new(runner))
    }
}

/// Run a command and fail on a non-zero exit.
pub(crate) async fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: Vec<String>,
) -> Result<CommandOutput, NetworkError> {
    let output = runner
        .run(program, &args)
        .await
        .map_err(|e| NetworkError::Command {
            program: program.to_string(),
            message: e.to_string(),
            status: None,
            location: ErrorLocation::from(Location::caller()),
        })?;

    if !output.success() {
        return Err(NetworkError::Command {
            program: program.to_string(),
            message: format!("{} failed: {}", args.join(" "), output.diagnostic()),
            status: output.status,
            location: ErrorLocation::from(Location::caller()),
        });
    }

    Ok(output)
}

/// DNS override with an on-disk record of what it replaced.
#[derive(Clone)]
pub struct DnsOverride {
    configurator: Arc<dyn NetworkConfigurator>,
    snapshots: SnapshotStore,
}

impl DnsOverride {
    pub fn new(configurator: Arc<dyn NetworkConfigurator>, snapshots: SnapshotStore) -> Self {
        Self {
            configurator,
            snapshots,
        }
    }

    /// True while a restoration is owed.
    pub fn is_active(&self) -> bool {
        self.snapshots.is_owed()
    }

    /// Capture the current DNS state (unless a snapshot is already owed) and
    /// point the primary service at `servers`.
    pub async fn apply(&self, servers: &[String]) -> Result<(), NetworkError> {
        let scope = match self.snapshots.load()? {
            Some(owed) => {
                info!("DNS snapshot already owed for {}, keeping it", owed.scope);
                owed.scope
            }
            None => {
                let current = self.configurator.current_dns().await?;
                let snapshot = NetworkOverrideSnapshot::capture(&current);
                self.snapshots.save(&snapshot)?;
                info!(
                    "Captured DNS snapshot for {}: {:?}",
                    snapshot.scope, snapshot.dns
                );
                current.scope
            }
        };

        self.configurator.set_dns(&scope, servers).await?;
        info!("DNS for {scope} overridden with {servers:?}");
        Ok(())
    }

    /// Put back exactly what the snapshot recorded, or DHCP when it recorded
    /// nothing. Returns `false` when no restoration was owed.
    pub async fn restore(&self) -> Result<bool, NetworkError> {
        let Some(snapshot) = self.snapshots.load()? else {
            return Ok(false);
        };

        match &snapshot.dns {
            DnsSnapshot::Empty => self.configurator.reset_dns(&snapshot.scope).await?,
            DnsSnapshot::Servers(servers) => {
                self.configurator
                    .set_dns(&snapshot.scope, servers)
                    .await?
            }
        }

        self.snapshots.clear()?;
        info!("DNS for {} restored to {:?}", snapshot.scope, snapshot.dns);
        Ok(true)
    }

    /// Crash recovery at startup: restore a snapshot left by a previous run.
    pub async fn recover(&self) {
        if !self.is_active() {
            return;
        }

        warn!("Found DNS snapshot from a previous run, restoring");
        if let Err(e) = self.restore().await {
            warn!("DNS recovery failed, snapshot kept for next attempt: {e}");
        }
    }
}
