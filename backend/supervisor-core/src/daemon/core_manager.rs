//! The daemon's single core subprocess.

use crate::controller::{ControllerClient, parse_external_controller};
use crate::daemon::LogCollector;
use crate::discovery::{
    SpawnOptions, ensure_port_available, forward_output, spawn_core, terminate_child,
    wait_for_api,
};
use crate::error::CoreError;
use crate::error::discovery::DiscoveryError;
use crate::error::spawn::SpawnError;
use crate::error::supervisor::SupervisorError;
use crate::network::{DnsOverride, NetworkConfigurator, SnapshotStore};
use crate::supervisor::RetryPolicy;
use crate::{APP_DIR_NAME, DEFAULT_TUN_DNS};

use common::{ErrorLocation, RedactedSecret};
use models::ipc::{IpcCoreStatus, IpcStartCore};

use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};
use tokio::process::Child as TokioChild;
use tokio::sync::Mutex;
use tokio::task::spawn_blocking;
use tokio::time::sleep as TokioSleep;

const STOP_GRACE: Duration = Duration::from_secs(5);
const RESTART_PAUSE: Duration = Duration::from_millis(500);

/// Where the daemon keeps its state, e.g. the DNS snapshot.
pub fn default_state_dir() -> PathBuf {
    #[cfg(windows)]
    {
        std::env::var_os("ProgramData")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\ProgramData"))
            .join(APP_DIR_NAME)
    }
    #[cfg(not(windows))]
    {
        Path::new("/var/lib").join(APP_DIR_NAME)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSettings {
    pub state_dir: PathBuf,
    /// Resolvers installed while TUN is on.
    pub tun_dns: Vec<String>,
    pub startup_timeout: Duration,
    pub poll_interval: Duration,
    /// Applied to controller calls while switching TUN.
    pub controller_retry: RetryPolicy,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            tun_dns: vec![DEFAULT_TUN_DNS.to_string()],
            startup_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(500),
            controller_retry: RetryPolicy::default(),
        }
    }
}

struct RunningCore {
    child: TokioChild,
    pid: Option<u32>,
    started_at: Instant,
    controller: ControllerClient,
    config_path: PathBuf,
    version: Option<String>,
    tun_enabled: bool,
}

pub struct CoreManager {
    core: Mutex<Option<RunningCore>>,
    last_start: Mutex<Option<IpcStartCore>>,
    last_error: Mutex<Option<String>>,
    logs: LogCollector,
    dns: DnsOverride,
    settings: DaemonSettings,
}

impl CoreManager {
    pub fn new(settings: DaemonSettings, network: Arc<dyn NetworkConfigurator>) -> Self {
        let dns = DnsOverride::new(network, SnapshotStore::new(&settings.state_dir));
        Self {
            core: Mutex::new(None),
            last_start: Mutex::new(None),
            last_error: Mutex::new(None),
            logs: LogCollector::new(),
            dns,
            settings,
        }
    }

    pub fn logs(&self) -> &LogCollector {
        &self.logs
    }

    /// Restore DNS left overridden by a previous daemon run.
    pub async fn recover(&self) {
        self.dns.recover().await;
    }

    async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.lock().await = Some(message.into());
    }

    /// Drop a core that exited on its own, undoing its DNS override.
    async fn reap(&self, slot: &mut Option<RunningCore>) {
        let Some(core) = slot.as_mut() else {
            return;
        };

        let exit = match core.child.try_wait() {
            Ok(Some(status)) => format!("Core exited with {status}"),
            Ok(None) => return,
            Err(e) => format!("Failed to query core process: {e}"),
        };

        warn!("{exit}");
        let tun_enabled = core.tun_enabled;
        *slot = None;
        self.record_error(exit).await;

        if tun_enabled {
            self.restore_dns().await;
        }
    }

    async fn restore_dns(&self) {
        if let Err(e) = self.dns.restore().await {
            warn!("Failed to restore DNS, snapshot kept: {e}");
        }
    }

    fn build_status(&self, core: Option<&RunningCore>, last_error: Option<String>) -> IpcCoreStatus {
        match core {
            Some(core) => IpcCoreStatus {
                running: true,
                pid: core.pid,
                uptime_secs: Some(core.started_at.elapsed().as_secs()),
                config_path: Some(core.config_path.to_string_lossy().into_owned()),
                last_error,
                version: core.version.clone(),
                tun_enabled: core.tun_enabled,
            },
            None => IpcCoreStatus {
                running: false,
                last_error,
                ..Default::default()
            },
        }
    }

    // ============================================
    // LIFECYCLE
    // ============================================

    pub async fn start(&self, request: IpcStartCore) -> Result<IpcCoreStatus, CoreError> {
        let mut slot = self.core.lock().await;
        self.reap(&mut slot).await;

        if let Some(core) = slot.as_ref() {
            return Err(SupervisorError::AlreadyRunning {
                message: format!("Core already running (PID: {:?})", core.pid),
                location: ErrorLocation::from(Location::caller()),
            }
            .into());
        }

        match self.launch(&request).await {
            Ok(core) => {
                info!("Core running (PID: {:?})", core.pid);
                *slot = Some(core);
                *self.last_start.lock().await = Some(request);
                *self.last_error.lock().await = None;
                Ok(self.build_status(slot.as_ref(), None))
            }
            Err(e) => {
                self.record_error(e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn launch(&self, request: &IpcStartCore) -> Result<RunningCore, CoreError> {
        let options = SpawnOptions {
            binary: PathBuf::from(&request.core_path),
            config_path: PathBuf::from(&request.config_path),
            work_dir: PathBuf::from(&request.work_dir),
            external_controller: request.external_controller.clone(),
        };
        options.validate()?;

        let (host, port) = parse_external_controller(&request.external_controller).ok_or_else(
            || SpawnError::Validation {
                message: format!(
                    "Invalid external controller address: {}",
                    request.external_controller
                ),
                location: ErrorLocation::from(Location::caller()),
            },
        )?;

        spawn_blocking(move || ensure_port_available(port))
            .await
            .map_err(|e| DiscoveryError::NetworkQuery {
                message: format!("Port check task failed: {e}"),
                location: ErrorLocation::from(Location::caller()),
                source: Box::new(e),
            })??;

        let secret = RedactedSecret::from_optional(request.secret.as_deref());
        let controller = ControllerClient::new(&host, port, secret)?;

        let mut child = spawn_core(&options)?;
        let pid = child.id();

        let logs = self.logs.clone();
        forward_output(&mut child, move |stream, line| logs.push(stream, &line));

        match wait_for_api(
            &controller,
            self.settings.startup_timeout,
            self.settings.poll_interval,
            Some(&mut child),
        )
        .await
        {
            Ok(version) => Ok(RunningCore {
                child,
                pid,
                started_at: Instant::now(),
                controller,
                config_path: options.config_path,
                version: Some(version),
                tun_enabled: false,
            }),
            Err(e) => {
                warn!("Core failed to come up, killing PID {pid:?}: {e}");
                terminate_child(&mut child, STOP_GRACE).await;
                Err(e.into())
            }
        }
    }

    /// Stop the core and undo its DNS override. Stopping nothing is fine.
    pub async fn stop(&self) -> Result<(), CoreError> {
        let mut slot = self.core.lock().await;

        if let Some(mut core) = slot.take() {
            if core.tun_enabled
                && let Err(e) = core.controller.set_tun(false).await
            {
                warn!("Failed to disable TUN before stop: {e}");
            }

            if terminate_child(&mut core.child, STOP_GRACE).await {
                warn!("Core needed a forced kill");
            }
            info!("Core stopped");
        }

        self.restore_dns().await;
        Ok(())
    }

    pub async fn restart(&self) -> Result<IpcCoreStatus, CoreError> {
        let request = self.last_start.lock().await.clone().ok_or_else(|| {
            SupervisorError::NotRunning {
                message: "Nothing to restart: the core was never started".to_string(),
                location: ErrorLocation::from(Location::caller()),
            }
        })?;

        self.stop().await?;
        TokioSleep(RESTART_PAUSE).await;
        self.start(request).await
    }

    pub async fn status(&self) -> IpcCoreStatus {
        let mut slot = self.core.lock().await;
        self.reap(&mut slot).await;
        let last_error = self.last_error.lock().await.clone();
        self.build_status(slot.as_ref(), last_error)
    }

    pub async fn is_running(&self) -> bool {
        let mut slot = self.core.lock().await;
        self.reap(&mut slot).await;
        slot.is_some()
    }

    #[track_caller]
    fn not_running() -> CoreError {
        SupervisorError::NotRunning {
            message: "Core is not running".to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
        .into()
    }

    pub async fn reload_config(&self, path: &Path) -> Result<(), CoreError> {
        let mut slot = self.core.lock().await;
        self.reap(&mut slot).await;
        let core = slot.as_mut().ok_or_else(Self::not_running)?;

        core.controller.reload_config(path).await?;
        core.config_path = path.to_path_buf();
        Ok(())
    }

    /// TUN on: snapshot DNS, point it at `dns_servers` (or the configured TUN
    /// resolvers when empty), enable TUN in the core. TUN off: disable it and
    /// restore the snapshot exactly.
    pub async fn set_tun_mode(&self, enabled: bool, dns_servers: &[String]) -> Result<(), CoreError> {
        let mut slot = self.core.lock().await;
        self.reap(&mut slot).await;
        let core = slot.as_mut().ok_or_else(Self::not_running)?;

        if enabled {
            let servers = if dns_servers.is_empty() {
                self.settings.tun_dns.as_slice()
            } else {
                dns_servers
            };
            self.dns.apply(servers).await?;
            let controller = &core.controller;
            let switched = self
                .settings
                .controller_retry
                .run("set_tun", || async {
                    controller.set_tun(true).await.map_err(CoreError::from)
                })
                .await;
            if let Err(e) = switched {
                self.restore_dns().await;
                return Err(e);
            }
        } else {
            if let Err(e) = core.controller.set_tun(false).await {
                warn!("Core refused to disable TUN: {e}");
            }
            self.dns.restore().await?;
        }

        core.tun_enabled = enabled;
        info!("TUN enabled={enabled}");
        Ok(())
    }

    /// Daemon exit: stop the core and leave no DNS override behind.
    pub async fn shutdown(&self) {
        if let Err(e) = self.stop().await {
            warn!("Failed to stop core during shutdown: {e}");
        }
    }
}
