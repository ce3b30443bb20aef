//! User mode: the core is a direct child of this process.

use crate::discovery::{
    CoreLogFile, ensure_port_available, find_listener, forward_output, is_core_process,
    is_process_alive, spawn_core, stop_pid, terminate_child, wait_for_api,
};
use crate::error::CoreError;
use crate::error::discovery::DiscoveryError;
use crate::error::supervisor::SupervisorError;
use crate::supervisor::backend::{CoreBackend, CoreProbe};
use crate::supervisor::options::StartOptions;

use common::ErrorLocation;
use models::{CoreMode, OrphanCandidate};

use std::panic::Location;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{info, trace, warn};
use tokio::process::Child as TokioChild;
use tokio::sync::Mutex;
use tokio::task::{JoinError, spawn_blocking};

const STOP_GRACE: Duration = Duration::from_secs(5);

enum Handle {
    Child(TokioChild),
    /// A core left behind by an earlier run. We only know its PID.
    Adopted,
}

struct UserCore {
    handle: Handle,
    pid: Option<u32>,
    port: u16,
    version: Option<String>,
    started_at: Instant,
}

impl UserCore {
    fn probe(&self) -> CoreProbe {
        CoreProbe {
            running: true,
            pid: self.pid,
            version: self.version.clone(),
            uptime: Some(self.started_at.elapsed()),
            message: None,
            tun_enabled: false,
        }
    }
}

#[track_caller]
fn join_failed(e: JoinError) -> CoreError {
    DiscoveryError::NetworkQuery {
        message: format!("Discovery task failed: {e}"),
        location: ErrorLocation::from(Location::caller()),
        source: Box::new(e),
    }
    .into()
}

pub struct UserBackend {
    core: Mutex<Option<UserCore>>,
    log_file: Arc<CoreLogFile>,
}

impl UserBackend {
    /// `log_dir` receives the daily `core_YYYYMMDD.log` files.
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            core: Mutex::new(None),
            log_file: Arc::new(CoreLogFile::new(log_dir)),
        }
    }
}

#[async_trait]
impl CoreBackend for UserBackend {
    fn mode(&self) -> CoreMode {
        CoreMode::User
    }

    async fn start(&self, options: &StartOptions) -> Result<CoreProbe, CoreError> {
        let mut slot = self.core.lock().await;
        if let Some(core) = slot.as_ref() {
            return Err(SupervisorError::AlreadyRunning {
                message: format!("Core already running (PID: {:?})", core.pid),
                location: ErrorLocation::from(Location::caller()),
            }
            .into());
        }

        let spawn_options = options.spawn_options();
        spawn_options.validate()?;

        let port = options.api_port;
        spawn_blocking(move || ensure_port_available(port))
            .await
            .map_err(join_failed)??;

        let controller = options.controller()?;
        let mut child = spawn_core(&spawn_options)?;
        let pid = child.id();

        let log_file = Arc::clone(&self.log_file);
        forward_output(&mut child, move |stream, line| {
            trace!("core {}: {line}", stream.as_str());
            log_file.append(stream, &line);
        });

        match wait_for_api(
            &controller,
            options.startup_timeout,
            options.poll_interval,
            Some(&mut child),
        )
        .await
        {
            Ok(version) => {
                let core = UserCore {
                    handle: Handle::Child(child),
                    pid,
                    port,
                    version: Some(version),
                    started_at: Instant::now(),
                };
                let probe = core.probe();
                *slot = Some(core);
                Ok(probe)
            }
            Err(e) => {
                warn!("Core failed to come up, killing PID {pid:?}: {e}");
                terminate_child(&mut child, STOP_GRACE).await;
                Err(e.into())
            }
        }
    }

    async fn stop(&self) -> Result<(), CoreError> {
        let mut slot = self.core.lock().await;
        let Some(mut core) = slot.take() else {
            return Ok(());
        };

        if let Handle::Child(child) = &mut core.handle {
            if terminate_child(child, STOP_GRACE).await {
                warn!("Core needed a forced kill");
            }
            return Ok(());
        }

        let Some(pid) = core.pid else {
            return Ok(());
        };

        if spawn_blocking(move || stop_pid(pid))
            .await
            .map_err(join_failed)?
        {
            info!("Adopted core (PID: {pid}) stopped");
            return Ok(());
        }

        let candidate = OrphanCandidate::new(core.port, pid);
        *slot = Some(core);
        Err(DiscoveryError::Orphan {
            message: format!("Adopted core could not be stopped: {candidate}"),
            candidate,
            location: ErrorLocation::from(Location::caller()),
        }
        .into())
    }

    async fn probe(&self) -> Result<CoreProbe, CoreError> {
        let mut slot = self.core.lock().await;
        let Some(core) = slot.as_mut() else {
            return Ok(CoreProbe::stopped());
        };

        let exit = match &mut core.handle {
            Handle::Child(child) => match child.try_wait() {
                Ok(Some(status)) => Some(format!("Core exited with {status}")),
                Ok(None) => None,
                Err(e) => Some(format!("Failed to query core process: {e}")),
            },
            Handle::Adopted => core
                .pid
                .filter(|pid| !is_process_alive(*pid))
                .map(|pid| format!("Adopted core (PID: {pid}) is gone")),
        };

        match exit {
            None => Ok(core.probe()),
            Some(message) => {
                warn!("{message}");
                *slot = None;
                Ok(CoreProbe {
                    message: Some(message),
                    ..CoreProbe::stopped()
                })
            }
        }
    }

    async fn adopt(&self, options: &StartOptions) -> Result<Option<CoreProbe>, CoreError> {
        let mut slot = self.core.lock().await;
        if let Some(core) = slot.as_ref() {
            return Ok(Some(core.probe()));
        }

        let port = options.api_port;
        let Some(candidate) = spawn_blocking(move || find_listener(port))
            .await
            .map_err(join_failed)??
        else {
            return Ok(None);
        };

        if !is_core_process(candidate.pid) {
            warn!("Control port is held by a foreign process: {candidate}");
            return Ok(None);
        }

        let version = match options.controller()?.version().await {
            Ok(version) => version,
            Err(e) => {
                warn!("Orphaned core {candidate} does not answer its controller: {e}");
                return Ok(None);
            }
        };

        info!("Adopting orphaned core {candidate} ({version})");
        let core = UserCore {
            handle: Handle::Adopted,
            pid: Some(candidate.pid),
            port,
            version: Some(version),
            started_at: Instant::now(),
        };
        let probe = core.probe();
        *slot = Some(core);
        Ok(Some(probe))
    }

    async fn set_tun(&self, _enabled: bool, _dns_servers: &[String]) -> Result<(), CoreError> {
        Err(SupervisorError::RequiresService {
            message: "TUN needs the privileged service".to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
        .into())
    }
}
