use crate::SERVICE_VERSION;
use crate::config::ConfigStore;
use crate::error::CoreError;
use crate::error::ipc::IpcError;
use crate::error::privilege::PrivilegeError;
use crate::events::EventSink;
use crate::ipc::IpcClient;
use crate::privilege::PrivilegedHelper;
use crate::supervisor::Supervisor;

use common::ErrorLocation;
use models::{CoreEvent, CoreMode, CoreStatus, PrivilegeState};

use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

use backoff::{ExponentialBackoff, backoff::Backoff};
use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use tokio::time::sleep as TokioSleep;

const HANDSHAKE_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);
const HANDSHAKE_RETRY_INTERVAL: Duration = Duration::from_millis(250);

/// Owns the user/service policy.
///
/// The desired mode is the persisted preference in the config. The active mode
/// is whatever the supervisor currently drives. Every mutation here leaves the
/// two in agreement or fails without touching either.
pub struct ModeManager {
    ops: Mutex<()>,
    helper: Arc<dyn PrivilegedHelper>,
    supervisor: Arc<Supervisor>,
    config: ConfigStore,
    events: Arc<dyn EventSink>,
    ipc: IpcClient,
}

impl ModeManager {
    pub fn new(
        helper: Arc<dyn PrivilegedHelper>,
        supervisor: Arc<Supervisor>,
        events: Arc<dyn EventSink>,
        ipc: IpcClient,
    ) -> Self {
        Self {
            ops: Mutex::new(()),
            helper,
            config: supervisor.config().clone(),
            supervisor,
            events,
            ipc,
        }
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    // ============================================
    // QUERIES
    // ============================================

    pub async fn get_mode(&self) -> CoreMode {
        self.supervisor.active_mode().await
    }

    pub async fn get_desired_mode(&self) -> CoreMode {
        self.config.get().await.mode.preferred
    }

    pub async fn helper_status(&self) -> Result<PrivilegeState, CoreError> {
        Ok(self.helper.state().await?)
    }

    // ============================================
    // HELPER
    // ============================================

    /// Install the daemon and confirm it answers. A failed handshake removes
    /// the installation again.
    pub async fn install_helper(&self) -> Result<PrivilegeState, CoreError> {
        let _guard = self.ops.lock().await;
        self.install_locked().await
    }

    async fn install_locked(&self) -> Result<PrivilegeState, CoreError> {
        self.helper.install().await?;

        if let Err(e) = self.handshake().await {
            error!("Helper handshake failed, rolling back: {e}");
            if let Err(rollback) = self.helper.uninstall().await {
                warn!("Rollback of helper installation failed: {rollback}");
            }
            return Err(e.into());
        }

        info!("Privileged helper installed and answering");
        Ok(self.helper.state().await?)
    }

    /// `Ping` then `GetVersion`, retried until the handshake window closes.
    async fn handshake(&self) -> Result<(), PrivilegeError> {
        let window = Duration::from_millis(self.config.get().await.service.handshake_timeout_ms);
        let client = self.ipc.with_timeout(HANDSHAKE_ATTEMPT_TIMEOUT);
        let mut backoff = ExponentialBackoff {
            initial_interval: HANDSHAKE_RETRY_INTERVAL,
            max_interval: HANDSHAKE_RETRY_INTERVAL * 4,
            max_elapsed_time: Some(window),
            ..Default::default()
        };

        loop {
            match Self::exchange_versions(&client).await {
                Ok(version) if version == SERVICE_VERSION => {
                    debug!("Helper handshake ok ({version})");
                    return Ok(());
                }
                Ok(version) => {
                    return Err(PrivilegeError::Handshake {
                        message: format!(
                            "Helper reports version {version}, expected {SERVICE_VERSION}"
                        ),
                        location: ErrorLocation::from(Location::caller()),
                    });
                }
                Err(e) => match backoff.next_backoff() {
                    Some(delay) => {
                        debug!("Helper not answering yet: {e}");
                        TokioSleep(delay).await;
                    }
                    None => {
                        return Err(PrivilegeError::Handshake {
                            message: format!("Helper did not answer within {window:?}: {e}"),
                            location: ErrorLocation::from(Location::caller()),
                        });
                    }
                },
            }
        }
    }

    async fn exchange_versions(client: &IpcClient) -> Result<String, IpcError> {
        client.ping().await?;
        client.version().await
    }

    /// Stop whatever the daemon runs, fall back to user mode and remove the helper.
    pub async fn uninstall_helper(&self) -> Result<PrivilegeState, CoreError> {
        let _guard = self.ops.lock().await;

        if self.supervisor.active_mode().await == CoreMode::Service {
            self.set_mode_locked(CoreMode::User).await?;
        }

        self.helper.uninstall().await?;
        info!("Privileged helper removed");
        Ok(self.helper.state().await?)
    }

    // ============================================
    // MODE
    // ============================================

    /// Switch the execution mode. Service installs the helper first when it
    /// is missing. The core is stopped on the side that was active; starting
    /// it again is up to the caller.
    pub async fn set_mode(&self, mode: CoreMode) -> Result<CoreStatus, CoreError> {
        let _guard = self.ops.lock().await;
        self.set_mode_locked(mode).await
    }

    async fn set_mode_locked(&self, mode: CoreMode) -> Result<CoreStatus, CoreError> {
        if mode == CoreMode::Service && !self.helper.state().await?.is_ready() {
            info!("Service mode requested, installing helper");
            self.install_locked().await?;
        }

        let status = self.supervisor.switch_mode(mode).await?;

        self.config
            .update(move |c| {
                c.mode.preferred = mode;
                if mode == CoreMode::User {
                    c.mode.tun_enabled = false;
                }
            })
            .await?;

        self.events.emit(CoreEvent::CoreModeChanged { mode });
        info!("Core mode set to {mode}");
        Ok(status)
    }

    /// Toggle TUN. TUN needs service mode now and after a relaunch, so
    /// enabling it first switches to service mode when either the active or
    /// the desired mode is User. If that switch fails nothing else is changed.
    pub async fn set_tun_mode(&self, enabled: bool) -> Result<bool, CoreError> {
        let _guard = self.ops.lock().await;

        let user_side = self.supervisor.active_mode().await == CoreMode::User
            || self.get_desired_mode().await == CoreMode::User;
        if enabled && user_side {
            let was_running = self.supervisor.status().await?.running;

            self.set_mode_locked(CoreMode::Service).await?;

            // The TUN preference is applied when the service core comes up.
            self.supervisor.set_tun(true).await?;
            if was_running {
                self.supervisor.start(None).await?;
            }
            return Ok(true);
        }

        self.supervisor.set_tun(enabled).await
    }

    // ============================================
    // HOST INTEGRATION
    // ============================================

    /// App startup: restore the preferred mode, adopt an orphan, auto-start,
    /// then begin health polling. DNS left over by a crash is the daemon's to
    /// restore; it does so before serving.
    pub async fn bootstrap(&self) -> Result<CoreStatus, CoreError> {
        let desired = self.get_desired_mode().await;
        if self.supervisor.active_mode().await != desired {
            self.supervisor.switch_mode(desired).await?;
        }

        let mut status = self.supervisor.reconcile_orphan().await?;

        if !status.running {
            let helper_ready = match self.helper.state().await {
                Ok(state) => state.is_ready(),
                Err(e) => {
                    warn!("Could not read helper state: {e}");
                    false
                }
            };

            if desired == CoreMode::Service && !helper_ready {
                warn!("Service mode preferred but helper is not installed, not auto-starting");
            } else {
                match self.supervisor.start(None).await {
                    Ok(started) => status = started,
                    Err(e) => {
                        error!("Auto-start failed: {e}");
                        status = self.supervisor.status().await?;
                    }
                }
            }
        }

        self.supervisor.start_health_polling().await;
        Ok(status)
    }
}
