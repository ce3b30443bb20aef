//! Mode-agnostic lifecycle controller for the core.
//!
//! # Architecture
//!
//! - Lifecycle mutations (`start`, `stop`, `restart`, mode switch, TUN) are
//!   serialized behind one async mutex. A request that finds the target state
//!   already reached returns the current status.
//! - The status itself lives in [`StatusStore`], an actor that only accepts
//!   legal [`CoreState`] transitions. Reads never wait on a running operation.
//! - Where the core actually runs is a [`CoreBackend`]: [`UserBackend`] spawns
//!   it directly, [`ServiceBackend`] delegates to the daemon over IPC.
//! - Health polling uses `try_lock`, so a poll never queues behind a slow
//!   start and never blocks the UI.

pub mod backend;
pub mod health;
pub mod options;
pub mod retry;
pub mod service;
pub mod state;
pub mod user;

pub use backend::{CoreBackend, CoreProbe};
pub use health::HealthPoller;
pub use options::StartOptions;
pub use retry::RetryPolicy;
pub use service::ServiceBackend;
pub use state::{Endpoint, StatusChange, StatusStore};
pub use user::UserBackend;

use crate::config::ConfigStore;
use crate::controller::ControllerClient;
use crate::error::supervisor::SupervisorError;
use crate::error::{CoreError, ErrorKind};
use crate::events::EventSink;
use crate::ipc::IpcClient;
use crate::network::{NetworkConfigurator, ProxySettings, ProxyStatus};

use common::ErrorLocation;
use models::ipc::IpcLogEntry;
use models::{CoreEvent, CoreMode, CoreState, CoreStatus, RoutingMode};

use std::panic::Location;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use tokio::sync::Mutex;
use tokio::time::{sleep as TokioSleep, timeout};

const RESTART_PAUSE: Duration = Duration::from_millis(500);

/// Both ways of running the core. The active one is picked by the current mode.
#[derive(Clone)]
pub struct Backends {
    pub user: Arc<dyn CoreBackend>,
    pub service: Arc<dyn CoreBackend>,
}

impl Backends {
    pub fn for_mode(&self, mode: CoreMode) -> Arc<dyn CoreBackend> {
        match mode {
            CoreMode::User => Arc::clone(&self.user),
            CoreMode::Service => Arc::clone(&self.service),
        }
    }
}

pub struct Supervisor {
    ops: Mutex<()>,
    status: StatusStore,
    config: ConfigStore,
    backends: Backends,
    network: Arc<dyn NetworkConfigurator>,
    events: Arc<dyn EventSink>,
    ipc: IpcClient,
    last_options: Mutex<Option<StartOptions>>,
    health: Mutex<Option<HealthPoller>>,
    controller_retry: RetryPolicy,
}

impl Supervisor {
    /// The initial mode is the persisted preference.
    pub async fn new(
        config: ConfigStore,
        backends: Backends,
        network: Arc<dyn NetworkConfigurator>,
        events: Arc<dyn EventSink>,
        ipc: IpcClient,
    ) -> Self {
        let current = config.get().await;
        let endpoint = Endpoint {
            config_path: Some(current.core.config_path.clone()),
            api_host: current.core.api_host.clone(),
            api_port: current.core.api_port,
            api_secret: None,
        };

        Self {
            ops: Mutex::new(()),
            status: StatusStore::new(current.mode.preferred, endpoint),
            config,
            backends,
            network,
            events,
            ipc,
            last_options: Mutex::new(None),
            health: Mutex::new(None),
            controller_retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry applied to controller calls.
    pub fn with_controller_retry(mut self, policy: RetryPolicy) -> Self {
        self.controller_retry = policy;
        self
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub async fn active_mode(&self) -> CoreMode {
        self.status.mode().await
    }

    async fn backend(&self) -> Arc<dyn CoreBackend> {
        self.backends.for_mode(self.status.mode().await)
    }

    // ============================================
    // STATUS
    // ============================================

    /// Last known status. Never blocks on a running operation.
    pub async fn status(&self) -> Result<CoreStatus, CoreError> {
        Ok(self.status.status().await?)
    }

    /// Probe the owning side, then return the status. Bounded by the
    /// configured status deadline; an expired probe leaves the status as is.
    pub async fn refresh_status(&self) -> Result<CoreStatus, CoreError> {
        let deadline = self.config.get().await.health.status_timeout();
        if timeout(deadline, self.check_health()).await.is_err() {
            debug!("Status refresh exceeded {deadline:?}, returning cached status");
        }
        self.status().await
    }

    /// One health check. Skipped while a lifecycle operation holds the lock.
    pub async fn check_health(&self) {
        let Ok(_guard) = self.ops.try_lock() else {
            trace!("Lifecycle operation in progress, skipping health check");
            return;
        };

        if self.status.state().await != CoreState::Running {
            return;
        }

        let deadline = self.config.get().await.health.status_timeout();
        let probe = match timeout(deadline, self.backend().await.probe()).await {
            Err(_) => {
                debug!("Health probe exceeded {deadline:?}, inconclusive");
                return;
            }
            Ok(Err(e)) if e.kind() == ErrorKind::IpcUnreachable => {
                warn!("Daemon unreachable during health check: {e}");
                Err(e.to_string())
            }
            Ok(Err(e)) => {
                debug!("Health probe inconclusive: {e}");
                return;
            }
            Ok(Ok(probe)) => Ok(probe),
        };

        match probe {
            Ok(probe) if probe.running => {
                let change = StatusChange::to(CoreState::Running)
                    .with_pid(probe.pid)
                    .with_version(probe.version)
                    .with_uptime(probe.uptime);
                if let Err(e) = self.status.apply(change).await {
                    warn!("Failed to record health probe: {e}");
                }
            }
            Ok(probe) => {
                let reason = probe
                    .message
                    .unwrap_or_else(|| "Core exited unexpectedly".to_string());
                self.mark_crashed(reason).await;
            }
            Err(reason) => self.mark_crashed(reason).await,
        }
    }

    async fn mark_crashed(&self, reason: String) {
        error!("Core crashed: {reason}");
        match self
            .status
            .apply(StatusChange::to(CoreState::Crashed).with_message(reason))
            .await
        {
            Ok(_) => self.events.emit(CoreEvent::CoreStopped { crashed: true }),
            Err(e) => warn!("Failed to record crash: {e}"),
        }
    }

    // ============================================
    // LIFECYCLE
    // ============================================

    /// Start the core with `config_path`, or the configured profile.
    pub async fn start(&self, config_path: Option<PathBuf>) -> Result<CoreStatus, CoreError> {
        let _guard = self.ops.lock().await;
        let options = self.resolve_options(config_path).await?;
        self.start_locked(options).await
    }

    pub async fn stop(&self) -> Result<CoreStatus, CoreError> {
        let _guard = self.ops.lock().await;
        self.stop_locked(true).await
    }

    /// Stop, pause, then start with the options of the last successful start.
    pub async fn restart(&self) -> Result<CoreStatus, CoreError> {
        let _guard = self.ops.lock().await;

        let remembered = self.last_options.lock().await.clone();
        let options = match remembered {
            Some(options) => options,
            None => self.resolve_options(None).await?,
        };

        // System proxy stays on; the core comes back on the same port.
        self.stop_locked(false).await?;
        TokioSleep(RESTART_PAUSE).await;
        self.start_locked(options).await
    }

    /// Adopt a core that is already serving the control port. Run once at startup.
    pub async fn reconcile_orphan(&self) -> Result<CoreStatus, CoreError> {
        let _guard = self.ops.lock().await;

        if self.status.state().await != CoreState::Stopped {
            return self.status().await;
        }

        let options = match self.resolve_options(None).await {
            Ok(options) => options,
            Err(e) => {
                debug!("No usable profile, skipping orphan reconciliation: {e}");
                return self.status().await;
            }
        };
        self.status.set_endpoint(options.endpoint()).await?;

        match self.backend().await.adopt(&options).await? {
            Some(probe) => self.mark_running(probe, options).await,
            None => {
                debug!("No orphaned core to adopt");
                self.status().await
            }
        }
    }

    /// Stop the core on the active side and make `mode` active. The caller
    /// starts the core again if it wants one.
    pub async fn switch_mode(&self, mode: CoreMode) -> Result<CoreStatus, CoreError> {
        let _guard = self.ops.lock().await;

        let current = self.status.mode().await;
        if current == mode {
            return self.status().await;
        }

        self.stop_locked(false).await?;
        self.status.set_mode(mode).await?;
        *self.last_options.lock().await = None;

        info!("Active core mode {current} -> {mode}");
        self.status().await
    }

    async fn resolve_options(&self, config_path: Option<PathBuf>) -> Result<StartOptions, CoreError> {
        let config = self.config.get().await;
        let mode = self.status.mode().await;
        Ok(StartOptions::resolve(&config, mode, config_path)?)
    }

    async fn start_locked(&self, options: StartOptions) -> Result<CoreStatus, CoreError> {
        let state = self.status.state().await;
        if state.is_running() {
            debug!("Core already running, start is a no-op");
            return self.status().await;
        }

        if !state.can_start() {
            return Err(SupervisorError::InvalidTransition {
                from: state,
                to: CoreState::Starting,
                location: ErrorLocation::from(Location::caller()),
            }
            .into());
        }

        let backend = self.backend().await;
        self.status.set_endpoint(options.endpoint()).await?;
        self.status.apply(StatusChange::to(CoreState::Starting)).await?;

        // The daemon may already be running a core for us.
        if let Ok(probe) = backend.probe().await
            && probe.running
        {
            info!("Core already running on the {} side, adopting", backend.mode());
            return self.mark_running(probe, options).await;
        }

        info!(
            "Starting core in {} mode with {}",
            backend.mode(),
            options.config_path.display()
        );

        match backend.start(&options).await {
            Ok(probe) => self.mark_running(probe, options).await,
            Err(e) => {
                let next = match e.kind() {
                    ErrorKind::ApiUnresponsive | ErrorKind::ProcessCrashed => CoreState::Crashed,
                    _ => CoreState::Stopped,
                };
                error!("Core start failed ({:?}): {e}", e.kind());
                self.status
                    .apply(StatusChange::to(next).with_message(e.to_string()))
                    .await?;
                Err(e)
            }
        }
    }

    async fn mark_running(&self, probe: CoreProbe, options: StartOptions) -> Result<CoreStatus, CoreError> {
        let backend = self.backend().await;
        let mode = backend.mode();

        self.status
            .apply(
                StatusChange::to(CoreState::Running)
                    .with_pid(probe.pid)
                    .with_version(probe.version.clone())
                    .with_uptime(probe.uptime),
            )
            .await?;

        let controller = options.controller();
        *self.last_options.lock().await = Some(options);

        self.events.emit(CoreEvent::CoreStarted {
            pid: probe.pid,
            mode,
        });

        let preferences = self.config.get().await.mode;

        if let Ok(controller) = controller
            && let Err(e) = self.apply_routing_mode(&controller, preferences.routing).await
        {
            warn!("Failed to apply routing mode {}: {e}", preferences.routing);
        }

        if mode == CoreMode::Service
            && preferences.tun_enabled
            && !probe.tun_enabled
            && let Err(e) = backend.set_tun(true, &self.tun_dns().await).await
        {
            warn!("Failed to re-enable TUN after start: {e}");
        }

        self.status().await
    }

    async fn stop_locked(&self, revert_proxy: bool) -> Result<CoreStatus, CoreError> {
        let state = self.status.state().await;
        if state == CoreState::Stopped {
            debug!("Core already stopped, stop is a no-op");
            return self.status().await;
        }

        let backend = self.backend().await;
        let before = self.status().await?;
        self.status.apply(StatusChange::to(CoreState::Stopping)).await?;

        if revert_proxy {
            self.revert_system_proxy().await;
        }

        if let Err(e) = backend.stop().await {
            warn!("Core stop failed: {e}");

            match backend.probe().await {
                Ok(probe) if probe.running => {
                    self.status
                        .apply(
                            StatusChange::to(CoreState::Running)
                                .with_pid(probe.pid)
                                .with_version(probe.version)
                                .with_uptime(probe.uptime)
                                .with_message(e.to_string()),
                        )
                        .await?;
                    return Err(e);
                }
                Ok(_) => debug!("Core is gone despite the stop error"),
                // Unconfirmed: keep the last state we know to be true.
                Err(probe_error) if before.running => {
                    debug!("Stop could not be verified: {probe_error}");
                    self.status
                        .apply(
                            StatusChange::to(CoreState::Running)
                                .with_pid(before.pid)
                                .with_version(before.version)
                                .with_uptime(before.uptime_seconds.map(Duration::from_secs))
                                .with_message(e.to_string()),
                        )
                        .await?;
                    return Err(e);
                }
                Err(probe_error) => debug!("Stop could not be verified: {probe_error}"),
            }
        }

        self.status.apply(StatusChange::to(CoreState::Stopped)).await?;
        self.events.emit(CoreEvent::CoreStopped { crashed: false });
        info!("Core stopped");

        self.status().await
    }

    // ============================================
    // ROUTING
    // ============================================

    async fn running_controller(&self) -> Result<Option<ControllerClient>, CoreError> {
        if !self.status.state().await.is_running() {
            return Ok(None);
        }

        match self.last_options.lock().await.as_ref() {
            Some(options) => Ok(Some(options.controller()?)),
            None => Ok(None),
        }
    }

    /// Live mode from the controller when the core runs, the saved one otherwise.
    pub async fn get_routing_mode(&self) -> Result<RoutingMode, CoreError> {
        if let Some(controller) = self.running_controller().await? {
            return self
                .controller_retry
                .run("get_routing_mode", || async {
                    controller.get_routing_mode().await.map_err(CoreError::from)
                })
                .await;
        }
        Ok(self.config.get().await.mode.routing)
    }

    async fn apply_routing_mode(
        &self,
        controller: &ControllerClient,
        mode: RoutingMode,
    ) -> Result<(), CoreError> {
        self.controller_retry
            .run("set_routing_mode", || async {
                controller.set_routing_mode(mode).await.map_err(CoreError::from)
            })
            .await
    }

    pub async fn set_routing_mode(&self, mode: RoutingMode) -> Result<RoutingMode, CoreError> {
        if let Some(controller) = self.running_controller().await? {
            self.apply_routing_mode(&controller, mode).await?;
        }

        self.config.update(move |c| c.mode.routing = mode).await?;
        self.events.emit(CoreEvent::ProxyModeChanged { mode });

        info!("Routing mode set to {mode}");
        Ok(mode)
    }

    // ============================================
    // SYSTEM PROXY
    // ============================================

    /// Point the OS proxy at the core, or switch it off. `port` defaults to
    /// the configured proxy port and is remembered when given.
    pub async fn set_system_proxy(
        &self,
        enabled: bool,
        port: Option<u16>,
    ) -> Result<ProxyStatus, CoreError> {
        let config = self.config.get().await;
        let port = port.unwrap_or(config.network.proxy_port);
        let settings = ProxySettings {
            host: config.network.proxy_host.clone(),
            port,
            bypass: config.network.bypass.clone(),
        };

        self.network.set_system_proxy(&settings, enabled).await?;

        if port != config.network.proxy_port {
            self.config
                .update(move |c| c.network.proxy_port = port)
                .await?;
        }

        self.events
            .emit(CoreEvent::SystemProxyChanged { enabled, port });
        info!("System proxy enabled={enabled} at {}:{port}", settings.host);

        match self.network.get_system_proxy_status().await {
            Ok(status) => Ok(status),
            Err(e) => {
                debug!("Could not read back system proxy: {e}");
                Ok(ProxyStatus {
                    enabled,
                    host: Some(settings.host),
                    port: Some(port),
                })
            }
        }
    }

    /// OS proxy state, independent of whether the core runs.
    pub async fn get_system_proxy_status(&self) -> Result<ProxyStatus, CoreError> {
        Ok(self.network.get_system_proxy_status().await?)
    }

    /// Switch the OS proxy off if it still points at our proxy port.
    async fn revert_system_proxy(&self) {
        let config = self.config.get().await;

        let current = match self.network.get_system_proxy_status().await {
            Ok(current) => current,
            Err(e) => {
                warn!("Could not read system proxy before reverting: {e}");
                return;
            }
        };

        let ours = current.enabled
            && current.port == Some(config.network.proxy_port)
            && current.host.as_deref() == Some(config.network.proxy_host.as_str());
        if !ours {
            return;
        }

        let settings = ProxySettings {
            host: config.network.proxy_host.clone(),
            port: config.network.proxy_port,
            bypass: config.network.bypass.clone(),
        };

        match self.network.set_system_proxy(&settings, false).await {
            Ok(()) => {
                info!("System proxy disabled");
                self.events.emit(CoreEvent::SystemProxyChanged {
                    enabled: false,
                    port: settings.port,
                });
            }
            Err(e) => warn!("Failed to disable system proxy: {e}"),
        }
    }

    // ============================================
    // TUN
    // ============================================

    /// Toggle TUN on the running core and remember the choice. Needs service mode.
    pub async fn set_tun(&self, enabled: bool) -> Result<bool, CoreError> {
        let _guard = self.ops.lock().await;

        let mode = self.status.mode().await;
        if enabled && mode == CoreMode::User {
            return Err(SupervisorError::RequiresService {
                message: "TUN mode requires service mode".to_string(),
                location: ErrorLocation::from(Location::caller()),
            }
            .into());
        }

        if mode == CoreMode::Service && self.status.state().await.is_running() {
            self.backends
                .for_mode(mode)
                .set_tun(enabled, &self.tun_dns().await)
                .await?;
        }

        self.config
            .update(move |c| c.mode.tun_enabled = enabled)
            .await?;
        self.events.emit(CoreEvent::TunModeChanged { enabled });

        info!("TUN mode enabled={enabled}");
        Ok(enabled)
    }

    async fn tun_dns(&self) -> Vec<String> {
        vec![self.config.get().await.network.tun_dns]
    }

    pub async fn get_tun(&self) -> bool {
        if self.status.mode().await == CoreMode::Service
            && self.status.state().await.is_running()
            && let Ok(probe) = self.backends.service.probe().await
        {
            return probe.tun_enabled;
        }
        self.config.get().await.mode.tun_enabled
    }

    // ============================================
    // SERVICE LOGS
    // ============================================

    pub async fn service_logs(&self, limit: Option<u32>) -> Result<Vec<IpcLogEntry>, CoreError> {
        Ok(self.ipc.logs(limit).await?)
    }

    pub async fn clear_service_logs(&self) -> Result<(), CoreError> {
        Ok(self.ipc.clear_logs().await?)
    }

    // ============================================
    // HOST INTEGRATION
    // ============================================

    pub async fn start_health_polling(self: &Arc<Self>) {
        let period = self.config.get().await.health.interval();
        let supervisor = Arc::downgrade(self);

        let poller = HealthPoller::spawn(period, move || {
            let supervisor = supervisor.clone();
            async move {
                if let Some(supervisor) = supervisor.upgrade() {
                    supervisor.check_health().await;
                }
            }
        });

        if let Some(previous) = self.health.lock().await.replace(poller) {
            previous.stop().await;
        }
    }

    pub async fn stop_health_polling(&self) {
        if let Some(poller) = self.health.lock().await.take() {
            poller.stop().await;
            debug!("Health polling stopped");
        }
    }

    /// App exit: system proxy off, TUN off, core stopped, polling cancelled.
    pub async fn shutdown(&self) {
        {
            let _guard = self.ops.lock().await;

            self.revert_system_proxy().await;

            let mode = self.status.mode().await;
            if mode == CoreMode::Service
                && self.status.state().await.is_running()
                && let Err(e) = self.backends.for_mode(mode).set_tun(false, &[]).await
            {
                warn!("Failed to disable TUN on exit: {e}");
            }

            if let Err(e) = self.stop_locked(false).await {
                warn!("Failed to stop core on exit: {e}");
            }
        }

        self.stop_health_polling().await;
        info!("Supervisor shut down");
    }
}
