use crate::error::AppError;
use crate::events::TauriEventSink;

use supervisor_core::command::{CommandRunner, SystemCommandRunner};
use supervisor_core::config::{AppConfig, ConfigStore};
use supervisor_core::error::CoreError;
use supervisor_core::events::EventSink;
use supervisor_core::ipc::{IpcClient, IpcClientConfig};
use supervisor_core::network::platform_configurator;
use supervisor_core::privilege::{ModeManager, bundled_daemon_path, platform_helper};
use supervisor_core::supervisor::{Backends, ServiceBackend, Supervisor, UserBackend};

use std::path::PathBuf;
use std::sync::Arc;

use log::info;
use tauri::AppHandle;

/// Everything the Tauri commands reach through `State<'_, AppState>`.
///
/// The supervisor owns the core lifecycle; the mode manager wraps it with the
/// user/service policy. Both serialize their own mutations, so the state
/// itself is a pair of shared handles.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub modes: Arc<ModeManager>,
}

impl AppState {
    /// Wire the platform runner, network configurator, helper and IPC client
    /// into a supervisor. Nothing is started here; see [`ModeManager::bootstrap`].
    pub async fn initialize(app: AppHandle, log_dir: PathBuf) -> Result<Self, AppError> {
        let config_dir = AppConfig::default_dir().map_err(CoreError::from)?;
        let config = ConfigStore::load(config_dir).map_err(CoreError::from)?;
        let current = config.get().await;

        info!("Config directory: {}", config.config_dir().display());
        info!("Core binary: {}", current.core.binary_path.display());

        let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
        let network = platform_configurator(Arc::clone(&runner));
        let daemon_source = bundled_daemon_path().map_err(CoreError::from)?;
        let helper = platform_helper(Arc::clone(&runner), daemon_source);

        let ipc = IpcClient::new(IpcClientConfig::from(&current.service));
        let backends = Backends {
            user: Arc::new(UserBackend::new(log_dir)),
            service: Arc::new(ServiceBackend::new(ipc.clone())),
        };

        let events: Arc<dyn EventSink> = Arc::new(TauriEventSink::new(app));

        let supervisor = Arc::new(
            Supervisor::new(
                config,
                backends,
                network,
                Arc::clone(&events),
                ipc.clone(),
            )
            .await,
        );
        let modes = Arc::new(ModeManager::new(
            helper,
            Arc::clone(&supervisor),
            events,
            ipc,
        ));

        Ok(Self { supervisor, modes })
    }
}
