use crate::error::AppError;
use crate::state::AppState;

use models::CoreStatus;
use models::ipc::IpcLogEntry;

use std::path::PathBuf;

use log::{debug, error, info};
use tauri::{State, command as TauriCommand};

/// Start the core in the active mode.
///
/// `config_path` switches the profile for this start; `None` reuses the
/// configured one. Starting a running core is a no-op that returns its status.
#[TauriCommand]
pub async fn start_core(
    state: State<'_, AppState>,
    config_path: Option<String>,
) -> Result<CoreStatus, AppError> {
    info!("UI requested core start (profile override: {config_path:?})");

    let status = state
        .supervisor
        .start(config_path.map(PathBuf::from))
        .await
        .inspect_err(|e| error!("Core start failed: {e}"))?;

    Ok(status)
}

#[TauriCommand]
pub async fn stop_core(state: State<'_, AppState>) -> Result<CoreStatus, AppError> {
    info!("UI requested core stop");
    Ok(state.supervisor.stop().await?)
}

/// Stop then start with the previous profile and mode.
#[TauriCommand]
pub async fn restart_core(state: State<'_, AppState>) -> Result<CoreStatus, AppError> {
    info!("UI requested core restart");

    let status = state
        .supervisor
        .restart()
        .await
        .inspect_err(|e| error!("Core restart failed: {e}"))?;

    Ok(status)
}

/// Cached status. Never waits on a start or stop in progress.
#[TauriCommand]
pub async fn get_core_status(state: State<'_, AppState>) -> Result<CoreStatus, AppError> {
    Ok(state.supervisor.status().await?)
}

/// Probe the core (or the daemon) before answering, bounded by the status deadline.
#[TauriCommand]
pub async fn refresh_core_status(state: State<'_, AppState>) -> Result<CoreStatus, AppError> {
    debug!("Refreshing core status");
    Ok(state.supervisor.refresh_status().await?)
}

#[TauriCommand]
pub async fn get_service_logs(
    state: State<'_, AppState>,
    limit: Option<u32>,
) -> Result<Vec<IpcLogEntry>, AppError> {
    Ok(state.supervisor.service_logs(limit).await?)
}

#[TauriCommand]
pub async fn clear_service_logs(state: State<'_, AppState>) -> Result<(), AppError> {
    Ok(state.supervisor.clear_service_logs().await?)
}
