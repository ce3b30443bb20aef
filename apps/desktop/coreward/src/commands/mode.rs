use crate::error::AppError;
use crate::state::AppState;

use models::{CoreMode, CoreStatus, PrivilegeState};

use log::{error, info};
use tauri::{State, command as TauriCommand};

/// Mode the supervisor currently drives.
#[TauriCommand]
pub async fn get_core_mode(state: State<'_, AppState>) -> Result<CoreMode, AppError> {
    Ok(state.modes.get_mode().await)
}

/// Persisted preference applied at startup.
#[TauriCommand]
pub async fn get_desired_core_mode(state: State<'_, AppState>) -> Result<CoreMode, AppError> {
    Ok(state.modes.get_desired_mode().await)
}

/// Switch modes. Service mode installs the helper when it is missing, which
/// prompts for elevation. The core is left stopped.
#[TauriCommand]
pub async fn set_core_mode(
    state: State<'_, AppState>,
    mode: CoreMode,
) -> Result<CoreStatus, AppError> {
    info!("UI requested core mode {mode}");

    let status = state
        .modes
        .set_mode(mode)
        .await
        .inspect_err(|e| error!("Switching to {mode} failed: {e}"))?;

    Ok(status)
}

#[TauriCommand]
pub async fn get_privileged_helper_status(
    state: State<'_, AppState>,
) -> Result<PrivilegeState, AppError> {
    Ok(state.modes.helper_status().await?)
}

#[TauriCommand]
pub async fn install_privileged_helper(
    state: State<'_, AppState>,
) -> Result<PrivilegeState, AppError> {
    info!("UI requested helper installation");
    Ok(state.modes.install_helper().await?)
}

#[TauriCommand]
pub async fn uninstall_privileged_helper(
    state: State<'_, AppState>,
) -> Result<PrivilegeState, AppError> {
    info!("UI requested helper removal");
    Ok(state.modes.uninstall_helper().await?)
}

/// Adopt a core left running by a previous session, if one answers.
#[TauriCommand]
pub async fn recover_orphaned_core(state: State<'_, AppState>) -> Result<CoreStatus, AppError> {
    Ok(state.supervisor.reconcile_orphan().await?)
}
