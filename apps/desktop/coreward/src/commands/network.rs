use crate::error::AppError;
use crate::state::AppState;

use supervisor_core::network::ProxyStatus;

use models::RoutingMode;

use log::info;
use tauri::{State, command as TauriCommand};

/// Point the OS proxy at the core or switch it off. A given `port` is
/// remembered for later calls.
#[TauriCommand]
pub async fn set_system_proxy(
    state: State<'_, AppState>,
    enabled: bool,
    port: Option<u16>,
) -> Result<ProxyStatus, AppError> {
    info!("UI set system proxy enabled={enabled} port={port:?}");
    Ok(state.supervisor.set_system_proxy(enabled, port).await?)
}

#[TauriCommand]
pub async fn get_system_proxy_status(
    state: State<'_, AppState>,
) -> Result<ProxyStatus, AppError> {
    Ok(state.supervisor.get_system_proxy_status().await?)
}

/// Enabling TUN from user mode moves the core to service mode first.
#[TauriCommand]
pub async fn set_tun_mode(state: State<'_, AppState>, enabled: bool) -> Result<bool, AppError> {
    info!("UI set TUN enabled={enabled}");
    Ok(state.modes.set_tun_mode(enabled).await?)
}

#[TauriCommand]
pub async fn get_tun_status(state: State<'_, AppState>) -> Result<bool, AppError> {
    Ok(state.supervisor.get_tun().await)
}

#[TauriCommand]
pub async fn set_routing_mode(
    state: State<'_, AppState>,
    mode: RoutingMode,
) -> Result<RoutingMode, AppError> {
    info!("UI set routing mode {mode}");
    Ok(state.supervisor.set_routing_mode(mode).await?)
}

#[TauriCommand]
pub async fn get_routing_mode(state: State<'_, AppState>) -> Result<RoutingMode, AppError> {
    Ok(state.supervisor.get_routing_mode().await?)
}
