// Prevents additional console window on Windows in release builds
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use coreward::commands;
use coreward::error::AppError;
use coreward::logger::initialize as LoggerInitialize;
use coreward::state::AppState;

use common::ErrorLocation;

use std::fs::create_dir_all;
use std::panic::Location;

use log::{error, info};
use tauri::{Manager, RunEvent};

fn main() {
    let app = tauri::Builder::default()
        .invoke_handler(tauri::generate_handler![
            commands::core::start_core,
            commands::core::stop_core,
            commands::core::restart_core,
            commands::core::get_core_status,
            commands::core::refresh_core_status,
            commands::core::get_service_logs,
            commands::core::clear_service_logs,
            commands::network::set_system_proxy,
            commands::network::get_system_proxy_status,
            commands::network::set_tun_mode,
            commands::network::get_tun_status,
            commands::network::set_routing_mode,
            commands::network::get_routing_mode,
            commands::mode::get_core_mode,
            commands::mode::get_desired_core_mode,
            commands::mode::set_core_mode,
            commands::mode::get_privileged_helper_status,
            commands::mode::install_privileged_helper,
            commands::mode::uninstall_privileged_helper,
            commands::mode::recover_orphaned_core,
        ])
        .setup(|app| {
            let log_dir = app
                .path()
                .app_log_dir()
                .map_err(|e| AppError::Coreward {
                    message: format!("Failed to get log directory: {e}"),
                    location: ErrorLocation::from(Location::caller()),
                })?;

            create_dir_all(&log_dir).map_err(|e| AppError::Coreward {
                message: format!("Failed to create log directory: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })?;

            // Logger first so state wiring is traced
            LoggerInitialize(&log_dir)?;

            info!("Coreward starting");
            info!("Log directory: {}", log_dir.display());

            let state = tauri::async_runtime::block_on(AppState::initialize(
                app.handle().clone(),
                log_dir,
            ))?;
            app.manage(state.clone());

            // Startup reconciliation must not hold up the window
            tauri::async_runtime::spawn(async move {
                match state.modes.bootstrap().await {
                    Ok(status) => info!("Startup complete, core state: {:?}", status.state),
                    Err(e) => error!("Startup reconciliation failed: {e}"),
                }
            });

            Ok(())
        })
        .build(tauri::generate_context!())
        .expect("error while running tauri application");

    app.run(|handle, event| {
        if let RunEvent::ExitRequested { .. } = event
            && let Some(state) = handle.try_state::<AppState>()
        {
            info!("Exit requested, shutting down the core");
            tauri::async_runtime::block_on(state.supervisor.shutdown());
        }
    });
}
