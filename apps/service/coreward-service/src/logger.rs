//! Daemon logging: plain stderr (captured by launchd, journald or the SCM)
//! plus `coreward-service.log`.

use crate::error::ServiceError;

use common::ErrorLocation;

use std::fs::create_dir_all;
use std::io::stderr;
use std::panic::Location;
use std::path::Path;
use std::time::SystemTime;

use fern::Dispatch;
use humantime::format_rfc3339_seconds;
use log::LevelFilter;

pub const LOG_FILE_NAME: &str = "coreward-service.log";

#[cfg(debug_assertions)]
const LOG_LEVEL: LevelFilter = LevelFilter::Debug;
#[cfg(not(debug_assertions))]
const LOG_LEVEL: LevelFilter = LevelFilter::Info;

/// Install the global logger. Called once from `main`.
#[track_caller]
pub fn initialize(log_dir: &Path) -> Result<(), ServiceError> {
    create_dir_all(log_dir).map_err(|e| ServiceError::Logger {
        message: format!("Failed to create {}: {e}", log_dir.display()),
        location: ErrorLocation::from(Location::caller()),
    })?;

    let log_file_path = log_dir.join(LOG_FILE_NAME);
    let log_file = fern::log_file(&log_file_path).map_err(|e| ServiceError::Logger {
        message: format!("Failed to open log file {}: {e}", log_file_path.display()),
        location: ErrorLocation::from(Location::caller()),
    })?;

    Dispatch::new()
        .level(LOG_LEVEL)
        .level_for("hyper_util", LevelFilter::Info)
        .level_for("reqwest", LevelFilter::Info)
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{date} {level} {target}] {message}",
                date = format_rfc3339_seconds(SystemTime::now()),
                level = record.level(),
                target = record.target(),
            ))
        })
        .chain(stderr())
        .chain(log_file)
        .apply()
        .map_err(|e| ServiceError::Logger {
            message: format!("Failed to install logger: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
}
