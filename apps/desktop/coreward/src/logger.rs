//! Logging for the desktop app: colored stdout plus `coreward.log` in the app
//! log directory.

use crate::error::AppError;

use common::ErrorLocation;

use std::io::stdout;
use std::panic::Location;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use fern::Dispatch;
use fern::colors::Color::{Blue, Green, Magenta, Red, Yellow};
use fern::colors::ColoredLevelConfig;
use humantime::format_rfc3339;
use log::{LevelFilter, info, warn};

static LOGGER_ALREADY_CALLED: AtomicBool = AtomicBool::new(false);

pub const LOG_FILE_NAME: &str = "coreward.log";

#[cfg(debug_assertions)]
const LOG_LEVEL: LevelFilter = LevelFilter::Debug;
#[cfg(not(debug_assertions))]
const LOG_LEVEL: LevelFilter = LevelFilter::Info;

/// Chatty dependencies capped below our own level.
const QUIET_TARGETS: [(&str, LevelFilter); 4] = [
    ("hyper_util", LevelFilter::Info),
    ("reqwest", LevelFilter::Info),
    ("tao", LevelFilter::Warn),
    ("wry", LevelFilter::Warn),
];

/// Install the global logger. Later calls log a warning and return Ok; a
/// failed attempt may be retried.
///
/// # Errors
///
/// Returns [`AppError::Coreward`] when the log file cannot be opened or a
/// logger from elsewhere is already installed.
pub fn initialize(log_dir: &Path) -> Result<(), AppError> {
    if LOGGER_ALREADY_CALLED.swap(true, Ordering::SeqCst) {
        warn!("Logger already initialized");
        return Ok(());
    }

    match initialize_internal(log_dir) {
        Ok(()) => {
            info!("Logger initialized with level: {LOG_LEVEL:?}");
            Ok(())
        }
        Err(e) => {
            LOGGER_ALREADY_CALLED.store(false, Ordering::SeqCst);
            Err(e)
        }
    }
}

#[track_caller]
fn initialize_internal(log_dir: &Path) -> Result<(), AppError> {
    let log_file_path = log_dir.join(LOG_FILE_NAME);

    let colors = ColoredLevelConfig::new()
        .debug(Blue)
        .info(Green)
        .warn(Yellow)
        .error(Red)
        .trace(Magenta);

    let log_file = fern::log_file(&log_file_path).map_err(|e| AppError::Coreward {
        message: format!("Failed to open log file {}: {e}", log_file_path.display()),
        location: ErrorLocation::from(Location::caller()),
    })?;

    let base = QUIET_TARGETS
        .iter()
        .fold(Dispatch::new().level(LOG_LEVEL), |dispatch, (target, level)| {
            dispatch.level_for(*target, *level)
        });

    let console = Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{date} - {level}] {message} [{file}:{line}]",
                date = format_rfc3339(SystemTime::now()),
                level = colors.color(record.level()),
                file = record.file().unwrap_or("unknown"),
                line = record.line().unwrap_or(0),
            ))
        })
        .chain(stdout());

    let file = Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{date} - {level}] {message} [{file}:{line}]",
                date = format_rfc3339(SystemTime::now()),
                level = record.level(),
                file = record.file().unwrap_or("unknown"),
                line = record.line().unwrap_or(0),
            ))
        })
        .chain(log_file);

    base.chain(console)
        .chain(file)
        .apply()
        .map_err(|e| AppError::Coreward {
            message: format!("Failed to install logger: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
}
