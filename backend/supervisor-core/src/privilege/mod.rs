//! Privileged helper installation and the user/service mode policy.
//!
//! [`PrivilegedHelper`] is the per-OS installer for the daemon:
//!
//! - macOS: LaunchDaemon registered through `osascript` elevation
//! - Windows: service registered with `sc.exe` from an elevated PowerShell
//! - Linux: systemd unit installed through `pkexec`
//!
//! [`ModeManager`] decides when the helper is needed and keeps the persisted
//! mode preference in step with what the supervisor actually runs.

pub mod launchd;
pub mod manager;
pub mod systemd;
pub mod windows_service;

pub use manager::ModeManager;

use crate::SERVICE_BINARY;
use crate::command::{CommandRunner, args};
use crate::error::privilege::PrivilegeError;

use common::ErrorLocation;
use models::PrivilegeState;

use std::env::current_exe;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

#[async_trait]
pub trait PrivilegedHelper: Send + Sync {
    /// Whether the descriptor is installed and the service manager has it loaded.
    async fn state(&self) -> Result<PrivilegeState, PrivilegeError>;

    /// Place the daemon binary and descriptor, then start the service.
    /// Prompts the user for elevation.
    async fn install(&self) -> Result<(), PrivilegeError>;

    /// Stop the service and remove everything `install` placed.
    async fn uninstall(&self) -> Result<(), PrivilegeError>;
}

/// Helper for the platform this binary was built for.
pub fn platform_helper(
    runner: Arc<dyn CommandRunner>,
    daemon_source: PathBuf,
) -> Arc<dyn PrivilegedHelper> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(launchd::LaunchdHelper::new(runner, daemon_source))
    }
    #[cfg(target_os = "windows")]
    {
        Arc::new(windows_service::WindowsServiceHelper::new(
            runner,
            daemon_source,
        ))
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Arc::new(systemd::SystemdHelper::new(runner, daemon_source))
    }
}

/// The daemon binary shipped next to the running executable.
#[track_caller]
pub fn bundled_daemon_path() -> Result<PathBuf, PrivilegeError> {
    let exe = current_exe()?;
    exe.parent()
        .map(|dir| dir.join(SERVICE_BINARY))
        .ok_or_else(|| PrivilegeError::HelperMissing {
            message: format!("Executable has no parent directory: {}", exe.display()),
            location: ErrorLocation::from(Location::caller()),
        })
}

#[track_caller]
pub(crate) fn require_daemon_source(path: &Path) -> Result<(), PrivilegeError> {
    if path.is_file() {
        return Ok(());
    }

    Err(PrivilegeError::HelperMissing {
        message: format!("Daemon binary not found at {}", path.display()),
        location: ErrorLocation::from(Location::caller()),
    })
}

/// Single-quote for `/bin/sh`.
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Primary group of the desktop user, handed to the daemon so it can make
/// the socket reachable without opening it to everyone.
pub(crate) async fn current_gid(runner: &dyn CommandRunner) -> Option<u32> {
    let output = runner.run("id", &args(["-g"])).await.ok()?;
    if !output.success() {
        return None;
    }

    let gid = output.stdout.trim().parse().ok();
    debug!("Current user gid: {gid:?}");
    gid
}
