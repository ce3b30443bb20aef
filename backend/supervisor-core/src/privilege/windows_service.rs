use crate::command::{CommandOutput, CommandRunner, args};
use crate::error::privilege::PrivilegeError;
use crate::privilege::{PrivilegedHelper, require_daemon_source};
use crate::{APP_DIR_NAME, SERVICE_BINARY, SERVICE_NAME};

use common::ErrorLocation;
use models::PrivilegeState;

use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};

const POWERSHELL: &str = "powershell";
const SC: &str = "sc.exe";
const RUNNING_MARKER: &str = "RUNNING";
const UAC_DECLINED: &str = "canceled by the user";

/// `'...'` literal for PowerShell.
pub(crate) fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub(crate) fn install_dir() -> PathBuf {
    let program_data = std::env::var_os("ProgramData")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(r"C:\ProgramData"));
    program_data.join(APP_DIR_NAME)
}

/// Script run elevated: copy the daemon and register it as an auto-start service.
pub(crate) fn install_script(source: &Path, target: &Path) -> String {
    let bin_path = format!("\"{}\"", target.display());
    [
        format!(
            "New-Item -ItemType Directory -Force -Path {} | Out-Null",
            ps_quote(&install_dir().to_string_lossy())
        ),
        format!(
            "Copy-Item -Force -Path {} -Destination {}",
            ps_quote(&source.to_string_lossy()),
            ps_quote(&target.to_string_lossy())
        ),
        format!("& {SC} stop {SERVICE_NAME} | Out-Null"),
        format!("& {SC} delete {SERVICE_NAME} | Out-Null"),
        format!(
            "& {SC} create {SERVICE_NAME} binPath= {} start= auto | Out-Null",
            ps_quote(&bin_path)
        ),
        "if ($LASTEXITCODE -ne 0) { exit $LASTEXITCODE }".to_string(),
        format!("& {SC} start {SERVICE_NAME} | Out-Null"),
        "exit $LASTEXITCODE".to_string(),
    ]
    .join("\r\n")
}

pub(crate) fn uninstall_script(target: &Path) -> String {
    [
        format!("& {SC} stop {SERVICE_NAME} | Out-Null"),
        format!("& {SC} delete {SERVICE_NAME} | Out-Null"),
        format!(
            "Remove-Item -Force -ErrorAction SilentlyContinue -Path {}",
            ps_quote(&target.to_string_lossy())
        ),
        "exit 0".to_string(),
    ]
    .join("\r\n")
}

#[track_caller]
pub(crate) fn classify_elevation_failure(output: &CommandOutput) -> PrivilegeError {
    let diagnostic = output.diagnostic();
    if diagnostic.contains(UAC_DECLINED) {
        return PrivilegeError::Cancelled {
            message: "Elevation prompt was declined".to_string(),
            location: ErrorLocation::from(Location::caller()),
        };
    }

    PrivilegeError::InstallFailed {
        message: format!("Elevated script failed: {diagnostic}"),
        location: ErrorLocation::from(Location::caller()),
    }
}

/// Windows service installer.
pub struct WindowsServiceHelper {
    runner: Arc<dyn CommandRunner>,
    daemon_source: PathBuf,
}

impl WindowsServiceHelper {
    pub fn new(runner: Arc<dyn CommandRunner>, daemon_source: PathBuf) -> Self {
        Self {
            runner,
            daemon_source,
        }
    }

    fn installed_binary() -> PathBuf {
        install_dir().join(SERVICE_BINARY)
    }

    /// Write `script` to a temp file and run it through an elevated PowerShell.
    async fn run_elevated(&self, script: &str) -> Result<(), PrivilegeError> {
        let script_path = std::env::temp_dir().join(format!("{SERVICE_NAME}-setup.ps1"));
        std::fs::write(&script_path, script)?;

        let launcher = format!(
            "$p = Start-Process -FilePath powershell -Verb RunAs -Wait -PassThru -WindowStyle Hidden \
             -ArgumentList '-NoProfile','-ExecutionPolicy','Bypass','-File',{}; exit $p.ExitCode",
            ps_quote(&format!("\"{}\"", script_path.display()))
        );

        let result = self
            .runner
            .run(
                POWERSHELL,
                &args(["-NoProfile", "-NonInteractive", "-Command", launcher.as_str()]),
            )
            .await;

        if let Err(e) = std::fs::remove_file(&script_path) {
            debug!("Failed to remove setup script: {e}");
        }

        let output = result?;
        if output.success() {
            Ok(())
        } else {
            Err(classify_elevation_failure(&output))
        }
    }
}

#[async_trait]
impl PrivilegedHelper for WindowsServiceHelper {
    async fn state(&self) -> Result<PrivilegeState, PrivilegeError> {
        let output = self.runner.run(SC, &args(["query", SERVICE_NAME])).await?;
        let helper_installed = output.success();
        let helper_valid = helper_installed
            && Self::installed_binary().is_file()
            && output.stdout.contains(RUNNING_MARKER);

        Ok(PrivilegeState {
            helper_installed,
            helper_valid,
        })
    }

    async fn install(&self) -> Result<(), PrivilegeError> {
        require_daemon_source(&self.daemon_source)?;

        info!("Registering Windows service {SERVICE_NAME}");
        self.run_elevated(&install_script(
            &self.daemon_source,
            &Self::installed_binary(),
        ))
        .await
    }

    async fn uninstall(&self) -> Result<(), PrivilegeError> {
        info!("Removing Windows service {SERVICE_NAME}");
        self.run_elevated(&uninstall_script(&Self::installed_binary()))
            .await
            .map_err(|e| match e {
                PrivilegeError::InstallFailed { message, location } => {
                    PrivilegeError::UninstallFailed { message, location }
                }
                other => other,
            })
    }
}
