use crate::command::{CommandOutput, CommandRunner, args};
use crate::error::privilege::PrivilegeError;
use crate::privilege::{PrivilegedHelper, current_gid, require_daemon_source, shell_quote};
use crate::{DEFAULT_IPC_ENDPOINT, SERVICE_BINARY, SERVICE_NAME};

use common::ErrorLocation;
use models::PrivilegeState;

use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use const_format::concatcp;
use log::{debug, info};

pub const UNIT_PATH: &str = concatcp!("/etc/systemd/system/", SERVICE_NAME, ".service");
pub const INSTALLED_BINARY: &str = concatcp!("/usr/local/bin/", SERVICE_BINARY);
const PKEXEC: &str = "pkexec";
const SYSTEMCTL: &str = "systemctl";
/// pkexec exit code when the authentication dialog is dismissed.
const PKEXEC_DISMISSED: i32 = 126;

pub(crate) fn systemd_unit(program: &str, arguments: &[String]) -> String {
    let exec = std::iter::once(program.to_string())
        .chain(arguments.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "[Unit]\n\
         Description=Coreward privileged core service\n\
         After=network-online.target\n\
         \n\
         [Service]\n\
         Type=simple\n\
         ExecStart={exec}\n\
         Restart=on-failure\n\
         RestartSec=2\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n"
    )
}

#[track_caller]
pub(crate) fn classify_pkexec_failure(output: &CommandOutput) -> PrivilegeError {
    if output.status == Some(PKEXEC_DISMISSED) {
        return PrivilegeError::Cancelled {
            message: "Authentication dialog was dismissed".to_string(),
            location: ErrorLocation::from(Location::caller()),
        };
    }

    PrivilegeError::InstallFailed {
        message: format!("Elevated script failed: {}", output.diagnostic()),
        location: ErrorLocation::from(Location::caller()),
    }
}

/// systemd unit installer for Linux.
pub struct SystemdHelper {
    runner: Arc<dyn CommandRunner>,
    daemon_source: PathBuf,
}

impl SystemdHelper {
    pub fn new(runner: Arc<dyn CommandRunner>, daemon_source: PathBuf) -> Self {
        Self {
            runner,
            daemon_source,
        }
    }

    async fn run_elevated(&self, script: &str) -> Result<(), PrivilegeError> {
        let output = self.runner.run(PKEXEC, &args(["sh", "-c", script])).await?;
        if output.success() {
            Ok(())
        } else {
            Err(classify_pkexec_failure(&output))
        }
    }

    pub(crate) fn install_script(&self, staged_unit: &Path) -> String {
        let source = shell_quote(&self.daemon_source.to_string_lossy());
        let binary = shell_quote(INSTALLED_BINARY);
        let staged = shell_quote(&staged_unit.to_string_lossy());
        let unit = shell_quote(UNIT_PATH);

        [
            format!("install -m 755 -o root -g root {source} {binary}"),
            format!("install -m 644 -o root -g root {staged} {unit}"),
            format!("{SYSTEMCTL} daemon-reload"),
            format!("{SYSTEMCTL} enable {SERVICE_NAME}"),
            format!("{SYSTEMCTL} restart {SERVICE_NAME}"),
        ]
        .join(" && ")
    }
}

#[async_trait]
impl PrivilegedHelper for SystemdHelper {
    async fn state(&self) -> Result<PrivilegeState, PrivilegeError> {
        let helper_installed = Path::new(UNIT_PATH).is_file();
        let helper_valid = helper_installed
            && Path::new(INSTALLED_BINARY).is_file()
            && self
                .runner
                .run(SYSTEMCTL, &args(["is-active", "--quiet", SERVICE_NAME]))
                .await
                .is_ok_and(|output| output.success());

        Ok(PrivilegeState {
            helper_installed,
            helper_valid,
        })
    }

    async fn install(&self) -> Result<(), PrivilegeError> {
        require_daemon_source(&self.daemon_source)?;

        let mut arguments = Vec::new();
        if let Some(gid) = current_gid(&*self.runner).await {
            arguments.extend(args(["--socket-group".to_string(), gid.to_string()]));
        }

        let staged = std::env::temp_dir().join(format!("{SERVICE_NAME}.service"));
        std::fs::write(&staged, systemd_unit(INSTALLED_BINARY, &arguments))?;

        info!("Installing systemd unit {SERVICE_NAME}");
        let result = self.run_elevated(&self.install_script(&staged)).await;

        if let Err(e) = std::fs::remove_file(&staged) {
            debug!("Failed to remove staged unit: {e}");
        }
        result
    }

    async fn uninstall(&self) -> Result<(), PrivilegeError> {
        let script = [
            format!("({SYSTEMCTL} disable --now {SERVICE_NAME} || true)"),
            format!("rm -f {}", shell_quote(UNIT_PATH)),
            format!("rm -f {}", shell_quote(INSTALLED_BINARY)),
            format!("rm -f {}", shell_quote(DEFAULT_IPC_ENDPOINT)),
            format!("{SYSTEMCTL} daemon-reload"),
        ]
        .join(" && ");

        info!("Removing systemd unit {SERVICE_NAME}");
        self.run_elevated(&script).await.map_err(|e| match e {
            PrivilegeError::InstallFailed { message, location } => {
                PrivilegeError::UninstallFailed { message, location }
            }
            other => other,
        })
    }
}
