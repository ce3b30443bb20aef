use crate::command::{CommandOutput, CommandRunner, args};
use crate::error::privilege::PrivilegeError;
use crate::privilege::{PrivilegedHelper, current_gid, require_daemon_source, shell_quote};
use crate::{DEFAULT_IPC_ENDPOINT, SERVICE_LABEL, SERVICE_LOG_FILE};

use common::ErrorLocation;
use models::PrivilegeState;

use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use const_format::concatcp;
use log::{debug, info, warn};

pub const PLIST_PATH: &str = concatcp!("/Library/LaunchDaemons/", SERVICE_LABEL, ".plist");
pub const INSTALLED_BINARY: &str = concatcp!("/Library/PrivilegedHelperTools/", SERVICE_LABEL);
const SERVICE_TARGET: &str = concatcp!("system/", SERVICE_LABEL);
const LOG_PATH: &str = concatcp!("/var/log/", SERVICE_LOG_FILE);
const OSASCRIPT: &str = "osascript";
const LAUNCHCTL: &str = "launchctl";
const USER_CANCELLED_CODE: &str = "-128";
const USER_CANCELLED_TEXT: &str = "User canceled";

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escape a string for an AppleScript double-quoted literal.
pub(crate) fn applescript_escape(value: &str) -> String {
    value.replace('\\', r"\\").replace('"', "\\\"")
}

/// Descriptor that keeps the daemon running as root.
pub(crate) fn launchd_plist(program: &str, arguments: &[String]) -> String {
    let program_arguments: String = std::iter::once(program.to_string())
        .chain(arguments.iter().cloned())
        .map(|arg| format!("        <string>{}</string>\n", xml_escape(&arg)))
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{label}</string>
    <key>ProgramArguments</key>
    <array>
{program_arguments}    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <true/>
    <key>StandardErrorPath</key>
    <string>{log}</string>
</dict>
</plist>
"#,
        label = SERVICE_LABEL,
        log = LOG_PATH,
    )
}

/// `do shell script` failure → cancelled or failed.
#[track_caller]
pub(crate) fn classify_osascript_failure(output: &CommandOutput) -> PrivilegeError {
    let diagnostic = output.diagnostic();
    if diagnostic.contains(USER_CANCELLED_CODE) || diagnostic.contains(USER_CANCELLED_TEXT) {
        return PrivilegeError::Cancelled {
            message: "Administrator authorization was cancelled".to_string(),
            location: ErrorLocation::from(Location::caller()),
        };
    }

    PrivilegeError::InstallFailed {
        message: format!("Elevated script failed: {diagnostic}"),
        location: ErrorLocation::from(Location::caller()),
    }
}

/// LaunchDaemon installer for macOS.
pub struct LaunchdHelper {
    runner: Arc<dyn CommandRunner>,
    daemon_source: PathBuf,
}

impl LaunchdHelper {
    pub fn new(runner: Arc<dyn CommandRunner>, daemon_source: PathBuf) -> Self {
        Self {
            runner,
            daemon_source,
        }
    }

    async fn run_elevated(&self, script: &str) -> Result<(), PrivilegeError> {
        let apple_script = format!(
            "do shell script \"{}\" with administrator privileges",
            applescript_escape(script)
        );

        let output = self
            .runner
            .run(OSASCRIPT, &args(["-e", apple_script.as_str()]))
            .await?;

        if output.success() {
            Ok(())
        } else {
            Err(classify_osascript_failure(&output))
        }
    }

    async fn is_loaded(&self) -> bool {
        self.runner
            .run(LAUNCHCTL, &args(["print", SERVICE_TARGET]))
            .await
            .is_ok_and(|output| output.success())
    }

    pub(crate) fn install_script(&self, staged_plist: &Path) -> String {
        let source = shell_quote(&self.daemon_source.to_string_lossy());
        let staged = shell_quote(&staged_plist.to_string_lossy());
        let binary = shell_quote(INSTALLED_BINARY);
        let plist = shell_quote(PLIST_PATH);

        [
            "mkdir -p /Library/PrivilegedHelperTools".to_string(),
            format!("cp -f {source} {binary}"),
            format!("chown root:wheel {binary}"),
            format!("chmod 755 {binary}"),
            format!("cp -f {staged} {plist}"),
            format!("chown root:wheel {plist}"),
            format!("chmod 644 {plist}"),
            format!("(launchctl bootout {SERVICE_TARGET} 2>/dev/null || true)"),
            format!("launchctl bootstrap system {plist}"),
            format!("launchctl enable {SERVICE_TARGET}"),
            format!("launchctl kickstart -k {SERVICE_TARGET}"),
        ]
        .join(" && ")
    }
}

#[async_trait]
impl PrivilegedHelper for LaunchdHelper {
    async fn state(&self) -> Result<PrivilegeState, PrivilegeError> {
        let helper_installed = Path::new(PLIST_PATH).is_file();
        let helper_valid =
            helper_installed && Path::new(INSTALLED_BINARY).is_file() && self.is_loaded().await;

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

        let staged = std::env::temp_dir().join(format!("{SERVICE_LABEL}.plist"));
        std::fs::write(&staged, launchd_plist(INSTALLED_BINARY, &arguments))?;

        info!("Installing LaunchDaemon {SERVICE_LABEL}");
        let result = self.run_elevated(&self.install_script(&staged)).await;

        if let Err(e) = std::fs::remove_file(&staged) {
            debug!("Failed to remove staged plist: {e}");
        }
        result
    }

    async fn uninstall(&self) -> Result<(), PrivilegeError> {
        let script = [
            format!("(launchctl bootout {SERVICE_TARGET} 2>/dev/null || true)"),
            format!("rm -f {}", shell_quote(PLIST_PATH)),
            format!("rm -f {}", shell_quote(INSTALLED_BINARY)),
            format!("rm -f {}", shell_quote(DEFAULT_IPC_ENDPOINT)),
        ]
        .join(" && ");

        info!("Removing LaunchDaemon {SERVICE_LABEL}");
        self.run_elevated(&script).await.map_err(|e| match e {
            PrivilegeError::InstallFailed { message, location } => {
                warn!("LaunchDaemon removal failed: {message}");
                PrivilegeError::UninstallFailed { message, location }
            }
            other => other,
        })
    }
}
