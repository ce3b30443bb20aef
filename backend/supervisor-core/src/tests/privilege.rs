use crate::command::CommandOutput;
use crate::error::privilege::PrivilegeError;
use crate::privilege::launchd::{
    applescript_escape, classify_osascript_failure, launchd_plist,
};
use crate::privilege::systemd::{SystemdHelper, classify_pkexec_failure, systemd_unit};
use crate::privilege::windows_service::{
    classify_elevation_failure, install_script, ps_quote, uninstall_script,
};
use crate::privilege::{PrivilegedHelper, shell_quote};
use crate::tests::support::RecordingRunner;

use std::path::Path;
use std::sync::Arc;

fn failed(status: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        status: Some(status),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

// ============================================================================
// descriptors
// ============================================================================

#[test]
fn given_socket_group_when_launchd_plist_then_program_arguments_listed() {
    // GIVEN
    let arguments = vec!["--socket-group".to_string(), "20".to_string()];

    // WHEN
    let plist = launchd_plist("/Library/PrivilegedHelperTools/com.coreward.service", &arguments);

    // THEN
    assert!(plist.contains("<string>com.coreward.service</string>"));
    assert!(plist.contains(
        "<string>/Library/PrivilegedHelperTools/com.coreward.service</string>\n        <string>--socket-group</string>\n        <string>20</string>"
    ));
    assert!(plist.contains("<key>KeepAlive</key>\n    <true/>"));
    assert!(plist.contains("<string>/var/log/coreward-service.log</string>"));
}

#[test]
fn given_markup_in_path_when_launchd_plist_then_escaped() {
    let plist = launchd_plist("/opt/a&b/<daemon>", &[]);

    assert!(plist.contains("<string>/opt/a&amp;b/&lt;daemon&gt;</string>"));
}

#[test]
fn given_socket_group_when_systemd_unit_then_exec_start_carries_it() {
    let unit = systemd_unit(
        "/usr/local/bin/coreward-service",
        &["--socket-group".to_string(), "1000".to_string()],
    );

    assert!(unit.contains("ExecStart=/usr/local/bin/coreward-service --socket-group 1000\n"));
    assert!(unit.contains("Restart=on-failure"));
    assert!(unit.contains("WantedBy=multi-user.target"));
}

#[test]
fn given_paths_when_windows_install_script_then_service_registered_auto_start() {
    // GIVEN
    let source = Path::new(r"C:\Program Files\Coreward\coreward-service.exe");
    let target = Path::new(r"C:\ProgramData\coreward\coreward-service.exe");

    // WHEN
    let script = install_script(source, target);

    // THEN
    assert!(script.contains(r"Copy-Item -Force -Path 'C:\Program Files\Coreward\coreward-service.exe'"));
    assert!(script.contains("& sc.exe create coreward-service binPath= "));
    assert!(script.contains("start= auto"));
    assert!(script.ends_with("exit $LASTEXITCODE"));
    assert!(uninstall_script(target).contains("& sc.exe delete coreward-service"));
}

// ============================================================================
// quoting
// ============================================================================

/// **VALUE**: Quoting survives paths with quotes and spaces.
///
/// **WHY THIS MATTERS**: These scripts run as root. A path that breaks out of
/// its quotes runs arbitrary commands with admin rights.
///
/// **BUG THIS CATCHES**: Naive `'{}'` formatting of user-controlled paths.
#[test]
fn given_hostile_strings_when_quoted_then_stay_single_literals() {
    assert_eq!(shell_quote("/Users/o'brien/app"), r"'/Users/o'\''brien/app'");
    assert_eq!(ps_quote("C:\\it's"), "'C:\\it''s'");
    assert_eq!(
        applescript_escape(r#"echo "hi" \ there"#),
        r#"echo \"hi\" \\ there"#
    );
}

// ============================================================================
// elevation failures
// ============================================================================

#[test]
fn given_user_cancelled_osascript_when_classified_then_cancelled() {
    let error = classify_osascript_failure(&failed(1, "execution error: User canceled. (-128)"));
    assert!(matches!(error, PrivilegeError::Cancelled { .. }));

    let error = classify_osascript_failure(&failed(1, "launchctl: Bootstrap failed: 5"));
    assert!(matches!(error, PrivilegeError::InstallFailed { .. }));
}

#[test]
fn given_pkexec_dismissed_when_classified_then_cancelled() {
    assert!(matches!(
        classify_pkexec_failure(&failed(126, "")),
        PrivilegeError::Cancelled { .. }
    ));
    assert!(matches!(
        classify_pkexec_failure(&failed(1, "install: cannot stat")),
        PrivilegeError::InstallFailed { .. }
    ));
}

#[test]
fn given_uac_declined_when_classified_then_cancelled() {
    assert!(matches!(
        classify_elevation_failure(&failed(1, "The operation was canceled by the user.")),
        PrivilegeError::Cancelled { .. }
    ));
}

// ============================================================================
// systemd helper
// ============================================================================

#[tokio::test]
async fn given_missing_daemon_binary_when_install_then_helper_missing_without_prompt() {
    // GIVEN: No daemon next to the app
    let runner = Arc::new(RecordingRunner::default());
    let helper = SystemdHelper::new(runner.clone(), "/nonexistent/coreward-service".into());

    // WHEN
    let err = helper.install().await.unwrap_err();

    // THEN: Nothing was run, in particular no pkexec prompt
    assert!(matches!(err, PrivilegeError::HelperMissing { .. }));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn given_dismissed_prompt_when_install_then_cancelled_after_one_pkexec_call() {
    // GIVEN: A daemon binary and a user who closes the polkit dialog
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("coreward-service");
    std::fs::write(&source, b"#!/bin/sh\n").unwrap();
    let runner = Arc::new(RecordingRunner::default());
    runner.respond("id -g", "1000\n");
    runner.respond_with("pkexec", failed(126, ""));
    let helper = SystemdHelper::new(runner.clone(), source.clone());

    // WHEN
    let err = helper.install().await.unwrap_err();

    // THEN: Cancelled, and the script copied our binary into place
    assert!(matches!(err, PrivilegeError::Cancelled { .. }));
    let calls = runner.calls();
    assert_eq!(calls[0], "id -g");
    assert!(calls[1].starts_with("pkexec sh -c install -m 755"));
    assert!(calls[1].contains(&source.to_string_lossy().to_string()));
    assert!(calls[1].contains("systemctl enable coreward-service"));
}
