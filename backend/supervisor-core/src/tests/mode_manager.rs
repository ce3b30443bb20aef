use crate::error::ErrorKind;
use crate::privilege::ModeManager;
use crate::tests::support::{FakeHelper, Harness, harness};

use models::{CoreEvent, CoreMode, CoreState};

use std::sync::Arc;

fn manager(h: &Harness, helper: Arc<FakeHelper>) -> ModeManager {
    ModeManager::new(
        helper,
        Arc::clone(&h.supervisor),
        h.events.clone(),
        h.ipc.clone(),
    )
}

// ============================================================================
// helper installation
// ============================================================================

/// **VALUE**: An installed helper that never answers the handshake is
/// removed again.
///
/// **WHY THIS MATTERS**: A half-installed root daemon that the app cannot
/// talk to is worse than none: service mode looks available but every call
/// fails.
///
/// **BUG THIS CATCHES**: Missing rollback, or the failure surfacing as an IPC
/// error instead of an installation failure.
#[tokio::test]
async fn given_silent_daemon_when_install_helper_then_rolled_back() {
    // GIVEN: A helper that installs fine but no daemon on the endpoint
    let h = harness(CoreMode::User).await;
    let helper = Arc::new(FakeHelper::default());
    let modes = manager(&h, helper.clone());

    // WHEN: Installing
    let err = modes.install_helper().await.unwrap_err();

    // THEN: PrivilegeInstallFailed and the installation undone
    assert_eq!(err.kind(), ErrorKind::PrivilegeInstallFailed);
    assert_eq!(helper.installs(), 1);
    assert_eq!(helper.uninstalls(), 1);
    assert!(!modes.helper_status().await.unwrap().is_ready());
}

/// **VALUE**: Switching to service mode without a working helper changes
/// nothing.
///
/// **BUG THIS CATCHES**: Preference saved as Service even though the switch
/// failed, so the next launch tries service mode again.
#[tokio::test]
async fn given_missing_helper_when_set_service_mode_fails_then_mode_unchanged() {
    // GIVEN: No helper and no daemon
    let h = harness(CoreMode::User).await;
    let modes = manager(&h, Arc::new(FakeHelper::default()));

    // WHEN: Requesting service mode
    let err = modes.set_mode(CoreMode::Service).await.unwrap_err();

    // THEN: Still user mode, both active and desired
    assert_eq!(err.kind(), ErrorKind::PrivilegeInstallFailed);
    assert_eq!(modes.get_mode().await, CoreMode::User);
    assert_eq!(modes.get_desired_mode().await, CoreMode::User);
    assert!(h.events.events().is_empty());
}

#[tokio::test]
async fn given_cancelled_prompt_when_install_helper_then_no_rollback_needed() {
    // GIVEN: The user dismisses the elevation prompt
    let h = harness(CoreMode::User).await;
    let helper = Arc::new(FakeHelper::default());
    *helper.cancel_install.lock().unwrap() = true;
    let modes = manager(&h, helper.clone());

    // WHEN: Installing
    let err = modes.install_helper().await.unwrap_err();

    // THEN: Reported as an install failure, nothing to undo
    assert_eq!(err.kind(), ErrorKind::PrivilegeInstallFailed);
    assert_eq!(helper.uninstalls(), 0);
}

// ============================================================================
// mode switching
// ============================================================================

#[tokio::test]
async fn given_ready_helper_when_set_service_mode_then_active_and_desired_agree() {
    // GIVEN: An installed helper
    let h = harness(CoreMode::User).await;
    let modes = manager(&h, Arc::new(FakeHelper::installed()));

    // WHEN: Switching to service mode
    let status = modes.set_mode(CoreMode::Service).await.unwrap();

    // THEN: Both modes are Service and the change is announced
    assert_eq!(status.mode, CoreMode::Service);
    assert_eq!(modes.get_mode().await, CoreMode::Service);
    assert_eq!(modes.get_desired_mode().await, CoreMode::Service);
    assert_eq!(
        h.events.events(),
        vec![CoreEvent::CoreModeChanged {
            mode: CoreMode::Service
        }]
    );
}

/// **VALUE**: Going back to user mode drops the TUN preference.
///
/// **BUG THIS CATCHES**: TUN left on in config, so the next service-mode
/// start silently re-enables it.
#[tokio::test]
async fn given_service_mode_with_tun_when_set_user_mode_then_tun_cleared() {
    // GIVEN: Service mode with TUN preferred
    let h = harness(CoreMode::Service).await;
    h.config.update(|c| c.mode.tun_enabled = true).await.unwrap();
    let modes = manager(&h, Arc::new(FakeHelper::installed()));

    // WHEN: Switching to user mode
    modes.set_mode(CoreMode::User).await.unwrap();

    // THEN: TUN preference gone
    let config = h.config.get().await;
    assert_eq!(config.mode.preferred, CoreMode::User);
    assert!(!config.mode.tun_enabled);
}

/// **VALUE**: Turning TUN on from user mode moves the core to the daemon.
///
/// **WHY THIS MATTERS**: TUN needs root. The user asks for TUN, not for a
/// mode switch; the switch has to happen for them.
///
/// **BUG THIS CATCHES**: TUN refused outright in user mode, or enabled on a
/// user-mode core that cannot create the interface.
#[tokio::test]
async fn given_running_user_core_when_enable_tun_then_service_core_runs_with_tun() {
    // GIVEN: A running user-mode core and a ready helper
    let h = harness(CoreMode::User).await;
    h.supervisor.start(None).await.unwrap();
    let modes = manager(&h, Arc::new(FakeHelper::installed()));

    // WHEN: Enabling TUN
    let enabled = modes.set_tun_mode(true).await.unwrap();

    // THEN: User core stopped, service core running with TUN on
    assert!(enabled);
    assert!(!h.user.is_running());
    assert!(h.service.is_running());
    assert!(h.service.tun());
    assert_eq!(modes.get_mode().await, CoreMode::Service);
    assert!(h.config.get().await.mode.tun_enabled);
}

/// **VALUE**: Enabling TUN also makes service mode the persisted preference.
///
/// **WHY THIS MATTERS**: If the preference still says user, the next launch
/// boots a user-mode core that cannot open the TUN device it was asked for.
///
/// **BUG THIS CATCHES**: Only the active mode being consulted, so a service
/// core with a stale user preference gets TUN without fixing the preference.
#[tokio::test]
async fn given_service_core_with_user_preference_when_enable_tun_then_preference_service() {
    // GIVEN: Service mode active, preference drifted back to user
    let h = harness(CoreMode::Service).await;
    h.supervisor.start(None).await.unwrap();
    h.config
        .update(|c| c.mode.preferred = CoreMode::User)
        .await
        .unwrap();
    let modes = manager(&h, Arc::new(FakeHelper::installed()));

    // WHEN
    let enabled = modes.set_tun_mode(true).await.unwrap();

    // THEN: TUN on, both modes agree on service, core not relaunched
    assert!(enabled);
    assert!(h.service.tun());
    assert_eq!(modes.get_mode().await, CoreMode::Service);
    assert_eq!(modes.get_desired_mode().await, CoreMode::Service);
    assert_eq!(h.service.starts(), 1);
}

#[tokio::test]
async fn given_cancelled_elevation_when_enable_tun_then_user_core_keeps_running() {
    // GIVEN: A running user-mode core and a helper the user will refuse
    let h = harness(CoreMode::User).await;
    h.supervisor.start(None).await.unwrap();
    let helper = Arc::new(FakeHelper::default());
    *helper.cancel_install.lock().unwrap() = true;
    let modes = manager(&h, helper);

    // WHEN: Enabling TUN
    let result = modes.set_tun_mode(true).await;

    // THEN: Nothing changed
    assert!(result.is_err());
    assert!(h.user.is_running());
    assert_eq!(modes.get_mode().await, CoreMode::User);
    assert!(!h.config.get().await.mode.tun_enabled);
}

#[tokio::test]
async fn given_service_mode_when_uninstall_helper_then_back_to_user_mode() {
    // GIVEN: A running service-mode core
    let h = harness(CoreMode::Service).await;
    h.supervisor.start(None).await.unwrap();
    let helper = Arc::new(FakeHelper::installed());
    let modes = manager(&h, helper.clone());

    // WHEN: Removing the helper
    let state = modes.uninstall_helper().await.unwrap();

    // THEN: Helper gone, service core stopped, user mode active
    assert!(!state.helper_installed);
    assert_eq!(helper.uninstalls(), 1);
    assert!(!h.service.is_running());
    assert_eq!(modes.get_mode().await, CoreMode::User);
}

// ============================================================================
// bootstrap
// ============================================================================

#[tokio::test]
async fn given_user_preference_when_bootstrap_then_core_auto_started() {
    // GIVEN: User mode preferred
    let h = harness(CoreMode::User).await;
    let modes = manager(&h, Arc::new(FakeHelper::default()));

    // WHEN: The app starts
    let status = modes.bootstrap().await.unwrap();

    // THEN: Core running in user mode
    assert_eq!(status.state, CoreState::Running);
    assert_eq!(h.user.starts(), 1);
    h.supervisor.stop_health_polling().await;
}

/// **VALUE**: A service preference without a helper does not auto-start.
///
/// **BUG THIS CATCHES**: Launch popping an elevation prompt, or falling back
/// to user mode without being asked.
#[tokio::test]
async fn given_service_preference_without_helper_when_bootstrap_then_stays_stopped() {
    // GIVEN: Service mode preferred, helper missing
    let h = harness(CoreMode::Service).await;
    let helper = Arc::new(FakeHelper::default());
    let modes = manager(&h, helper.clone());

    // WHEN: The app starts
    let status = modes.bootstrap().await.unwrap();

    // THEN: Stopped, no install attempted
    assert_eq!(status.state, CoreState::Stopped);
    assert_eq!(status.mode, CoreMode::Service);
    assert_eq!(helper.installs(), 0);
    assert_eq!(h.service.starts(), 0);
    h.supervisor.stop_health_polling().await;
}

#[tokio::test]
async fn given_orphan_when_bootstrap_then_adopted_not_started() {
    // GIVEN: A leftover core on the control port
    let h = harness(CoreMode::User).await;
    h.user.core.lock().unwrap().orphan = true;
    let modes = manager(&h, Arc::new(FakeHelper::default()));

    // WHEN: The app starts
    let status = modes.bootstrap().await.unwrap();

    // THEN: Adopted
    assert_eq!(status.state, CoreState::Running);
    assert_eq!(status.pid, Some(777));
    assert_eq!(h.user.starts(), 0);
    h.supervisor.stop_health_polling().await;
}
