use supervisor_core::discovery::{
    SpawnOptions, ensure_port_available, is_port_in_use, is_process_alive, spawn_core, stop_pid,
};
use supervisor_core::error::{DiscoveryError, ErrorKind, SpawnError};

use std::net::TcpListener;

// ============================================================================
// Public API tests for process discovery and spawning
// ============================================================================

// ----------------------------------------------------------------------------
// stop_pid()
// ----------------------------------------------------------------------------

#[test]
fn given_nonexistent_pid_when_stop_pid_then_treated_as_gone() {
    assert!(stop_pid(u32::MAX));
    assert!(!is_process_alive(u32::MAX));
}

/// **VALUE**: PID 0, PID 1 and our own PID are never signalled.
///
/// **BUG THIS CATCHES**: A bad orphan record (PID 1 from a corrupt netstat
/// row) taking down init or the app itself.
#[test]
fn given_protected_pids_when_stop_pid_then_refused() {
    assert!(!stop_pid(0));
    assert!(!stop_pid(1));
    assert!(!stop_pid(std::process::id()));
    assert!(is_process_alive(std::process::id()));
}

// ----------------------------------------------------------------------------
// ensure_port_available()
// ----------------------------------------------------------------------------

#[test]
fn given_free_port_when_ensure_port_available_then_ok() {
    // GIVEN: A port that was free a moment ago
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    // WHEN / THEN
    assert!(ensure_port_available(port).is_ok());
}

/// **VALUE**: A port held by something that is not a core is reported, never killed.
///
/// **WHY THIS MATTERS**: The controller port might be taken by another user
/// application; stopping it would be destructive.
///
/// **BUG THIS CATCHES**: Treating every listener on the port as an orphan.
#[test]
fn given_foreign_listener_when_ensure_port_available_then_port_in_use() {
    // GIVEN: This test process listening on the port
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    assert!(is_port_in_use(port).unwrap());

    // WHEN
    let result = ensure_port_available(port);

    // THEN
    match result {
        Err(err @ DiscoveryError::PortInUse { .. }) => {
            assert_eq!(err.kind(), ErrorKind::PortInUse);
        }
        other => panic!("Expected PortInUse, got {other:?}"),
    }
    assert!(is_process_alive(std::process::id()));
}

// ----------------------------------------------------------------------------
// spawn_core()
// ----------------------------------------------------------------------------

#[test]
fn given_missing_binary_when_validate_then_binary_missing() {
    let dir = tempfile::tempdir().unwrap();
    let options = SpawnOptions {
        binary: dir.path().join("mihomo"),
        config_path: dir.path().join("config.yaml"),
        work_dir: dir.path().to_path_buf(),
        external_controller: "127.0.0.1:29090".to_string(),
    };

    let err = options.validate().unwrap_err();

    assert!(matches!(err, SpawnError::BinaryMissing { .. }));
    assert_eq!(err.kind(), ErrorKind::BinaryMissing);
}

#[tokio::test]
async fn given_missing_profile_when_spawn_core_then_config_invalid() {
    // GIVEN: A binary that exists and a profile that does not
    let dir = tempfile::tempdir().unwrap();
    let binary = dir.path().join("mihomo");
    std::fs::write(&binary, b"").unwrap();
    let options = SpawnOptions {
        binary,
        config_path: dir.path().join("config.yaml"),
        work_dir: dir.path().to_path_buf(),
        external_controller: "127.0.0.1:29090".to_string(),
    };

    // WHEN
    let result = spawn_core(&options);

    // THEN
    match result {
        Err(err) => assert_eq!(err.kind(), ErrorKind::ConfigInvalid),
        Ok(_) => panic!("Spawn should refuse a missing profile"),
    }
}
