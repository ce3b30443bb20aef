use crate::SERVICE_VERSION;
use crate::daemon::log_collector::parse_level;
use crate::daemon::{CoreManager, DaemonSettings, LogCollector, ServiceHandler};
use crate::discovery::OutputStream;
use crate::error::ErrorKind;
use crate::ipc::RequestHandler;
use crate::network::{DnsState, NetworkOverrideSnapshot, SnapshotStore};
use crate::tests::support::FakeNetwork;

use models::ipc::ipc_request::Method;
use models::ipc::ipc_response::Data;
use models::ipc::{IpcEmpty, IpcErrorKind, IpcGetLogs, IpcSetTunMode, IpcStartCore};

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn manager(dir: &TempDir, network: Arc<FakeNetwork>) -> Arc<CoreManager> {
    let settings = DaemonSettings {
        state_dir: dir.path().to_path_buf(),
        startup_timeout: Duration::from_millis(300),
        poll_interval: Duration::from_millis(50),
        ..Default::default()
    };
    Arc::new(CoreManager::new(settings, network))
}

// ============================================================================
// Log levels
// ============================================================================

#[test]
fn given_core_log_lines_when_parse_level_then_normalized() {
    assert_eq!(
        parse_level("time=\"..\" level=warn msg=\"dial failed\"", OutputStream::Stdout),
        "warning"
    );
    assert_eq!(parse_level("[ERROR] listener closed", OutputStream::Stdout), "error");
    assert_eq!(parse_level("level=debug msg=x", OutputStream::Stderr), "debug");
}

#[test]
fn given_unmarked_lines_when_parse_level_then_stream_default() {
    assert_eq!(parse_level("plain text", OutputStream::Stdout), "info");
    assert_eq!(parse_level("panic: boom", OutputStream::Stderr), "error");
}

/// **VALUE**: The ring never grows past its capacity and keeps the newest lines.
///
/// **BUG THIS CATCHES**: Dropping new lines instead of old ones, so `GetLogs`
/// shows only the first minutes after boot.
#[test]
fn given_full_collector_when_push_then_oldest_evicted() {
    // GIVEN
    let logs = LogCollector::with_capacity(3);

    // WHEN
    for i in 0..5 {
        logs.push(OutputStream::Stdout, &format!("line {i}"));
    }

    // THEN
    let messages: Vec<String> = logs.recent(None).into_iter().map(|e| e.message).collect();
    assert_eq!(messages, vec!["line 2", "line 3", "line 4"]);
    assert_eq!(logs.len(), 3);
}

#[test]
fn given_limit_when_recent_then_newest_returned_oldest_first() {
    let logs = LogCollector::new();
    for i in 0..4 {
        logs.push(OutputStream::Stdout, &format!("line {i}"));
    }

    let messages: Vec<String> = logs.recent(Some(2)).into_iter().map(|e| e.message).collect();

    assert_eq!(messages, vec!["line 2", "line 3"]);
    logs.clear();
    assert!(logs.is_empty());
}

// ============================================================================
// CoreManager
// ============================================================================

#[tokio::test]
async fn given_no_core_when_status_then_not_running() {
    let dir = tempfile::tempdir().unwrap();
    let core = manager(&dir, Arc::new(FakeNetwork::default()));

    let status = core.status().await;

    assert!(!status.running);
    assert_eq!(status.pid, None);
    assert!(!core.is_running().await);
}

#[tokio::test]
async fn given_never_started_when_restart_then_error() {
    let dir = tempfile::tempdir().unwrap();
    let core = manager(&dir, Arc::new(FakeNetwork::default()));

    let result = core.restart().await;

    assert!(result.is_err());
}

#[tokio::test]
async fn given_no_core_when_set_tun_mode_then_dns_untouched() {
    // GIVEN
    let dir = tempfile::tempdir().unwrap();
    let network = Arc::new(FakeNetwork::with_dns("Wi-Fi", &["1.1.1.1"]));
    let core = manager(&dir, network.clone());

    // WHEN
    let result = core.set_tun_mode(true, &["9.9.9.9".to_string()]).await;

    // THEN
    assert!(result.is_err());
    assert_eq!(network.servers(), vec!["1.1.1.1"]);
    assert!(!SnapshotStore::new(dir.path()).is_owed());
}

/// **VALUE**: Stopping always settles owed DNS, even when no core is running.
///
/// **WHY THIS MATTERS**: A daemon restarted after a crash with TUN on would
/// otherwise leave the machine resolving through a dead TUN resolver.
///
/// **BUG THIS CATCHES**: `stop` returning early when the slot is empty.
#[tokio::test]
async fn given_owed_snapshot_when_stop_then_dns_restored() {
    // GIVEN: A snapshot left by a previous run, DNS still overridden
    let dir = tempfile::tempdir().unwrap();
    let network = Arc::new(FakeNetwork::with_dns("Wi-Fi", &["223.6.6.6"]));
    let store = SnapshotStore::new(dir.path());
    store
        .save(&NetworkOverrideSnapshot::capture(&DnsState {
            scope: "Wi-Fi".to_string(),
            servers: vec!["8.8.8.8".to_string()],
        }))
        .unwrap();
    let core = manager(&dir, network.clone());

    // WHEN
    core.stop().await.unwrap();

    // THEN
    assert_eq!(network.servers(), vec!["8.8.8.8"]);
    assert!(!store.is_owed());
}

#[tokio::test]
async fn given_missing_binary_when_start_then_binary_missing_recorded() {
    // GIVEN
    let dir = tempfile::tempdir().unwrap();
    let core = manager(&dir, Arc::new(FakeNetwork::default()));
    let request = IpcStartCore {
        core_path: dir.path().join("mihomo").to_string_lossy().into_owned(),
        config_path: dir.path().join("config.yaml").to_string_lossy().into_owned(),
        work_dir: dir.path().to_string_lossy().into_owned(),
        external_controller: "127.0.0.1:29090".to_string(),
        secret: None,
    };

    // WHEN
    let err = core.start(request).await.unwrap_err();

    // THEN
    assert_eq!(err.kind(), ErrorKind::BinaryMissing);
    let status = core.status().await;
    assert!(!status.running);
    assert!(status.last_error.unwrap().contains("not found"));
}

// ============================================================================
// ServiceHandler
// ============================================================================

#[tokio::test]
async fn given_handler_when_ping_and_version_then_answered() {
    let dir = tempfile::tempdir().unwrap();
    let handler = ServiceHandler::new(
        manager(&dir, Arc::new(FakeNetwork::default())),
        CancellationToken::new(),
    );

    let pong = handler.handle(1, Method::Ping(IpcEmpty {})).await;
    let version = handler.handle(2, Method::GetVersion(IpcEmpty {})).await;

    assert!(pong.is_ok());
    assert_eq!(pong.request_id, 1);
    assert_eq!(version.data, Some(Data::Version(SERVICE_VERSION.to_string())));
}

#[tokio::test]
async fn given_logs_when_get_logs_then_limited_entries_returned() {
    // GIVEN
    let dir = tempfile::tempdir().unwrap();
    let core = manager(&dir, Arc::new(FakeNetwork::default()));
    core.logs().push(OutputStream::Stdout, "level=info msg=one");
    core.logs().push(OutputStream::Stderr, "two");
    let handler = ServiceHandler::new(core, CancellationToken::new());

    // WHEN
    let response = handler
        .handle(3, Method::GetLogs(IpcGetLogs { limit: Some(1) }))
        .await;

    // THEN
    match response.data {
        Some(Data::Logs(list)) => {
            assert_eq!(list.entries.len(), 1);
            assert_eq!(list.entries[0].message, "two");
            assert_eq!(list.entries[0].level, "error");
        }
        other => panic!("Expected logs, got {other:?}"),
    }
}

/// **VALUE**: Failures carry a wire error kind the app can classify.
///
/// **BUG THIS CATCHES**: A failed mutation encoded with `Unspecified`, which
/// the client would read as success.
#[tokio::test]
async fn given_no_core_when_set_tun_then_failure_kind_set() {
    let dir = tempfile::tempdir().unwrap();
    let handler = ServiceHandler::new(
        manager(&dir, Arc::new(FakeNetwork::default())),
        CancellationToken::new(),
    );

    let response = handler
        .handle(4, Method::SetTunMode(IpcSetTunMode {
            enabled: true,
            dns_servers: vec!["223.6.6.6".to_string()],
        }))
        .await;

    assert!(!response.is_ok());
    assert_eq!(response.error_kind, IpcErrorKind::ApiUnresponsive as i32);
}

#[tokio::test]
async fn given_handler_when_shutdown_then_token_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let token = CancellationToken::new();
    let handler = ServiceHandler::new(
        manager(&dir, Arc::new(FakeNetwork::default())),
        token.clone(),
    );

    let response = handler.handle(5, Method::Shutdown(IpcEmpty {})).await;

    assert!(response.is_ok());
    assert!(token.is_cancelled());
}
