#![cfg(unix)]

use supervisor_core::SERVICE_VERSION;
use supervisor_core::daemon::{CoreManager, DaemonSettings, ServiceHandler};
use supervisor_core::discovery::OutputStream;
use supervisor_core::error::{ErrorKind, NetworkError};
use supervisor_core::ipc::{IpcClient, IpcClientConfig, IpcServer};
use supervisor_core::network::{DnsState, NetworkConfigurator, ProxySettings, ProxyStatus};

use models::ipc::IpcStartCore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serial_test::serial;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// ============================================================================
// The daemon's request handler served over a real socket
// ============================================================================

/// The daemon tests never reach the OS network settings.
struct UntouchedNetwork;

#[async_trait]
impl NetworkConfigurator for UntouchedNetwork {
    async fn set_system_proxy(&self, _: &ProxySettings, _: bool) -> Result<(), NetworkError> {
        Ok(())
    }

    async fn get_system_proxy_status(&self) -> Result<ProxyStatus, NetworkError> {
        Ok(ProxyStatus::default())
    }

    async fn current_dns(&self) -> Result<DnsState, NetworkError> {
        Ok(DnsState {
            scope: "eth0".to_string(),
            servers: Vec::new(),
        })
    }

    async fn set_dns(&self, _: &str, _: &[String]) -> Result<(), NetworkError> {
        Ok(())
    }

    async fn reset_dns(&self, _: &str) -> Result<(), NetworkError> {
        Ok(())
    }
}

struct Daemon {
    dir: TempDir,
    core: Arc<CoreManager>,
    client: IpcClient,
    shutdown: CancellationToken,
    serving: JoinHandle<()>,
}

async fn start_daemon() -> Daemon {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = dir.path().join("daemon.sock").to_string_lossy().into_owned();

    let core = Arc::new(CoreManager::new(
        DaemonSettings {
            state_dir: dir.path().join("state"),
            startup_timeout: Duration::from_millis(300),
            ..Default::default()
        },
        Arc::new(UntouchedNetwork),
    ));

    let server = IpcServer::bind(&endpoint).expect("bind daemon socket");
    let shutdown = server.shutdown_token();
    let handler = Arc::new(ServiceHandler::new(Arc::clone(&core), shutdown.clone()));
    let serving = tokio::spawn(async move {
        let _ = server.serve(handler).await;
    });

    let client = IpcClient::new(IpcClientConfig {
        endpoint,
        timeout: Duration::from_secs(2),
        max_attempts: 2,
        retry_delay: Duration::from_millis(20),
    });

    Daemon {
        dir,
        core,
        client,
        shutdown,
        serving,
    }
}

#[tokio::test]
#[serial]
async fn given_idle_daemon_when_queried_then_reports_not_running() {
    let daemon = start_daemon().await;

    assert_eq!(daemon.client.version().await.unwrap(), SERVICE_VERSION);
    assert!(!daemon.client.is_running().await.unwrap());
    assert!(!daemon.client.status().await.unwrap().running);

    daemon.shutdown.cancel();
}

/// **VALUE**: Core output captured by the daemon is retrievable over IPC.
///
/// **BUG THIS CATCHES**: The handler reading from a different collector than
/// the one the core's output is forwarded into.
#[tokio::test]
#[serial]
async fn given_core_output_when_get_logs_then_entries_returned_and_clearable() {
    // GIVEN
    let daemon = start_daemon().await;
    daemon
        .core
        .logs()
        .push(OutputStream::Stdout, "level=info msg=\"Start initial configuration\"");
    daemon
        .core
        .logs()
        .push(OutputStream::Stdout, "level=warn msg=\"dial tcp timeout\"");

    // WHEN
    let entries = daemon.client.logs(None).await.unwrap();
    daemon.client.clear_logs().await.unwrap();

    // THEN
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].level, "warning");
    assert!(daemon.client.logs(None).await.unwrap().is_empty());

    daemon.shutdown.cancel();
}

/// **VALUE**: A start the daemon cannot perform is reported with its category.
///
/// **WHY THIS MATTERS**: The app maps BinaryMissing to a "reinstall" hint and
/// must not confuse it with a transient IPC problem.
///
/// **BUG THIS CATCHES**: The handler replying with a generic Internal kind.
#[tokio::test]
#[serial]
async fn given_missing_binary_when_start_core_then_binary_missing() {
    // GIVEN
    let daemon = start_daemon().await;
    let request = IpcStartCore {
        core_path: daemon.dir.path().join("mihomo").to_string_lossy().into_owned(),
        config_path: daemon.dir.path().join("config.yaml").to_string_lossy().into_owned(),
        work_dir: daemon.dir.path().to_string_lossy().into_owned(),
        external_controller: "127.0.0.1:29090".to_string(),
        secret: None,
    };

    // WHEN
    let err = daemon.client.start_core(request).await.unwrap_err();

    // THEN
    assert_eq!(err.kind(), ErrorKind::BinaryMissing);
    let status = daemon.client.status().await.unwrap();
    assert!(status.last_error.is_some());

    daemon.shutdown.cancel();
}

#[tokio::test]
#[serial]
async fn given_daemon_when_shutdown_requested_then_serve_loop_ends() {
    // GIVEN
    let daemon = start_daemon().await;

    // WHEN
    daemon.client.shutdown().await.unwrap();

    // THEN
    tokio::time::timeout(Duration::from_secs(2), daemon.serving)
        .await
        .expect("serve loop should end after Shutdown")
        .unwrap();
    assert!(daemon.shutdown.is_cancelled());
}
