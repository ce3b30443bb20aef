#![cfg(unix)]

use supervisor_core::config::{AppConfig, ConfigStore};
use supervisor_core::error::{CoreError, ErrorKind, IpcError, NetworkError};
use supervisor_core::events::EventSink;
use supervisor_core::ipc::{IpcClient, IpcClientConfig, IpcServer, RequestHandler};
use supervisor_core::network::{DnsState, NetworkConfigurator, ProxySettings, ProxyStatus};
use supervisor_core::supervisor::{Backends, CoreBackend, ServiceBackend, Supervisor, UserBackend};

use models::ipc::ipc_request::Method;
use models::ipc::ipc_response::Data;
use models::ipc::{IpcCoreStatus, IpcResponse};
use models::{CoreEvent, CoreMode, CoreState};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serial_test::serial;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ============================================================================
// A daemon whose core refuses to die in time
// ============================================================================

const CORE_PID: u32 = 42;

/// Reports a running core and never answers `StopCore` within the deadline.
struct StubbornDaemon;

#[async_trait]
impl RequestHandler for StubbornDaemon {
    async fn handle(&self, request_id: u64, method: Method) -> IpcResponse {
        match method {
            Method::StopCore(_) => {
                tokio::time::sleep(Duration::from_secs(2)).await;
                IpcResponse::ok(request_id, "stopped")
            }
            Method::StartCore(_) | Method::GetStatus(_) => IpcResponse::ok_with(
                request_id,
                "",
                Data::Status(IpcCoreStatus {
                    running: true,
                    pid: Some(CORE_PID),
                    version: Some("v1.19.0".to_string()),
                    ..Default::default()
                }),
            ),
            _ => IpcResponse::ok(request_id, "ok"),
        }
    }
}

struct NoNetwork;

#[async_trait]
impl NetworkConfigurator for NoNetwork {
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

#[derive(Default)]
struct Events(Mutex<Vec<&'static str>>);

impl EventSink for Events {
    fn emit(&self, event: CoreEvent) {
        self.0.lock().unwrap().push(event.name());
    }
}

struct Daemon {
    dir: TempDir,
    endpoint: String,
    shutdown: CancellationToken,
}

impl Daemon {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = dir.path().join("stubborn.sock").to_string_lossy().into_owned();

        let server = IpcServer::bind(&endpoint).expect("bind test socket");
        let shutdown = server.shutdown_token();
        tokio::spawn(server.serve(Arc::new(StubbornDaemon)));

        Self {
            dir,
            endpoint,
            shutdown,
        }
    }

    fn client(&self) -> IpcClient {
        IpcClient::new(IpcClientConfig {
            endpoint: self.endpoint.clone(),
            timeout: Duration::from_millis(200),
            max_attempts: 1,
            retry_delay: Duration::from_millis(10),
        })
    }

    fn backend(&self) -> ServiceBackend {
        ServiceBackend::new(self.client()).with_stop_window(Duration::ZERO)
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// **VALUE**: A handler slower than the deadline surfaces as a timeout.
///
/// **BUG THIS CATCHES**: The client waiting forever on a hung daemon, or
/// reporting the hang as unreachable so it gets blindly retried.
#[tokio::test]
#[serial]
async fn given_slow_handler_when_stop_core_then_ipc_timeout() {
    // GIVEN
    let daemon = Daemon::start().await;

    // WHEN
    let err = daemon.client().stop_core().await.unwrap_err();

    // THEN
    assert!(matches!(err, IpcError::Timeout { method: "stop_core", .. }));
    assert_eq!(err.kind(), ErrorKind::IpcTimeout);
}

/// **VALUE**: A stop the daemon cannot confirm is a failure when the daemon
/// still reports the core alive.
///
/// **WHY THIS MATTERS**: Reporting success here hides a core that keeps
/// routing traffic and holding the controller port.
///
/// **BUG THIS CATCHES**: Treating the status re-check after a timeout as
/// proof of success regardless of what it says.
#[tokio::test]
#[serial]
async fn given_core_survives_timed_out_stop_when_backend_stop_then_timeout_error() {
    // GIVEN
    let daemon = Daemon::start().await;
    let backend = daemon.backend();

    // WHEN
    let err = backend.stop().await.unwrap_err();

    // THEN
    assert_eq!(err.kind(), ErrorKind::IpcTimeout);
    assert!(err.to_string().contains("still reports the core running"));
}

/// **VALUE**: The supervisor keeps showing the live core after such a stop.
///
/// **BUG THIS CATCHES**: Status flipping to Stopped, and `core-stopped` being
/// emitted, while the daemon's core is still up.
#[tokio::test]
#[serial]
async fn given_core_survives_timed_out_stop_when_supervisor_stop_then_status_unchanged() {
    // GIVEN: A service-mode supervisor with a running core
    let daemon = Daemon::start().await;
    let profile = daemon.dir.path().join("config.yaml");
    std::fs::write(&profile, "mixed-port: 7890\nexternal-controller: 127.0.0.1:1\n").unwrap();

    let mut config = AppConfig::default();
    config.core.config_path = profile;
    config.core.work_dir = daemon.dir.path().to_path_buf();
    config.mode.preferred = CoreMode::Service;

    let events = Arc::new(Events::default());
    let supervisor = Supervisor::new(
        ConfigStore::new(daemon.dir.path().to_path_buf(), config),
        Backends {
            user: Arc::new(UserBackend::new(daemon.dir.path().join("logs"))),
            service: Arc::new(daemon.backend()),
        },
        Arc::new(NoNetwork),
        events.clone(),
        daemon.client(),
    )
    .await;
    let started = supervisor.start(None).await.unwrap();
    assert_eq!(started.pid, Some(CORE_PID));

    // WHEN
    let result: Result<_, CoreError> = supervisor.stop().await;

    // THEN
    assert_eq!(result.unwrap_err().kind(), ErrorKind::IpcTimeout);
    let status = supervisor.status().await.unwrap();
    assert_eq!(status.state, CoreState::Running);
    assert_eq!(status.pid, Some(CORE_PID));
    assert!(!events.0.lock().unwrap().contains(&"core-stopped"));
}
