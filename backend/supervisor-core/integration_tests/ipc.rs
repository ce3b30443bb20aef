#![cfg(unix)]

use supervisor_core::SERVICE_VERSION;
use supervisor_core::error::{ErrorKind, IpcError};
use supervisor_core::ipc::transport::connect;
use supervisor_core::ipc::{
    FramedStream, IpcClient, IpcClientConfig, IpcServer, MAX_FRAME_LEN, RequestHandler,
};

use models::ipc::ipc_request::Method;
use models::ipc::ipc_response::Data;
use models::ipc::{IpcCoreStatus, IpcEmpty, IpcErrorKind, IpcResponse};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serial_test::serial;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Framed request/response over a real Unix socket
// ============================================================================

/// Answers like a daemon with no core running. `StartCore` is refused so the
/// failure path can be exercised.
#[derive(Default)]
struct IdleDaemon {
    calls: AtomicUsize,
}

#[async_trait]
impl RequestHandler for IdleDaemon {
    async fn handle(&self, request_id: u64, method: Method) -> IpcResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match method {
            Method::Ping(_) => IpcResponse::ok_with(request_id, "pong", Data::Pong(IpcEmpty {})),
            Method::GetVersion(_) => IpcResponse::ok_with(
                request_id,
                SERVICE_VERSION,
                Data::Version(SERVICE_VERSION.to_string()),
            ),
            Method::GetStatus(_) => IpcResponse::ok_with(
                request_id,
                "",
                Data::Status(IpcCoreStatus::default()),
            ),
            Method::IsRunning(_) => IpcResponse::ok_with(request_id, "", Data::Flag(false)),
            Method::StartCore(_) => IpcResponse::failure(
                request_id,
                IpcErrorKind::BinaryMissing,
                "Core binary not found at /nowhere/mihomo",
            ),
            _ => IpcResponse::ok(request_id, "ok"),
        }
    }
}

struct RunningServer {
    _dir: TempDir,
    endpoint: String,
    shutdown: CancellationToken,
    handler: Arc<IdleDaemon>,
}

impl RunningServer {
    fn client(&self) -> IpcClient {
        IpcClient::new(IpcClientConfig {
            endpoint: self.endpoint.clone(),
            timeout: Duration::from_secs(2),
            max_attempts: 3,
            retry_delay: Duration::from_millis(20),
        })
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn start_server() -> RunningServer {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = dir
        .path()
        .join("coreward-test.sock")
        .to_string_lossy()
        .into_owned();

    let server = IpcServer::bind(&endpoint).expect("bind test socket");
    let shutdown = server.shutdown_token();
    let handler = Arc::new(IdleDaemon::default());
    tokio::spawn(server.serve(Arc::clone(&handler)));

    RunningServer {
        _dir: dir,
        endpoint,
        shutdown,
        handler,
    }
}

/// **VALUE**: The handshake pair the app runs after installing the helper
/// works end to end.
///
/// **WHY THIS MATTERS**: Service mode is only entered after this succeeds; if
/// it breaks, every install is rolled back.
///
/// **BUG THIS CATCHES**: Framing or length-prefix endianness mismatches
/// between the client and the server.
#[tokio::test]
#[serial]
async fn given_server_when_ping_and_version_then_handshake_succeeds() {
    // GIVEN
    let server = start_server().await;
    let client = server.client();

    // WHEN
    client.ping().await.unwrap();
    let version = client.version().await.unwrap();

    // THEN
    assert_eq!(version, SERVICE_VERSION);
    assert_eq!(server.handler.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
#[serial]
async fn given_server_when_typed_queries_then_payloads_decoded() {
    let server = start_server().await;
    let client = server.client();

    let status = client.status().await.unwrap();
    let running = client.is_running().await.unwrap();

    assert!(!status.running);
    assert!(!running);
}

/// **VALUE**: A daemon-side failure comes back with its category intact.
///
/// **BUG THIS CATCHES**: The client treating any decoded response as success,
/// or collapsing every remote failure into Internal.
#[tokio::test]
#[serial]
async fn given_remote_failure_when_start_core_then_kind_preserved() {
    // GIVEN
    let server = start_server().await;

    // WHEN
    let err = server
        .client()
        .start_core(Default::default())
        .await
        .unwrap_err();

    // THEN
    match &err {
        IpcError::Remote { kind, message, .. } => {
            assert_eq!(*kind, IpcErrorKind::BinaryMissing);
            assert!(message.contains("not found"));
        }
        other => panic!("Expected Remote, got {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::BinaryMissing);
}

/// **VALUE**: An oversized frame is refused with PayloadTooLarge before any
/// payload is buffered.
///
/// **BUG THIS CATCHES**: The server allocating whatever length a peer claims.
#[tokio::test]
#[serial]
async fn given_oversized_header_when_sent_then_payload_too_large() {
    // GIVEN
    let server = start_server().await;
    let mut stream = connect(&server.endpoint).await.unwrap();

    // WHEN: Only a header claiming more than the limit
    let claimed = (MAX_FRAME_LEN as u32) + 1;
    stream.write_all(&claimed.to_le_bytes()).await.unwrap();
    let mut framed = FramedStream::new(stream);
    let response: IpcResponse = framed.recv().await.unwrap().expect("rejection frame");

    // THEN
    assert_eq!(response.error_kind, IpcErrorKind::PayloadTooLarge as i32);
    assert_eq!(server.handler.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
#[serial]
async fn given_no_server_when_call_then_unreachable_after_attempts() {
    // GIVEN
    let dir = tempfile::tempdir().unwrap();
    let client = IpcClient::new(IpcClientConfig {
        endpoint: dir.path().join("absent.sock").to_string_lossy().into_owned(),
        timeout: Duration::from_millis(200),
        max_attempts: 2,
        retry_delay: Duration::from_millis(10),
    });

    // WHEN
    let err = client.ping().await.unwrap_err();

    // THEN
    assert!(matches!(err, IpcError::Unreachable { attempts: 2, .. }));
    assert_eq!(err.kind(), ErrorKind::IpcUnreachable);
}

#[tokio::test]
#[serial]
async fn given_live_server_when_bind_same_endpoint_then_refused() {
    let server = start_server().await;

    let second = IpcServer::bind(&server.endpoint);

    assert!(matches!(second, Err(IpcError::Bind { .. })));
}

#[tokio::test]
#[serial]
async fn given_server_shutdown_when_cancelled_then_socket_removed() {
    // GIVEN
    let server = start_server().await;
    server.client().ping().await.unwrap();

    // WHEN
    server.shutdown.cancel();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // THEN
    assert!(!std::path::Path::new(&server.endpoint).exists());
}
