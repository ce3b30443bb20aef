use crate::SERVICE_VERSION;
use crate::daemon::CoreManager;
use crate::error::CoreError;
use crate::ipc::RequestHandler;

use models::ipc::ipc_request::Method;
use models::ipc::ipc_response::Data;
use models::ipc::{IpcEmpty, IpcLogList, IpcResponse};

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

/// Maps IPC methods onto the daemon's [`CoreManager`].
pub struct ServiceHandler {
    core: Arc<CoreManager>,
    shutdown: CancellationToken,
}

impl ServiceHandler {
    /// `shutdown` is cancelled when a client sends `Shutdown`.
    pub fn new(core: Arc<CoreManager>, shutdown: CancellationToken) -> Self {
        Self { core, shutdown }
    }
}

fn failure(request_id: u64, method: &'static str, error: CoreError) -> IpcResponse {
    warn!("{method} failed: {error}");
    IpcResponse::failure(request_id, error.kind().to_ipc(), error.to_string())
}

#[async_trait]
impl RequestHandler for ServiceHandler {
    async fn handle(&self, request_id: u64, method: Method) -> IpcResponse {
        let name = method.name();

        match method {
            Method::Ping(_) => IpcResponse::ok_with(request_id, "pong", Data::Pong(IpcEmpty {})),
            Method::GetVersion(_) => IpcResponse::ok_with(
                request_id,
                SERVICE_VERSION,
                Data::Version(SERVICE_VERSION.to_string()),
            ),
            Method::StartCore(start) => match self.core.start(start).await {
                Ok(status) => IpcResponse::ok_with(request_id, "Core started", Data::Status(status)),
                Err(e) => failure(request_id, name, e),
            },
            Method::StopCore(_) => match self.core.stop().await {
                Ok(()) => IpcResponse::ok(request_id, "Core stopped"),
                Err(e) => failure(request_id, name, e),
            },
            Method::RestartCore(_) => match self.core.restart().await {
                Ok(status) => {
                    IpcResponse::ok_with(request_id, "Core restarted", Data::Status(status))
                }
                Err(e) => failure(request_id, name, e),
            },
            Method::ReloadConfig(reload) => {
                match self.core.reload_config(Path::new(&reload.config_path)).await {
                    Ok(()) => IpcResponse::ok(request_id, "Config reloaded"),
                    Err(e) => failure(request_id, name, e),
                }
            }
            Method::GetStatus(_) => {
                IpcResponse::ok_with(request_id, "", Data::Status(self.core.status().await))
            }
            Method::GetLogs(query) => {
                let entries = self.core.logs().recent(query.limit.map(|l| l as usize));
                IpcResponse::ok_with(request_id, "", Data::Logs(IpcLogList { entries }))
            }
            Method::ClearLogs(_) => {
                self.core.logs().clear();
                IpcResponse::ok(request_id, "Logs cleared")
            }
            Method::IsRunning(_) => {
                IpcResponse::ok_with(request_id, "", Data::Flag(self.core.is_running().await))
            }
            Method::SetTunMode(tun) => match self.core.set_tun_mode(tun.enabled, &tun.dns_servers).await {
                Ok(()) => IpcResponse::ok_with(request_id, "TUN updated", Data::Flag(tun.enabled)),
                Err(e) => failure(request_id, name, e),
            },
            Method::Shutdown(_) => {
                info!("Shutdown requested over IPC");
                self.shutdown.cancel();
                IpcResponse::ok(request_id, "Shutting down")
            }
        }
    }
}
