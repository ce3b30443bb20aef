use crate::error::ipc::IpcError;
use crate::ipc::frame::{Frame, FramedStream, MAX_FRAME_LEN};
use crate::ipc::transport::{IpcListener, ServerStream};

use models::ipc::ipc_request::Method;
use models::ipc::{IpcErrorKind, IpcRequest, IpcResponse};

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use prost::Message as ProstMessage;
use tokio::spawn as TokioSpawn;
use tokio_util::sync::CancellationToken;

/// Daemon-side dispatch of decoded requests.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, request_id: u64, method: Method) -> IpcResponse;
}

/// Accept loop for the daemon endpoint. Each connection is served on its own task.
pub struct IpcServer {
    listener: IpcListener,
    shutdown: CancellationToken,
}

impl IpcServer {
    pub fn bind(endpoint: &str) -> Result<Self, IpcError> {
        Self::bind_with_group(endpoint, None)
    }

    pub fn bind_with_group(endpoint: &str, group: Option<u32>) -> Result<Self, IpcError> {
        Ok(Self {
            listener: IpcListener::bind_with_group(endpoint, group)?,
            shutdown: CancellationToken::new(),
        })
    }

    /// Cancelling this token stops the accept loop and open connections.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serve until the shutdown token is cancelled. The endpoint is released
    /// when this returns.
    pub async fn serve<H: RequestHandler>(mut self, handler: Arc<H>) -> Result<(), IpcError> {
        info!("IPC server accepting connections");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("IPC server shutting down");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(stream) => {
                        TokioSpawn(handle_connection(
                            stream,
                            Arc::clone(&handler),
                            self.shutdown.child_token(),
                        ));
                    }
                    Err(e) => warn!("Failed to accept IPC connection: {e}"),
                },
            }
        }

        Ok(())
    }
}

async fn handle_connection<H: RequestHandler>(
    stream: ServerStream,
    handler: Arc<H>,
    shutdown: CancellationToken,
) {
    let mut framed = FramedStream::new(stream);

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => return,
            frame = framed.recv_frame() => frame,
        };

        let response = match frame {
            Ok(None) => {
                debug!("IPC client disconnected");
                return;
            }
            Ok(Some(Frame::TooLarge(len))) => {
                warn!("Rejecting {len} byte IPC frame (limit {MAX_FRAME_LEN})");
                let response = IpcResponse::failure(
                    0,
                    IpcErrorKind::PayloadTooLarge,
                    format!("Payload too large: {len} bytes"),
                );
                if let Err(e) = framed.send(&response).await {
                    debug!("Failed to send rejection: {e}");
                }
                return;
            }
            Ok(Some(Frame::Payload(payload))) => dispatch(&*handler, &payload).await,
            Err(e) => {
                debug!("IPC connection dropped: {e}");
                return;
            }
        };

        if let Err(e) = framed.send(&response).await {
            error!("Failed to write IPC response {}: {e}", response.request_id);
            return;
        }
    }
}

async fn dispatch<H: RequestHandler>(handler: &H, payload: &[u8]) -> IpcResponse {
    let request = match IpcRequest::decode(payload) {
        Ok(request) => request,
        Err(e) => {
            warn!("Undecodable IPC request: {e}");
            return IpcResponse::failure(
                0,
                IpcErrorKind::InvalidRequest,
                format!("Invalid request: {e}"),
            );
        }
    };

    match request.method {
        Some(method) => {
            debug!("IPC request {} ({})", request.request_id, method.name());
            handler.handle(request.request_id, method).await
        }
        None => IpcResponse::failure(
            request.request_id,
            IpcErrorKind::InvalidRequest,
            "Request carries no method",
        ),
    }
}
