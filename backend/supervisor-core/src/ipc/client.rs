use crate::config::ServiceSection;
use crate::error::ipc::IpcError;
use crate::ipc::frame::FramedStream;
use crate::ipc::transport;

use common::ErrorLocation;
use models::ipc::ipc_request::Method;
use models::ipc::ipc_response::Data;
use models::ipc::{
    IpcCoreStatus, IpcEmpty, IpcGetLogs, IpcLogEntry, IpcReloadConfig, IpcRequest, IpcResponse,
    IpcSetTunMode, IpcStartCore,
};

use std::io::Error as IoError;
use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use backoff::{ExponentialBackoff, backoff::Backoff};
use log::{debug, trace, warn};
use tokio::time::{Instant, sleep as TokioSleep, timeout_at};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcClientConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl From<&ServiceSection> for IpcClientConfig {
    fn from(section: &ServiceSection) -> Self {
        Self {
            endpoint: section.endpoint().to_string(),
            timeout: Duration::from_millis(section.ipc_timeout_ms),
            max_attempts: section.ipc_max_retries.max(1),
            retry_delay: Duration::from_millis(section.ipc_retry_delay_ms),
        }
    }
}

enum AttemptError {
    /// Nothing reached the daemon.
    Connect(IoError),
    /// The request may have been delivered.
    Exchange(IpcError),
    TimedOut,
}

/// Client for the privileged daemon.
///
/// Each call opens a fresh connection, writes one request and reads one
/// response. Connection failures are retried with backoff for every method.
/// Timeouts are only retried for read-only queries; a timed out mutation
/// surfaces [`IpcError::Timeout`] straight away since the daemon may still be
/// carrying it out.
#[derive(Clone)]
pub struct IpcClient {
    config: Arc<IpcClientConfig>,
    next_id: Arc<AtomicU64>,
}

impl IpcClient {
    pub fn new(config: IpcClientConfig) -> Self {
        Self {
            config: Arc::new(config),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// A client sharing this one's request counter with a different deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            config: Arc::new(IpcClientConfig {
                timeout,
                ..(*self.config).clone()
            }),
            next_id: Arc::clone(&self.next_id),
        }
    }

    pub async fn call(&self, method: Method) -> Result<IpcResponse, IpcError> {
        let name = method.name();
        let idempotent = method.is_idempotent();
        let mut backoff = ExponentialBackoff {
            initial_interval: self.config.retry_delay,
            max_elapsed_time: None,
            ..Default::default()
        };
        let mut last_error = String::new();

        for attempt in 1..=self.config.max_attempts {
            let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let request = IpcRequest::new(request_id, method.clone());

            trace!("IPC {name} attempt {attempt} (id {request_id})");

            match self.attempt(&request).await {
                Ok(response) => return Self::check_response(request_id, name, response),
                Err(AttemptError::Connect(e)) => {
                    debug!("IPC {name}: connect to {} failed: {e}", self.config.endpoint);
                    last_error = e.to_string();
                }
                Err(AttemptError::Exchange(e)) if idempotent && e.is_transient() => {
                    debug!("IPC {name}: exchange failed: {e}");
                    last_error = e.to_string();
                }
                Err(AttemptError::Exchange(e)) => return Err(e),
                Err(AttemptError::TimedOut) if idempotent && attempt < self.config.max_attempts => {
                    warn!("IPC {name} timed out after {:?}, retrying", self.config.timeout);
                    last_error = "timed out".to_string();
                }
                Err(AttemptError::TimedOut) => {
                    return Err(IpcError::Timeout {
                        message: format!(
                            "No response to {name} within {:?}",
                            self.config.timeout
                        ),
                        method: name,
                        location: ErrorLocation::from(Location::caller()),
                    });
                }
            }

            if attempt < self.config.max_attempts
                && let Some(delay) = backoff.next_backoff()
            {
                TokioSleep(delay).await;
            }
        }

        Err(IpcError::Unreachable {
            message: format!(
                "Daemon at {} unreachable for {name} after {} attempts: {last_error}",
                self.config.endpoint, self.config.max_attempts
            ),
            attempts: self.config.max_attempts,
            location: ErrorLocation::from(Location::caller()),
        })
    }

    async fn attempt(&self, request: &IpcRequest) -> Result<IpcResponse, AttemptError> {
        let deadline = Instant::now() + self.config.timeout;

        let stream = match timeout_at(deadline, transport::connect(&self.config.endpoint)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(AttemptError::Connect(e)),
            Err(_) => {
                return Err(AttemptError::Connect(IoError::new(
                    std::io::ErrorKind::TimedOut,
                    "connect timed out",
                )));
            }
        };

        let mut framed = FramedStream::new(stream);

        let exchange = async {
            framed.send(request).await?;
            framed
                .recv::<IpcResponse>()
                .await?
                .ok_or_else(|| IpcError::Io {
                    message: "Daemon closed the connection without responding".to_string(),
                    location: ErrorLocation::from(Location::caller()),
                })
        };

        match timeout_at(deadline, exchange).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(AttemptError::Exchange(e)),
            Err(_) => Err(AttemptError::TimedOut),
        }
    }

    #[track_caller]
    fn check_response(
        request_id: u64,
        name: &str,
        response: IpcResponse,
    ) -> Result<IpcResponse, IpcError> {
        if response.request_id != request_id {
            return Err(IpcError::Protocol {
                message: format!(
                    "Response id {} does not match request id {request_id} for {name}",
                    response.request_id
                ),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        if !response.is_ok() {
            return Err(IpcError::Remote {
                message: format!("{name}: {}", response.message),
                kind: response.error_kind(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(response)
    }

    #[track_caller]
    fn unexpected(name: &str, data: Option<Data>) -> IpcError {
        IpcError::Protocol {
            message: format!("Unexpected payload for {name}: {data:?}"),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    // ============================================
    // TYPED CALLS
    // ============================================

    pub async fn ping(&self) -> Result<(), IpcError> {
        self.call(Method::Ping(IpcEmpty {})).await.map(|_| ())
    }

    pub async fn version(&self) -> Result<String, IpcError> {
        match self.call(Method::GetVersion(IpcEmpty {})).await?.data {
            Some(Data::Version(version)) => Ok(version),
            other => Err(Self::unexpected("get_version", other)),
        }
    }

    pub async fn start_core(&self, start: IpcStartCore) -> Result<IpcCoreStatus, IpcError> {
        match self.call(Method::StartCore(start)).await?.data {
            Some(Data::Status(status)) => Ok(status),
            other => Err(Self::unexpected("start_core", other)),
        }
    }

    pub async fn stop_core(&self) -> Result<(), IpcError> {
        self.call(Method::StopCore(IpcEmpty {})).await.map(|_| ())
    }

    pub async fn restart_core(&self) -> Result<IpcCoreStatus, IpcError> {
        match self.call(Method::RestartCore(IpcEmpty {})).await?.data {
            Some(Data::Status(status)) => Ok(status),
            other => Err(Self::unexpected("restart_core", other)),
        }
    }

    pub async fn reload_config(&self, config_path: &str) -> Result<(), IpcError> {
        self.call(Method::ReloadConfig(IpcReloadConfig {
            config_path: config_path.to_string(),
        }))
        .await
        .map(|_| ())
    }

    pub async fn status(&self) -> Result<IpcCoreStatus, IpcError> {
        match self.call(Method::GetStatus(IpcEmpty {})).await?.data {
            Some(Data::Status(status)) => Ok(status),
            other => Err(Self::unexpected("get_status", other)),
        }
    }

    pub async fn logs(&self, limit: Option<u32>) -> Result<Vec<IpcLogEntry>, IpcError> {
        match self.call(Method::GetLogs(IpcGetLogs { limit })).await?.data {
            Some(Data::Logs(list)) => Ok(list.entries),
            other => Err(Self::unexpected("get_logs", other)),
        }
    }

    pub async fn clear_logs(&self) -> Result<(), IpcError> {
        self.call(Method::ClearLogs(IpcEmpty {})).await.map(|_| ())
    }

    pub async fn is_running(&self) -> Result<bool, IpcError> {
        match self.call(Method::IsRunning(IpcEmpty {})).await?.data {
            Some(Data::Flag(running)) => Ok(running),
            other => Err(Self::unexpected("is_running", other)),
        }
    }

    pub async fn set_tun_mode(&self, enabled: bool, dns_servers: &[String]) -> Result<(), IpcError> {
        self.call(Method::SetTunMode(IpcSetTunMode {
            enabled,
            dns_servers: dns_servers.to_vec(),
        }))
            .await
            .map(|_| ())
    }

    pub async fn shutdown(&self) -> Result<(), IpcError> {
        self.call(Method::Shutdown(IpcEmpty {})).await.map(|_| ())
    }
}
