pub mod config;
pub mod controller;
pub mod discovery;
pub mod ipc;
pub mod network;
pub mod privilege;
pub mod spawn;
pub mod supervisor;

pub use config::ConfigError;
pub use controller::ControllerError;
pub use discovery::DiscoveryError;
pub use ipc::IpcError;
pub use network::NetworkError;
pub use privilege::PrivilegeError;
pub use spawn::SpawnError;
pub use supervisor::SupervisorError;

use models::ModelError;
use models::ipc::IpcErrorKind;

use serde::Serialize;
use thiserror::Error;

/// Failure categories surfaced to callers and the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    BinaryMissing,
    PortInUse,
    OrphanProcessDetected,
    ApiUnresponsive,
    ProcessCrashed,
    IpcUnreachable,
    IpcTimeout,
    PrivilegeInstallFailed,
    ConfigInvalid,
    Network,
    Internal,
}

impl ErrorKind {
    /// Transient failures that may be retried with bounded backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::IpcUnreachable | ErrorKind::IpcTimeout | ErrorKind::Network
        )
    }

    /// Maps a daemon-reported failure onto the local taxonomy.
    pub fn from_ipc(kind: IpcErrorKind) -> Self {
        match kind {
            IpcErrorKind::BinaryMissing => ErrorKind::BinaryMissing,
            IpcErrorKind::ConfigInvalid => ErrorKind::ConfigInvalid,
            IpcErrorKind::PortInUse => ErrorKind::PortInUse,
            IpcErrorKind::ApiUnresponsive => ErrorKind::ApiUnresponsive,
            IpcErrorKind::ProcessCrashed => ErrorKind::ProcessCrashed,
            IpcErrorKind::Network => ErrorKind::Network,
            IpcErrorKind::Unspecified
            | IpcErrorKind::InvalidRequest
            | IpcErrorKind::PayloadTooLarge
            | IpcErrorKind::Internal => ErrorKind::Internal,
        }
    }

    /// Inverse of [`ErrorKind::from_ipc`], used by the daemon when replying.
    pub fn to_ipc(self) -> IpcErrorKind {
        match self {
            ErrorKind::BinaryMissing => IpcErrorKind::BinaryMissing,
            ErrorKind::ConfigInvalid => IpcErrorKind::ConfigInvalid,
            ErrorKind::PortInUse | ErrorKind::OrphanProcessDetected => IpcErrorKind::PortInUse,
            ErrorKind::ApiUnresponsive => IpcErrorKind::ApiUnresponsive,
            ErrorKind::ProcessCrashed => IpcErrorKind::ProcessCrashed,
            ErrorKind::Network => IpcErrorKind::Network,
            ErrorKind::IpcUnreachable
            | ErrorKind::IpcTimeout
            | ErrorKind::PrivilegeInstallFailed
            | ErrorKind::Internal => IpcErrorKind::Internal,
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ipc(#[from] IpcError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Privilege(#[from] PrivilegeError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Discovery(e) => e.kind(),
            CoreError::Spawn(e) => e.kind(),
            CoreError::Controller(e) => e.kind(),
            CoreError::Config(e) => e.kind(),
            CoreError::Ipc(e) => e.kind(),
            CoreError::Network(_) => ErrorKind::Network,
            CoreError::Privilege(e) => e.kind(),
            CoreError::Supervisor(e) => e.kind(),
            CoreError::Model(_) => ErrorKind::Internal,
        }
    }

    /// Worth another attempt after a short backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Controller(e) => e.is_transient(),
            other => other.kind().is_retryable(),
        }
    }
}
