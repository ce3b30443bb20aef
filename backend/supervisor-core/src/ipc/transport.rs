//! Platform endpoints: a Unix domain socket path or a Windows named pipe name.

use crate::error::ipc::IpcError;

use common::ErrorLocation;

use std::io::Result as IoResult;
use std::panic::Location;

use log::{debug, info, warn};

#[cfg(unix)]
pub type IpcStream = tokio::net::UnixStream;
#[cfg(windows)]
pub type IpcStream = tokio::net::windows::named_pipe::NamedPipeClient;

#[cfg(unix)]
pub type ServerStream = tokio::net::UnixStream;
#[cfg(windows)]
pub type ServerStream = tokio::net::windows::named_pipe::NamedPipeServer;

#[cfg(unix)]
pub const SOCKET_MODE: u32 = 0o660;

#[cfg(unix)]
pub async fn connect(endpoint: &str) -> IoResult<IpcStream> {
    tokio::net::UnixStream::connect(endpoint).await
}

#[cfg(windows)]
pub async fn connect(endpoint: &str) -> IoResult<IpcStream> {
    use std::time::Duration;
    use tokio::net::windows::named_pipe::ClientOptions;

    const ERROR_PIPE_BUSY: i32 = 231;
    const PIPE_BUSY_RETRIES: u32 = 10;

    let mut busy = 0;
    loop {
        match ClientOptions::new().open(endpoint) {
            Ok(client) => return Ok(client),
            Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY) && busy < PIPE_BUSY_RETRIES => {
                busy += 1;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Server end of the endpoint. On Unix the socket file is removed on drop.
#[cfg(unix)]
pub struct IpcListener {
    listener: tokio::net::UnixListener,
    path: std::path::PathBuf,
}

#[cfg(unix)]
impl IpcListener {
    /// Bind the socket with mode 0660, replacing a stale socket file.
    ///
    /// Fails if another server is still answering on the path.
    pub fn bind(endpoint: &str) -> Result<Self, IpcError> {
        Self::bind_with_group(endpoint, None)
    }

    /// Like [`bind`](Self::bind), and hands the socket to `group` so members
    /// of that group can connect.
    pub fn bind_with_group(endpoint: &str, group: Option<u32>) -> Result<Self, IpcError> {
        use std::fs::{Permissions, create_dir_all, remove_file, set_permissions};
        use std::os::unix::fs::{PermissionsExt, chown};
        use std::path::PathBuf;

        let path = PathBuf::from(endpoint);

        if path.exists() {
            if std::os::unix::net::UnixStream::connect(&path).is_ok() {
                return Err(IpcError::Bind {
                    message: format!("Another server is already listening on {endpoint}"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }

            debug!("Removing stale socket {endpoint}");
            remove_file(&path)?;
        }

        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }

        let listener = tokio::net::UnixListener::bind(&path).map_err(|e| IpcError::Bind {
            message: format!("Failed to bind {endpoint}: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        set_permissions(&path, Permissions::from_mode(SOCKET_MODE))?;

        if let Some(gid) = group
            && let Err(e) = chown(&path, None, Some(gid))
        {
            warn!("Failed to hand socket {endpoint} to group {gid}: {e}");
        }

        info!("IPC listener bound on {endpoint}");
        Ok(Self { listener, path })
    }

    pub async fn accept(&mut self) -> IoResult<ServerStream> {
        self.listener.accept().await.map(|(stream, _)| stream)
    }
}

#[cfg(unix)]
impl Drop for IpcListener {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed socket {}", self.path.display()),
            Err(e) => debug!("Socket {} not removed: {e}", self.path.display()),
        }
    }
}

#[cfg(windows)]
pub struct IpcListener {
    endpoint: String,
    next: tokio::net::windows::named_pipe::NamedPipeServer,
}

#[cfg(windows)]
impl IpcListener {
    pub fn bind(endpoint: &str) -> Result<Self, IpcError> {
        Self::bind_with_group(endpoint, None)
    }

    /// Named pipes take their ACL from the service account; `group` is ignored.
    pub fn bind_with_group(endpoint: &str, _group: Option<u32>) -> Result<Self, IpcError> {
        use tokio::net::windows::named_pipe::ServerOptions;

        let next = ServerOptions::new()
            .first_pipe_instance(true)
            .create(endpoint)
            .map_err(|e| IpcError::Bind {
                message: format!("Failed to create pipe {endpoint}: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })?;

        info!("IPC listener bound on {endpoint}");
        Ok(Self {
            endpoint: endpoint.to_string(),
            next,
        })
    }

    pub async fn accept(&mut self) -> IoResult<ServerStream> {
        use tokio::net::windows::named_pipe::ServerOptions;

        self.next.connect().await?;
        let fresh = ServerOptions::new().create(&self.endpoint)?;
        Ok(std::mem::replace(&mut self.next, fresh))
    }
}
