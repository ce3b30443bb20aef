//! Supervisor status owned by a single actor.
//!
//! Every lifecycle transition goes through the actor, which rejects illegal
//! ones. Status reads take the `RwLock` and build a fresh [`CoreStatus`], so
//! uptime is always computed at query time.

use crate::error::supervisor::SupervisorError;

use common::ErrorLocation;
use models::{CoreMode, CoreState, CoreStatus, CoreStatusBuilder, ModelError};

use std::panic::Location;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};

/// Where the controller of the current core can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub config_path: Option<PathBuf>,
    pub api_host: String,
    pub api_port: u16,
    pub api_secret: Option<String>,
}

/// A requested transition plus whatever the caller learned about the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub state: CoreState,
    pub pid: Option<u32>,
    pub version: Option<String>,
    pub message: Option<String>,
    /// Uptime reported by the owner of the process (the daemon, an adopted orphan).
    pub uptime: Option<Duration>,
}

impl StatusChange {
    pub fn to(state: CoreState) -> Self {
        Self {
            state,
            pid: None,
            version: None,
            message: None,
            uptime: None,
        }
    }

    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_uptime(mut self, uptime: Option<Duration>) -> Self {
        self.uptime = uptime;
        self
    }
}

#[derive(Debug, Clone)]
struct Snapshot {
    state: CoreState,
    mode: CoreMode,
    pid: Option<u32>,
    version: Option<String>,
    message: Option<String>,
    started_at: Option<Instant>,
    endpoint: Endpoint,
}

impl Snapshot {
    fn to_status(&self) -> Result<CoreStatus, ModelError> {
        let mut builder = CoreStatusBuilder::default()
            .with_state(self.state)
            .with_mode(self.mode)
            .with_optional_pid(self.pid)
            .with_optional_version(self.version.clone())
            .with_api_host(self.endpoint.api_host.clone())
            .with_api_port(self.endpoint.api_port)
            .with_api_secret(self.endpoint.api_secret.clone())
            .with_uptime(self.started_at.map(|at| at.elapsed()))
            .with_optional_message(self.message.clone());

        if let Some(path) = &self.endpoint.config_path {
            builder = builder.with_config_path(path.clone());
        }

        builder.build()
    }
}

enum StatusCommand {
    Apply(StatusChange, oneshot::Sender<Result<CoreState, SupervisorError>>),
    SetEndpoint(Endpoint, oneshot::Sender<()>),
    SetMode(CoreMode, oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct StatusStore {
    command_tx: Arc<Mutex<Option<mpsc::Sender<StatusCommand>>>>,
    snapshot: Arc<RwLock<Snapshot>>,
}

impl StatusStore {
    pub fn new(mode: CoreMode, endpoint: Endpoint) -> Self {
        Self {
            command_tx: Arc::new(Mutex::new(None)),
            snapshot: Arc::new(RwLock::new(Snapshot {
                state: CoreState::Stopped,
                mode,
                pid: None,
                version: None,
                message: None,
                started_at: None,
                endpoint,
            })),
        }
    }

    pub async fn state(&self) -> CoreState {
        self.snapshot.read().await.state
    }

    pub async fn mode(&self) -> CoreMode {
        self.snapshot.read().await.mode
    }

    pub async fn pid(&self) -> Option<u32> {
        self.snapshot.read().await.pid
    }

    pub async fn endpoint(&self) -> Endpoint {
        self.snapshot.read().await.endpoint.clone()
    }

    /// Consistent snapshot of the current status.
    pub async fn status(&self) -> Result<CoreStatus, ModelError> {
        self.snapshot.read().await.to_status()
    }

    /// Apply a transition. Illegal transitions leave the state untouched.
    pub async fn apply(&self, change: StatusChange) -> Result<CoreState, SupervisorError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(StatusCommand::Apply(change, ack_tx)).await?;
        ack_rx.await.map_err(|_| Self::actor_gone())?
    }

    pub async fn set_endpoint(&self, endpoint: Endpoint) -> Result<(), SupervisorError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(StatusCommand::SetEndpoint(endpoint, ack_tx))
            .await?;
        ack_rx.await.map_err(|_| Self::actor_gone())
    }

    pub async fn set_mode(&self, mode: CoreMode) -> Result<(), SupervisorError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(StatusCommand::SetMode(mode, ack_tx)).await?;
        ack_rx.await.map_err(|_| Self::actor_gone())
    }

    #[track_caller]
    fn actor_gone() -> SupervisorError {
        SupervisorError::StateActor {
            message: "Status actor dropped the acknowledgement".to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    async fn send(&self, cmd: StatusCommand) -> Result<(), SupervisorError> {
        let mut tx_guard = self.command_tx.lock().await;

        if tx_guard.is_none() {
            let (tx, rx) = mpsc::channel(32);
            tokio::spawn(status_actor(rx, Arc::clone(&self.snapshot)));
            *tx_guard = Some(tx);
            info!("Status actor spawned");
        }

        let tx = tx_guard.as_ref().ok_or_else(|| SupervisorError::StateActor {
            message: "Status actor not initialized".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?;

        tx.send(cmd).await.map_err(|e| SupervisorError::StateActor {
            message: format!("Status actor died: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
    }
}

fn apply_change(snapshot: &mut Snapshot, change: StatusChange) -> Result<CoreState, SupervisorError> {
    let from = snapshot.state;
    let to = change.state;

    if !from.can_transition_to(to) {
        warn!("Rejected status transition {from:?} -> {to:?}");
        return Err(SupervisorError::InvalidTransition {
            from,
            to,
            location: ErrorLocation::from(Location::caller()),
        });
    }

    match to {
        CoreState::Running => {
            if !from.is_running() || change.uptime.is_some() {
                let uptime = change.uptime.unwrap_or_default();
                snapshot.started_at = Instant::now().checked_sub(uptime).or(Some(Instant::now()));
            }
            if change.pid.is_some() {
                snapshot.pid = change.pid;
            }
            if change.version.is_some() {
                snapshot.version = change.version;
            }
        }
        CoreState::Starting => {
            snapshot.pid = change.pid;
            snapshot.started_at = None;
        }
        CoreState::Stopping => {}
        CoreState::Stopped | CoreState::Crashed => {
            snapshot.pid = None;
            snapshot.started_at = None;
        }
    }

    snapshot.message = change.message;
    snapshot.state = to;

    if from != to {
        debug!("Core state {from:?} -> {to:?}");
    }
    Ok(to)
}

async fn status_actor(
    mut command_rx: mpsc::Receiver<StatusCommand>,
    snapshot: Arc<RwLock<Snapshot>>,
) {
    info!("Status actor started");

    while let Some(cmd) = command_rx.recv().await {
        match cmd {
            StatusCommand::Apply(change, ack) => {
                let result = apply_change(&mut *snapshot.write().await, change);
                let _ = ack.send(result);
            }
            StatusCommand::SetEndpoint(endpoint, ack) => {
                snapshot.write().await.endpoint = endpoint;
                let _ = ack.send(());
            }
            StatusCommand::SetMode(mode, ack) => {
                snapshot.write().await.mode = mode;
                let _ = ack.send(());
            }
        }
    }

    warn!("Status actor stopped");
}
