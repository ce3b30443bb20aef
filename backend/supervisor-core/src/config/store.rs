//! Config state management using the actor pattern.
//!
//! Reads go through `Arc<RwLock<AppConfig>>`. Mutations are sent to a single
//! actor task which validates, updates memory, then persists, and acknowledges
//! the caller through a oneshot channel.

use crate::config::AppConfig;
use crate::error::config::ConfigError;

use common::ErrorLocation;

use std::panic::Location;
use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};

type ConfigEdit = Box<dyn FnOnce(&mut AppConfig) + Send>;

/// Commands that mutate config state.
pub enum ConfigCommand {
    /// Replace the whole config.
    Replace(AppConfig, oneshot::Sender<Result<AppConfig, ConfigError>>),

    /// Apply an edit to the current config.
    Edit(ConfigEdit, oneshot::Sender<Result<AppConfig, ConfigError>>),
}

/// Actor-owned copy of [`AppConfig`] shared by the supervisor and the UI commands.
#[derive(Clone)]
pub struct ConfigStore {
    command_tx: Arc<Mutex<Option<mpsc::Sender<ConfigCommand>>>>,
    config: Arc<RwLock<AppConfig>>,
    config_dir: Arc<PathBuf>,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf, config: AppConfig) -> Self {
        Self {
            command_tx: Arc::new(Mutex::new(None)),
            config: Arc::new(RwLock::new(config)),
            config_dir: Arc::new(config_dir),
        }
    }

    /// Load `config.json` from `config_dir` and wrap it in a store.
    pub fn load(config_dir: PathBuf) -> Result<Self, ConfigError> {
        let config = AppConfig::load(&config_dir)?;
        Ok(Self::new(config_dir, config))
    }

    pub fn config_dir(&self) -> &PathBuf {
        &self.config_dir
    }

    /// Current config (read-only copy).
    pub async fn get(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    pub async fn replace(&self, config: AppConfig) -> Result<AppConfig, ConfigError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(ConfigCommand::Replace(config, ack_tx)).await?;
        Self::await_ack(ack_rx).await
    }

    /// Apply `edit` to the current config, validate and persist it.
    ///
    /// An invalid result leaves both memory and disk untouched.
    pub async fn update<F>(&self, edit: F) -> Result<AppConfig, ConfigError>
    where
        F: FnOnce(&mut AppConfig) + Send + 'static,
    {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(ConfigCommand::Edit(Box::new(edit), ack_tx))
            .await?;
        Self::await_ack(ack_rx).await
    }

    async fn send(&self, cmd: ConfigCommand) -> Result<(), ConfigError> {
        let mut tx_guard = self.command_tx.lock().await;

        if tx_guard.is_none() {
            let (tx, rx) = mpsc::channel(32);
            tokio::spawn(config_actor(
                rx,
                Arc::clone(&self.config),
                Arc::clone(&self.config_dir),
            ));
            *tx_guard = Some(tx);
            info!("Config store actor spawned");
        }

        let tx = tx_guard.as_ref().ok_or_else(|| ConfigError::StoreError {
            location: ErrorLocation::from(Location::caller()),
            reason: "Config actor not initialized".to_string(),
        })?;

        tx.send(cmd).await.map_err(|e| ConfigError::StoreError {
            location: ErrorLocation::from(Location::caller()),
            reason: format!("Config actor died: {e}"),
        })
    }

    async fn await_ack(
        ack_rx: oneshot::Receiver<Result<AppConfig, ConfigError>>,
    ) -> Result<AppConfig, ConfigError> {
        ack_rx.await.map_err(|_| ConfigError::StoreError {
            location: ErrorLocation::from(Location::caller()),
            reason: "Config actor dropped the acknowledgement".to_string(),
        })?
    }
}

async fn config_actor(
    mut command_rx: mpsc::Receiver<ConfigCommand>,
    config: Arc<RwLock<AppConfig>>,
    config_dir: Arc<PathBuf>,
) {
    info!("Config store actor started");

    while let Some(cmd) = command_rx.recv().await {
        let (next, ack) = match cmd {
            ConfigCommand::Replace(next, ack) => (next, ack),
            ConfigCommand::Edit(edit, ack) => {
                let mut next = config.read().await.clone();
                edit(&mut next);
                (next, ack)
            }
        };

        if let Err(e) = next.validate() {
            error!("Config validation failed: {e}");
            let _ = ack.send(Err(e));
            continue;
        }

        {
            let mut config_write = config.write().await;
            *config_write = next.clone();
        }

        // Memory keeps the new value even when the disk write fails.
        let result = match next.save(&config_dir) {
            Ok(()) => Ok(next),
            Err(e) => {
                error!("Config updated in memory but disk write failed: {e}");
                Err(e)
            }
        };

        let _ = ack.send(result);
    }

    warn!("Config store actor stopped");
}
