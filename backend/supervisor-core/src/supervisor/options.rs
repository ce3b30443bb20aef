use crate::config::{AppConfig, CoreProfile};
use crate::controller::ControllerClient;
use crate::discovery::SpawnOptions;
use crate::error::config::ConfigError;
use crate::error::controller::ControllerError;
use crate::supervisor::state::Endpoint;

use common::RedactedSecret;
use models::CoreMode;
use models::ipc::IpcStartCore;

use std::path::PathBuf;
use std::time::Duration;

/// Fully resolved launch parameters. Kept by the supervisor so `restart()`
/// reuses exactly what the last successful start used.
#[derive(Debug, Clone, PartialEq)]
pub struct StartOptions {
    pub binary: PathBuf,
    pub config_path: PathBuf,
    pub work_dir: PathBuf,
    pub api_host: String,
    pub api_port: u16,
    pub secret: Option<RedactedSecret>,
    pub startup_timeout: Duration,
    pub poll_interval: Duration,
}

impl StartOptions {
    /// Resolve against the app config and the profile on disk.
    ///
    /// The profile must exist and parse. Its `external-controller` and
    /// `secret` win over the app config defaults.
    pub fn resolve(
        config: &AppConfig,
        mode: CoreMode,
        config_path: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let config_path = config_path.unwrap_or_else(|| config.core.config_path.clone());
        let profile = CoreProfile::load(&config_path)?;
        let (api_host, api_port) =
            profile.controller_endpoint(&config.core.api_host, config.core.api_port);

        Ok(Self {
            binary: config.core.binary_path.clone(),
            config_path,
            work_dir: config.core.work_dir.clone(),
            api_host,
            api_port,
            secret: profile.secret,
            startup_timeout: config.core.startup_timeout(mode),
            poll_interval: config.core.startup_poll_interval(),
        })
    }

    /// `host:port`, with IPv6 hosts bracketed.
    pub fn external_controller(&self) -> String {
        if self.api_host.contains(':') {
            format!("[{}]:{}", self.api_host, self.api_port)
        } else {
            format!("{}:{}", self.api_host, self.api_port)
        }
    }

    pub fn controller(&self) -> Result<ControllerClient, ControllerError> {
        ControllerClient::new(&self.api_host, self.api_port, self.secret.clone())
    }

    pub fn spawn_options(&self) -> SpawnOptions {
        SpawnOptions {
            binary: self.binary.clone(),
            config_path: self.config_path.clone(),
            work_dir: self.work_dir.clone(),
            external_controller: self.external_controller(),
        }
    }

    pub fn to_ipc(&self) -> IpcStartCore {
        IpcStartCore {
            core_path: self.binary.to_string_lossy().into_owned(),
            config_path: self.config_path.to_string_lossy().into_owned(),
            work_dir: self.work_dir.to_string_lossy().into_owned(),
            external_controller: self.external_controller(),
            secret: self.secret.as_ref().map(|s| s.expose().to_string()),
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            config_path: Some(self.config_path.clone()),
            api_host: self.api_host.clone(),
            api_port: self.api_port,
            api_secret: self.secret.as_ref().map(|s| s.expose().to_string()),
        }
    }
}
