use crate::{CoreMode, CoreState, CoreStatus, ModelError};

use common::ErrorLocation;

use std::panic::Location;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Default)]
pub struct CoreStatusBuilder {
    state: Option<CoreState>,
    mode: Option<CoreMode>,
    pid: Option<u32>,
    version: Option<String>,
    config_path: Option<PathBuf>,
    api_host: Option<String>,
    api_port: Option<u16>,
    api_secret: Option<String>,
    uptime: Option<Duration>,
    message: Option<String>,
}

impl CoreStatusBuilder {
    pub fn with_state(mut self, state: CoreState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_mode(mut self, mode: CoreMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn with_optional_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_optional_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_api_host(mut self, host: impl Into<String>) -> Self {
        self.api_host = Some(host.into());
        self
    }

    pub fn with_api_port(mut self, port: u16) -> Self {
        self.api_port = Some(port);
        self
    }

    pub fn with_api_secret(mut self, secret: Option<String>) -> Self {
        self.api_secret = secret.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_uptime(mut self, uptime: Option<Duration>) -> Self {
        self.uptime = uptime;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_optional_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    #[track_caller]
    pub fn build(self) -> Result<CoreStatus, ModelError> {
        let state = self.state.unwrap_or_default();

        let api_host = self
            .api_host
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| ModelError::Validation {
                message: "api_host is required and must not be empty".to_string(),
                location: ErrorLocation::from(Location::caller()),
            })?;

        let api_port = match self.api_port {
            Some(port) if port > 0 => port,
            Some(_) => {
                return Err(ModelError::Validation {
                    message: "api_port must be in range 1-65535".to_string(),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
            None => {
                return Err(ModelError::Validation {
                    message: "api_port is required".to_string(),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        };

        if self.pid == Some(0) {
            return Err(ModelError::Validation {
                message: "pid must be greater than 0".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let running = state.is_running();

        // Uptime only means something while the core is up.
        let uptime_seconds = if running {
            self.uptime.map(|d| d.as_secs())
        } else {
            None
        };

        Ok(CoreStatus {
            state,
            running,
            mode: self.mode.unwrap_or_default(),
            pid: self.pid,
            version: self.version,
            config_path: self.config_path,
            api_host,
            api_port,
            api_secret: self.api_secret,
            uptime_seconds,
            message: self.message,
        })
    }
}
