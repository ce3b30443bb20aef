pub mod builder;

use crate::{CoreMode, CoreState};

use std::fmt::{Debug, Formatter, Result as FormatResult};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Snapshot of the supervised core, rebuilt on every status query.
///
/// `running` always agrees with `state == Running`. Build it with
/// [`builder::CoreStatusBuilder`] so that holds.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreStatus {
    pub state: CoreState,
    pub running: bool,
    pub mode: CoreMode,
    pub pid: Option<u32>,
    pub version: Option<String>,
    pub config_path: Option<PathBuf>,
    pub api_host: String,
    pub api_port: u16,
    pub api_secret: Option<String>,
    pub uptime_seconds: Option<u64>,
    pub message: Option<String>,
}

impl CoreStatus {
    /// `host:port` of the core's external controller.
    pub fn controller_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

impl Debug for CoreStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.debug_struct("CoreStatus")
            .field("state", &self.state)
            .field("running", &self.running)
            .field("mode", &self.mode)
            .field("pid", &self.pid)
            .field("version", &self.version)
            .field("config_path", &self.config_path)
            .field("api_host", &self.api_host)
            .field("api_port", &self.api_port)
            .field("api_secret", &self.api_secret.as_ref().map(|_| "[REDACTED]"))
            .field("uptime_seconds", &self.uptime_seconds)
            .field("message", &self.message)
            .finish()
    }
}
