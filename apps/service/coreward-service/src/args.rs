//! Command line and environment for the daemon.
//!
//! The helper installers launch it as `coreward-service [--socket-group <gid>]`.
//! `COREWARD_IPC_ENDPOINT` and `COREWARD_STATE_DIR` relocate the socket and
//! the state directory, which the tests and development builds rely on.

use supervisor_core::DEFAULT_IPC_ENDPOINT;
use supervisor_core::daemon::core_manager::default_state_dir;

use std::path::PathBuf;

use clap::Parser;

pub const ENDPOINT_ENV: &str = "COREWARD_IPC_ENDPOINT";
pub const STATE_DIR_ENV: &str = "COREWARD_STATE_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "coreward-service")]
#[command(about = "Privileged daemon that runs the mihomo core for Coreward")]
#[command(version)]
pub struct ServiceArgs {
    /// Socket path (Unix) or pipe name (Windows) to serve
    #[arg(long, env = ENDPOINT_ENV, default_value = DEFAULT_IPC_ENDPOINT)]
    pub endpoint: String,

    /// Directory holding the DNS override snapshot
    #[arg(long, env = STATE_DIR_ENV, default_value_os_t = default_state_dir())]
    pub state_dir: PathBuf,

    /// Group granted access to the socket (Unix)
    #[arg(long)]
    pub socket_group: Option<u32>,
}

impl ServiceArgs {
    /// Directory for `coreward-service.log`.
    pub fn log_dir(&self) -> PathBuf {
        #[cfg(windows)]
        {
            self.state_dir.join("logs")
        }
        #[cfg(not(windows))]
        {
            PathBuf::from("/var/log")
        }
    }
}
