//! Supervision of the proxy core process.
//!
//! The desktop app and the privileged daemon both build on this crate:
//!
//! - [`supervisor`]: mode-agnostic lifecycle controller the UI talks to
//! - [`privilege`]: helper installation and the user/service mode policy
//! - [`network`]: system proxy and DNS side effects around the core
//! - [`ipc`]: length-framed request/response transport to the daemon
//! - [`daemon`]: the daemon-side request handler and core manager
//! - [`discovery`]: port scanning, orphan detection and process spawning
//! - [`controller`]: HTTP client for the core's REST controller
//! - [`config`]: persisted application settings and core profile parsing
//! - [`command`]: the seam every OS command goes through

pub mod command;
pub mod config;
pub mod controller;
pub mod daemon;
pub mod discovery;
pub mod error;
pub mod events;
pub mod ipc;
pub mod network;
pub mod privilege;
pub mod supervisor;

#[cfg(test)]
mod tests;

use const_format::concatcp;

pub const APP_DIR_NAME: &str = "coreward";

#[cfg(windows)]
pub const CORE_BINARY: &str = "mihomo.exe";
#[cfg(not(windows))]
pub const CORE_BINARY: &str = "mihomo";

#[cfg(windows)]
pub const SERVICE_BINARY: &str = "coreward-service.exe";
#[cfg(not(windows))]
pub const SERVICE_BINARY: &str = "coreward-service";

pub const SERVICE_LABEL: &str = "com.coreward.service";
pub const SERVICE_NAME: &str = "coreward-service";

pub const DEFAULT_API_HOST: &str = "127.0.0.1";
pub const DEFAULT_API_PORT: u16 = 29090;
pub const DEFAULT_PROXY_PORT: u16 = 7890;
pub const DEFAULT_TUN_DNS: &str = "223.6.6.6";
pub const DEFAULT_EXTERNAL_CONTROLLER: &str = concatcp!(DEFAULT_API_HOST, ":", DEFAULT_API_PORT);

#[cfg(unix)]
pub const DEFAULT_IPC_ENDPOINT: &str = concatcp!("/var/run/", SERVICE_NAME, ".sock");
#[cfg(windows)]
pub const DEFAULT_IPC_ENDPOINT: &str = concatcp!(r"\\.\pipe\", SERVICE_NAME);

pub const SERVICE_LOG_FILE: &str = concatcp!(SERVICE_NAME, ".log");

/// Version the daemon reports over `GetVersion`. The desktop app and the
/// daemon are built from the same workspace, so a mismatch means a stale helper.
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");
