pub mod core_profile;
pub mod store;

pub use core_profile::CoreProfile;
pub use store::ConfigStore;

use crate::error::config::ConfigError;
use crate::{
    APP_DIR_NAME, CORE_BINARY, DEFAULT_API_HOST, DEFAULT_API_PORT, DEFAULT_IPC_ENDPOINT,
    DEFAULT_PROXY_PORT, DEFAULT_TUN_DNS,
};

use common::ErrorLocation;
use models::{CoreMode, RoutingMode};

use std::env::current_exe;
use std::net::IpAddr;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_VERSION: u32 = 1;
const PROFILE_FILE_NAME: &str = "config.yaml";

// ============================================
// CONFIG STRUCTS
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreSection {
    #[serde(default = "default_binary_path")]
    pub binary_path: PathBuf,
    #[serde(default = "default_profile_path")]
    pub config_path: PathBuf,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_api_host")]
    pub api_host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_user_startup_timeout_ms")]
    pub user_startup_timeout_ms: u64,
    #[serde(default = "default_service_startup_timeout_ms")]
    pub service_startup_timeout_ms: u64,
    #[serde(default = "default_startup_poll_interval_ms")]
    pub startup_poll_interval_ms: u64,
}

impl Default for CoreSection {
    fn default() -> Self {
        Self {
            binary_path: default_binary_path(),
            config_path: default_profile_path(),
            work_dir: default_work_dir(),
            api_host: default_api_host(),
            api_port: default_api_port(),
            user_startup_timeout_ms: default_user_startup_timeout_ms(),
            service_startup_timeout_ms: default_service_startup_timeout_ms(),
            startup_poll_interval_ms: default_startup_poll_interval_ms(),
        }
    }
}

impl CoreSection {
    /// Window the core gets to answer `/version` after launch.
    pub fn startup_timeout(&self, mode: CoreMode) -> Duration {
        match mode {
            CoreMode::User => Duration::from_millis(self.user_startup_timeout_ms),
            CoreMode::Service => Duration::from_millis(self.service_startup_timeout_ms),
        }
    }

    pub fn startup_poll_interval(&self) -> Duration {
        Duration::from_millis(self.startup_poll_interval_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeSection {
    #[serde(default)]
    pub preferred: CoreMode,
    #[serde(default)]
    pub tun_enabled: bool,
    #[serde(default)]
    pub routing: RoutingMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSection {
    #[serde(default = "default_proxy_host")]
    pub proxy_host: String,
    #[serde(default = "default_proxy_port")]
    pub proxy_port: u16,
    #[serde(default = "default_bypass")]
    pub bypass: Vec<String>,
    /// Resolver sent to the daemon when TUN is switched on.
    #[serde(default = "default_tun_dns")]
    pub tun_dns: String,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            proxy_host: default_proxy_host(),
            proxy_port: default_proxy_port(),
            bypass: default_bypass(),
            tun_dns: default_tun_dns(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSection {
    pub ipc_endpoint: Option<String>,
    #[serde(default = "default_ipc_timeout_ms")]
    pub ipc_timeout_ms: u64,
    #[serde(default = "default_ipc_max_retries")]
    pub ipc_max_retries: u32,
    #[serde(default = "default_ipc_retry_delay_ms")]
    pub ipc_retry_delay_ms: u64,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            ipc_endpoint: None,
            ipc_timeout_ms: default_ipc_timeout_ms(),
            ipc_max_retries: default_ipc_max_retries(),
            ipc_retry_delay_ms: default_ipc_retry_delay_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
        }
    }
}

impl ServiceSection {
    pub fn endpoint(&self) -> &str {
        self.ipc_endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or(DEFAULT_IPC_ENDPOINT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSection {
    #[serde(default = "default_health_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_status_timeout_ms")]
    pub status_timeout_ms: u64,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval_secs(),
            status_timeout_ms: default_status_timeout_ms(),
        }
    }
}

impl HealthSection {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub core: CoreSection,

    #[serde(default)]
    pub mode: ModeSection,

    #[serde(default)]
    pub network: NetworkSection,

    #[serde(default)]
    pub service: ServiceSection,

    #[serde(default)]
    pub health: HealthSection,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            core: CoreSection::default(),
            mode: ModeSection::default(),
            network: NetworkSection::default(),
            service: ServiceSection::default(),
            health: HealthSection::default(),
        }
    }
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}
fn default_binary_path() -> PathBuf {
    current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(CORE_BINARY)))
        .filter(|path| path.exists())
        .unwrap_or_else(|| app_data_dir().join(CORE_BINARY))
}
fn default_work_dir() -> PathBuf {
    app_data_dir().join("core")
}
fn default_profile_path() -> PathBuf {
    default_work_dir().join(PROFILE_FILE_NAME)
}
fn default_api_host() -> String {
    DEFAULT_API_HOST.to_string()
}
fn default_api_port() -> u16 {
    DEFAULT_API_PORT
}
fn default_user_startup_timeout_ms() -> u64 {
    3_000
}
fn default_service_startup_timeout_ms() -> u64 {
    15_000
}
fn default_startup_poll_interval_ms() -> u64 {
    500
}
fn default_proxy_host() -> String {
    DEFAULT_API_HOST.to_string()
}
fn default_proxy_port() -> u16 {
    DEFAULT_PROXY_PORT
}
fn default_bypass() -> Vec<String> {
    [
        "localhost",
        "127.0.0.0/8",
        "::1",
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "*.local",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_tun_dns() -> String {
    DEFAULT_TUN_DNS.to_string()
}
fn default_ipc_timeout_ms() -> u64 {
    10_000
}
fn default_ipc_max_retries() -> u32 {
    3
}
fn default_ipc_retry_delay_ms() -> u64 {
    200
}
fn default_handshake_timeout_ms() -> u64 {
    10_000
}
fn default_health_interval_secs() -> u64 {
    30
}
fn default_status_timeout_ms() -> u64 {
    5_000
}

// ============================================
// IMPLEMENTATION
// ============================================

impl AppConfig {
    /// `{config_dir}/coreward`, the directory `config.json` lives in.
    #[track_caller]
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or_else(|| ConfigError::DirectoryNotFound {
                location: ErrorLocation::from(Location::caller()),
                reason: "No platform config directory available".to_string(),
            })
    }

    /// Load config from {config_dir}/config.json.
    ///
    /// A missing file yields defaults. A file that exists but is unreadable,
    /// corrupt or fails validation is an error.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            info!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path).map_err(|e| {
            warn!("Failed to read config file: {e}");
            ConfigError::ReadError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                source: e,
            }
        })?;

        let config: AppConfig = serde_json::from_str(&contents).map_err(|e| {
            warn!("Failed to parse config JSON: {e}");
            ConfigError::ParseError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                reason: e.to_string(),
            }
        })?;

        config.validate()?;

        info!("Config loaded from {}", config_path.display());
        Ok(config)
    }

    /// Save config to {config_dir}/config.json using temp file + rename.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        std::fs::create_dir_all(config_dir).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_dir.to_path_buf(),
            source: e,
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let temp_path = config_dir.join(format!("{CONFIG_FILE_NAME}.tmp"));

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            location: ErrorLocation::from(Location::caller()),
            reason: e.to_string(),
        })?;

        std::fs::write(&temp_path, json).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: temp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&temp_path, &config_path).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_path.clone(),
            source: e,
        })?;

        info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Validate config values.
    #[track_caller]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::ValidationError {
            location: ErrorLocation::from(Location::caller()),
            reason,
        };

        if self.version == 0 || self.version > CONFIG_VERSION {
            return Err(invalid(format!(
                "Invalid version: {} (expected 1-{CONFIG_VERSION})",
                self.version
            )));
        }

        if self.core.api_host.trim().is_empty() {
            return Err(invalid("core.api_host cannot be empty".to_string()));
        }

        if self.core.api_port == 0 {
            return Err(invalid("core.api_port must be in range 1-65535".to_string()));
        }

        if self.core.user_startup_timeout_ms == 0
            || self.core.service_startup_timeout_ms == 0
            || self.core.startup_poll_interval_ms == 0
        {
            return Err(invalid("core startup timings must be non-zero".to_string()));
        }

        if self.network.proxy_host.trim().is_empty() {
            return Err(invalid("network.proxy_host cannot be empty".to_string()));
        }

        if self.network.proxy_port == 0 {
            return Err(invalid(
                "network.proxy_port must be in range 1-65535".to_string(),
            ));
        }

        if self.network.tun_dns.parse::<IpAddr>().is_err() {
            return Err(invalid(format!(
                "network.tun_dns is not an IP address: {}",
                self.network.tun_dns
            )));
        }

        if self.service.ipc_timeout_ms == 0 {
            return Err(invalid("service.ipc_timeout_ms must be non-zero".to_string()));
        }

        if self.health.interval_secs == 0 {
            return Err(invalid("health.interval_secs must be non-zero".to_string()));
        }

        Ok(())
    }
}
