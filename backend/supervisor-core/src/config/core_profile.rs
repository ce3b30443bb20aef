use crate::controller::parse_external_controller;
use crate::error::config::ConfigError;

use common::{ErrorLocation, RedactedSecret};

use std::panic::Location;
use std::path::{Path, PathBuf};

use log::debug;
use serde_yaml::Value;

const KEY_EXTERNAL_CONTROLLER: &str = "external-controller";
const KEY_SECRET: &str = "secret";
const KEY_MIXED_PORT: &str = "mixed-port";
const KEY_PORT: &str = "port";
const KEY_TUN: &str = "tun";
const KEY_ENABLE: &str = "enable";

/// The handful of keys the supervisor needs from the core's YAML profile.
#[derive(Debug, Clone)]
pub struct CoreProfile {
    pub path: PathBuf,
    pub external_controller: Option<(String, u16)>,
    pub secret: Option<RedactedSecret>,
    pub proxy_port: Option<u16>,
    pub tun_enabled: bool,
}

impl CoreProfile {
    /// Read and parse a profile. The file must exist and hold a YAML mapping.
    #[track_caller]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::ProfileError {
                location: ErrorLocation::from(Location::caller()),
                path: path.to_path_buf(),
                reason: "profile does not exist".to_string(),
            });
        }

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                return Err(ConfigError::ReadError {
                    location: ErrorLocation::from(Location::caller()),
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        Self::parse(path, &contents)
    }

    #[track_caller]
    pub fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_yaml::from_str(contents).map_err(|e| ConfigError::ProfileError {
            location: ErrorLocation::from(Location::caller()),
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if !value.is_mapping() {
            return Err(ConfigError::ProfileError {
                location: ErrorLocation::from(Location::caller()),
                path: path.to_path_buf(),
                reason: "top level is not a mapping".to_string(),
            });
        }

        let external_controller = value
            .get(KEY_EXTERNAL_CONTROLLER)
            .and_then(Value::as_str)
            .and_then(parse_external_controller);

        let secret = RedactedSecret::from_optional(value.get(KEY_SECRET).and_then(Value::as_str));

        let proxy_port = [KEY_MIXED_PORT, KEY_PORT]
            .iter()
            .filter_map(|key| value.get(*key).and_then(Value::as_u64))
            .find_map(|port| u16::try_from(port).ok().filter(|p| *p > 0));

        let tun_enabled = value
            .get(KEY_TUN)
            .and_then(|tun| tun.get(KEY_ENABLE))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        debug!(
            "Parsed profile {}: controller={external_controller:?} proxy_port={proxy_port:?} tun={tun_enabled}",
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            external_controller,
            secret,
            proxy_port,
            tun_enabled,
        })
    }

    /// Controller endpoint from the profile, or the given fallback.
    pub fn controller_endpoint(&self, fallback_host: &str, fallback_port: u16) -> (String, u16) {
        self.external_controller
            .clone()
            .unwrap_or_else(|| (fallback_host.to_string(), fallback_port))
    }
}
