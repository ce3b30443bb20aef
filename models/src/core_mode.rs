use crate::ModelError;

use common::ErrorLocation;

use std::fmt::{Display, Formatter, Result as FormatResult};
use std::panic::Location;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where the core runs.
///
/// `User` spawns the core as a child of the desktop app. `Service` hands it to
/// the privileged daemon over IPC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoreMode {
    #[default]
    User,
    Service,
}

impl CoreMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoreMode::User => "user",
            CoreMode::Service => "service",
        }
    }

    /// Whether running in this mode needs the privileged helper installed.
    pub fn requires_helper(&self) -> bool {
        matches!(self, CoreMode::Service)
    }
}

impl Display for CoreMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoreMode {
    type Err = ModelError;

    #[track_caller]
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(CoreMode::User),
            "service" => Ok(CoreMode::Service),
            other => Err(ModelError::Parse {
                message: format!("Unknown core mode: '{other}' (expected user|service)"),
                location: ErrorLocation::from(Location::caller()),
            }),
        }
    }
}

/// Proxy routing mode exposed by the core's controller (`/configs` `mode`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    #[default]
    Rule,
    Global,
    Direct,
}

impl RoutingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingMode::Rule => "rule",
            RoutingMode::Global => "global",
            RoutingMode::Direct => "direct",
        }
    }
}

impl Display for RoutingMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingMode {
    type Err = ModelError;

    #[track_caller]
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rule" => Ok(RoutingMode::Rule),
            "global" => Ok(RoutingMode::Global),
            "direct" => Ok(RoutingMode::Direct),
            other => Err(ModelError::Parse {
                message: format!("Unknown routing mode: '{other}' (expected rule|global|direct)"),
                location: ErrorLocation::from(Location::caller()),
            }),
        }
    }
}
