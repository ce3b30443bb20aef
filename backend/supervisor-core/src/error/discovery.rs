use crate::error::ErrorKind;

use common::ErrorLocation;
use models::{ModelError, OrphanCandidate};

use std::error::Error as StdError;
use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum DiscoveryError {
    #[error("Network Query Error: {message} {location}")]
    NetworkQuery {
        message: String,
        location: ErrorLocation,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("Port In Use Error: {message} {location}")]
    PortInUse {
        message: String,
        port: u16,
        pid: Option<u32>,
        location: ErrorLocation,
    },

    #[error("Orphan Process Error: {message} {location}")]
    Orphan {
        message: String,
        candidate: OrphanCandidate,
        location: ErrorLocation,
    },

    #[error("Validation Error: {message} {location}")]
    Validation {
        message: String,
        location: ErrorLocation,
    },
}

impl DiscoveryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DiscoveryError::PortInUse { .. } => ErrorKind::PortInUse,
            DiscoveryError::Orphan { .. } => ErrorKind::OrphanProcessDetected,
            DiscoveryError::NetworkQuery { .. } | DiscoveryError::Validation { .. } => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<ModelError> for DiscoveryError {
    #[track_caller]
    fn from(error: ModelError) -> Self {
        DiscoveryError::Validation {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
