use crate::error::ErrorKind;

use common::ErrorLocation;

use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum SpawnError {
    #[error("Binary Missing Error: {message} {location}")]
    BinaryMissing {
        message: String,
        path: PathBuf,
        location: ErrorLocation,
    },

    #[error("Spawn Error: {message} {location}")]
    Spawn {
        message: String,
        location: ErrorLocation,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("Timeout Error: {message} {location}")]
    Timeout {
        message: String,
        location: ErrorLocation,
    },

    #[error("Exited Error: {message} {location}")]
    Exited {
        message: String,
        code: Option<i32>,
        location: ErrorLocation,
    },

    #[error("Validation Error: {message} {location}")]
    Validation {
        message: String,
        location: ErrorLocation,
    },
}

impl SpawnError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SpawnError::BinaryMissing { .. } => ErrorKind::BinaryMissing,
            SpawnError::Timeout { .. } => ErrorKind::ApiUnresponsive,
            SpawnError::Exited { .. } => ErrorKind::ProcessCrashed,
            SpawnError::Validation { .. } => ErrorKind::ConfigInvalid,
            SpawnError::Spawn { .. } => ErrorKind::Internal,
        }
    }
}
