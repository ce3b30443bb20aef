use crate::error::ErrorKind;

use common::ErrorLocation;

use std::io::Error as IoError;
use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum PrivilegeError {
    #[error("Install Failed Error: {message} {location}")]
    InstallFailed {
        message: String,
        location: ErrorLocation,
    },

    #[error("Install Cancelled Error: {message} {location}")]
    Cancelled {
        message: String,
        location: ErrorLocation,
    },

    #[error("Handshake Error: {message} {location}")]
    Handshake {
        message: String,
        location: ErrorLocation,
    },

    #[error("Uninstall Error: {message} {location}")]
    UninstallFailed {
        message: String,
        location: ErrorLocation,
    },

    #[error("Helper Missing Error: {message} {location}")]
    HelperMissing {
        message: String,
        location: ErrorLocation,
    },

    #[error("IO Error: {message} {location}")]
    Io {
        message: String,
        location: ErrorLocation,
    },
}

impl PrivilegeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PrivilegeError::Io { .. } => ErrorKind::Internal,
            _ => ErrorKind::PrivilegeInstallFailed,
        }
    }
}

impl From<IoError> for PrivilegeError {
    #[track_caller]
    fn from(error: IoError) -> Self {
        PrivilegeError::Io {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
