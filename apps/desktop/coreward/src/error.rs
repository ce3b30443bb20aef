use supervisor_core::error::{CoreError, ErrorKind};

use common::ErrorLocation;

use std::panic::Location;

use serde::Serialize;
use thiserror::Error;

/// Errors returned by Tauri commands.
///
/// Serialized as `{ "type": <variant>, "data": { .. } }`. Core failures carry
/// their [`ErrorKind`] so the UI can pick the notification to show.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum AppError {
    /// Error from this app (setup, state, Tauri plumbing)
    #[error("Coreward Error: {message} {location}")]
    Coreward {
        message: String,
        location: ErrorLocation,
    },

    /// Error from supervisor-core operations
    #[error("Core Error: {message} {location}")]
    Core {
        kind: ErrorKind,
        message: String,
        location: ErrorLocation,
    },
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Coreward { .. } => ErrorKind::Internal,
            AppError::Core { kind, .. } => *kind,
        }
    }
}

impl From<CoreError> for AppError {
    #[track_caller]
    fn from(error: CoreError) -> Self {
        AppError::Core {
            kind: error.kind(),
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
