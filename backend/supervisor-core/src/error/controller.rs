use crate::error::ErrorKind;

use common::{ErrorLocation, HttpStatusCode};

use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ControllerError {
    #[error("HTTP Error: {message} {location}")]
    Http {
        message: String,
        location: ErrorLocation,
    },

    #[error("Status Error: HTTP {status} - {message} {location}")]
    Status {
        message: String,
        status: HttpStatusCode,
        location: ErrorLocation,
    },

    #[error("JSON Error: {message} {location}")]
    Json {
        message: String,
        location: ErrorLocation,
    },

    #[error("URL Parse Error: {message} {location}")]
    UrlParse {
        message: String,
        location: ErrorLocation,
    },
}

impl ControllerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControllerError::Http { .. } => ErrorKind::ApiUnresponsive,
            ControllerError::Status { status, .. } if status.is_auth_failure() => {
                ErrorKind::ConfigInvalid
            }
            ControllerError::Status { .. } => ErrorKind::ApiUnresponsive,
            ControllerError::Json { .. } => ErrorKind::Internal,
            ControllerError::UrlParse { .. } => ErrorKind::ConfigInvalid,
        }
    }

    /// Connection failures and the codes a booting controller answers with.
    pub fn is_transient(&self) -> bool {
        match self {
            ControllerError::Http { .. } => true,
            ControllerError::Status { status, .. } => status.is_retryable(),
            ControllerError::Json { .. } | ControllerError::UrlParse { .. } => false,
        }
    }
}

impl From<url::ParseError> for ControllerError {
    #[track_caller]
    fn from(error: url::ParseError) -> Self {
        ControllerError::UrlParse {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<reqwest::Error> for ControllerError {
    #[track_caller]
    fn from(error: reqwest::Error) -> Self {
        ControllerError::Http {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<serde_json::Error> for ControllerError {
    #[track_caller]
    fn from(error: serde_json::Error) -> Self {
        ControllerError::Json {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
