use crate::error::ErrorKind;

use common::ErrorLocation;
use models::CoreState;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum SupervisorError {
    #[error("Invalid Transition Error: {from:?} -> {to:?} {location}")]
    InvalidTransition {
        from: CoreState,
        to: CoreState,
        location: ErrorLocation,
    },

    #[error("Not Running Error: {message} {location}")]
    NotRunning {
        message: String,
        location: ErrorLocation,
    },

    #[error("Crashed Error: {message} {location}")]
    Crashed {
        message: String,
        location: ErrorLocation,
    },

    #[error("Already Running Error: {message} {location}")]
    AlreadyRunning {
        message: String,
        location: ErrorLocation,
    },

    #[error("Requires Service Error: {message} {location}")]
    RequiresService {
        message: String,
        location: ErrorLocation,
    },

    #[error("State Actor Error: {message} {location}")]
    StateActor {
        message: String,
        location: ErrorLocation,
    },
}

impl SupervisorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SupervisorError::NotRunning { .. } => ErrorKind::ApiUnresponsive,
            SupervisorError::Crashed { .. } => ErrorKind::ProcessCrashed,
            SupervisorError::AlreadyRunning { .. } => ErrorKind::PortInUse,
            SupervisorError::RequiresService { .. } => ErrorKind::ConfigInvalid,
            SupervisorError::InvalidTransition { .. } | SupervisorError::StateActor { .. } => {
                ErrorKind::Internal
            }
        }
    }
}
