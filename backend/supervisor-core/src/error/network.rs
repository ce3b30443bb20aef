use common::ErrorLocation;

use std::io::Error as IoError;
use std::panic::Location;
use std::path::PathBuf;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum NetworkError {
    #[error("Command Error: {program}: {message} {location}")]
    Command {
        program: String,
        message: String,
        status: Option<i32>,
        location: ErrorLocation,
    },

    #[error("Parse Error: {message} {location}")]
    Parse {
        message: String,
        location: ErrorLocation,
    },

    #[error("Snapshot Error: {path}: {message} {location}")]
    Snapshot {
        message: String,
        path: PathBuf,
        location: ErrorLocation,
    },

    #[error("Unsupported Error: {message} {location}")]
    Unsupported {
        message: String,
        location: ErrorLocation,
    },

    #[error("IO Error: {message} {location}")]
    Io {
        message: String,
        location: ErrorLocation,
    },
}

impl From<IoError> for NetworkError {
    #[track_caller]
    fn from(error: IoError) -> Self {
        NetworkError::Io {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
