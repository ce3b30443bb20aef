use crate::error::ErrorKind;

use common::ErrorLocation;
use models::ipc::IpcErrorKind;

use std::io::Error as IoError;
use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum IpcError {
    #[error("Unreachable Error: {message} {location}")]
    Unreachable {
        message: String,
        attempts: u32,
        location: ErrorLocation,
    },

    #[error("Timeout Error: {message} {location}")]
    Timeout {
        message: String,
        method: &'static str,
        location: ErrorLocation,
    },

    #[error("IO Error: {message} {location}")]
    Io {
        message: String,
        location: ErrorLocation,
    },

    #[error("Frame Error: {message} {location}")]
    Frame {
        message: String,
        location: ErrorLocation,
    },

    #[error("Protocol Error: {message} {location}")]
    Protocol {
        message: String,
        location: ErrorLocation,
    },

    #[error("Remote Error: {message} {location}")]
    Remote {
        message: String,
        kind: IpcErrorKind,
        location: ErrorLocation,
    },

    #[error("Bind Error: {message} {location}")]
    Bind {
        message: String,
        location: ErrorLocation,
    },

    #[error("Protobuf Decode Error: {message} {location}")]
    ProtobufDecode {
        message: String,
        location: ErrorLocation,
    },

    #[error("Protobuf Encode Error: {message} {location}")]
    ProtobufEncode {
        message: String,
        location: ErrorLocation,
    },
}

impl IpcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IpcError::Unreachable { .. } => ErrorKind::IpcUnreachable,
            IpcError::Timeout { .. } => ErrorKind::IpcTimeout,
            IpcError::Remote { kind, .. } => ErrorKind::from_ipc(*kind),
            _ => ErrorKind::Internal,
        }
    }

    /// Connection-level failures worth another attempt.
    pub(crate) fn is_transient(&self) -> bool {
        matches!(self, IpcError::Io { .. } | IpcError::Unreachable { .. })
    }
}

impl From<IoError> for IpcError {
    #[track_caller]
    fn from(error: IoError) -> Self {
        IpcError::Io {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<prost::DecodeError> for IpcError {
    #[track_caller]
    fn from(error: prost::DecodeError) -> Self {
        IpcError::ProtobufDecode {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<prost::EncodeError> for IpcError {
    #[track_caller]
    fn from(error: prost::EncodeError) -> Self {
        IpcError::ProtobufEncode {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
