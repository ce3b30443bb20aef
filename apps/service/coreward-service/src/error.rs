use supervisor_core::error::{CoreError, IpcError};

use common::ErrorLocation;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Logger Error: {message} {location}")]
    Logger {
        message: String,
        location: ErrorLocation,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<IpcError> for ServiceError {
    fn from(error: IpcError) -> Self {
        ServiceError::Core(CoreError::from(error))
    }
}
