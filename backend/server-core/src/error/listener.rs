use common::ErrorLocation;

use std::io::Error as IoError;
use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ListenerError {
    #[error("Bind Error: {message} {location}")]
    Bind {
        message: String,
        location: ErrorLocation,
        #[source]
        source: IoError,
    },

    #[error("Unknown Address Family: {message} {location}")]
    UnknownAddressFamily {
        message: String,
        location: ErrorLocation,
    },

    #[error("Invalid Descriptor: {message} {location}")]
    InvalidDescriptor {
        message: String,
        location: ErrorLocation,
    },

    #[error("Family Mismatch: {message} {location}")]
    FamilyMismatch {
        message: String,
        location: ErrorLocation,
    },

    #[error("Close-On-Exec Error: {message} {location}")]
    CloseOnExec {
        message: String,
        location: ErrorLocation,
    },

    #[error("IO Error: {message} {location}")]
    Io {
        message: String,
        location: ErrorLocation,
    },
}

impl From<IoError> for ListenerError {
    #[track_caller]
    fn from(error: IoError) -> Self {
        ListenerError::Io {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
