use common::ErrorLocation;

use server_core::error::CoreError;

use thiserror::Error;

/// Fatal errors of the `max-requests` binary.
#[derive(Debug, Error)]
pub enum MaxRequestsError {
    /// Error from this binary
    #[error("Max Requests Error: {message} {location}")]
    MaxRequests {
        message: String,
        location: ErrorLocation,
    },

    /// Logger could not be installed
    #[error("Logger Error: {message} {location}")]
    Logger {
        message: String,
        location: ErrorLocation,
    },

    /// Error from server-core (config, listeners, handoff, successor launch)
    #[error(transparent)]
    Core(#[from] CoreError),
}
