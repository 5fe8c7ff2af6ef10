use common::ErrorLocation;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ApplicationError {
    #[error("Unknown Application: {message} {location}")]
    UnknownApplication {
        message: String,
        location: ErrorLocation,
    },

    /// The application callable itself failed; answered with a 500.
    #[error("Application Failed: {message} {location}")]
    Failed {
        message: String,
        location: ErrorLocation,
    },
}
