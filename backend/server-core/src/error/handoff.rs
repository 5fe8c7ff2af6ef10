use common::ErrorLocation;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum HandoffError {
    /// A record in the handoff variable is missing a field, carries an
    /// unparseable descriptor number, or a description would collide with
    /// one of the separators.
    #[error("Malformed Handoff Record: {message} {location}")]
    MalformedHandoffRecord {
        message: String,
        location: ErrorLocation,
    },

    #[error("Handoff Environment Error: {message} {location}")]
    Environment {
        message: String,
        location: ErrorLocation,
    },
}
