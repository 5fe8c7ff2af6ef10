use common::ErrorLocation;

use std::error::Error as StdError;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum SpawnError {
    #[error("Spawn Error: {message} {location}")]
    Spawn {
        message: String,
        location: ErrorLocation,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// The handoff task went away without reporting whether a successor
    /// was launched.
    #[error("Abandoned Handoff Error: {message} {location}")]
    Abandoned {
        message: String,
        location: ErrorLocation,
    },
}
