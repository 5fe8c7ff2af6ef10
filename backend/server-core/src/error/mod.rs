pub mod application;
pub mod config;
pub mod handoff;
pub mod listener;
pub mod spawn;

pub use application::ApplicationError;
pub use config::ConfigError;
pub use handoff::HandoffError;
pub use listener::ListenerError;
pub use spawn::SpawnError;

use thiserror::Error;

/// Every fatal condition the core can report to the binary.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Handoff(#[from] HandoffError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    Application(#[from] ApplicationError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
