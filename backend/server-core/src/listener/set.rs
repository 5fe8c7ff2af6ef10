use crate::error::listener::ListenerError;
use crate::handoff::ListenerSet;
use crate::listener::{Listener, cloexec};

use log::info;

/// The listeners a server is currently responsible for.
///
/// Each listener is owned here exactly once. Dropping the set closes every
/// descriptor; a handoff instead captures them with [`ActiveListeners::capture`]
/// and the successor takes over the still-open descriptors.
pub struct ActiveListeners {
    listeners: Vec<Listener>,
}

impl ActiveListeners {
    pub(crate) fn new(listeners: Vec<Listener>) -> Self {
        Self { listeners }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Listener> {
        self.listeners.iter()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Stop every listener from handing out new connections. Idempotent.
    pub fn stop_accepting(&self) {
        for listener in &self.listeners {
            listener.stop_accepting();
        }
    }

    /// Resolves once every accept handle of every listener is released.
    pub async fn stopped(&self) {
        for listener in &self.listeners {
            listener.stopped().await;
        }
    }

    /// Snapshot the live `(description, descriptor)` pairs for a successor.
    ///
    /// Close-on-exec is cleared again on every descriptor so a flag set
    /// behind our back cannot make the launch drop a socket.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError`] if a descriptor is no longer open or its
    /// flags cannot be changed.
    #[track_caller]
    pub fn capture(&self) -> Result<ListenerSet, ListenerError> {
        let records = self
            .listeners
            .iter()
            .map(|listener| {
                cloexec::clear_close_on_exec(listener.fileno())?;
                Ok(listener.record())
            })
            .collect::<Result<ListenerSet, ListenerError>>()?;

        info!("Captured {} listener(s) for handoff", records.len());
        Ok(records)
    }
}
