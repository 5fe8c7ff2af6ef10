//! Live listening sockets.
//!
//! A [`Listener`] owns one bound, listening descriptor for its whole life.
//! That descriptor is the one recorded for a handoff and it is kept free of
//! close-on-exec. Accept loops never use it directly: each one takes an
//! [`Acceptor`], a duplicate registered with the reactor. Stopping a
//! listener releases the duplicates, which removes the socket from this
//! process's reactor while the original descriptor keeps listening, so
//! connections queue in the kernel backlog until a successor accepts them.

pub mod address;
pub mod cloexec;
mod fresh;
mod inherited;
mod set;

pub use address::{AddressFamily, ListenerAddress};
pub use fresh::FreshListenerSet;
pub use inherited::InheritedListenerSet;
pub use set::ActiveListeners;

use crate::error::listener::ListenerError;
use crate::handoff::ListenerRecord;

use common::ErrorLocation;

use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::panic::Location;

use log::debug;
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio::sync::watch;

/// Produces the live listeners a server starts with.
pub trait ListenerSource {
    /// # Errors
    ///
    /// Returns [`ListenerError`] if any listener cannot be produced. A
    /// partial set is never returned.
    fn open(self) -> Result<ActiveListeners, ListenerError>;
}

pub(crate) enum ListenSocket {
    Tcp(std::net::TcpListener),
    Unix(std::os::unix::net::UnixListener),
}

impl ListenSocket {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            ListenSocket::Tcp(listener) => listener.as_raw_fd(),
            ListenSocket::Unix(listener) => listener.as_raw_fd(),
        }
    }
}

/// One listening socket owned by a listener set.
pub struct Listener {
    address: ListenerAddress,
    socket: ListenSocket,
    accepting: watch::Sender<bool>,
}

impl Listener {
    pub(crate) fn new(address: ListenerAddress, socket: ListenSocket) -> Self {
        Self {
            address,
            socket,
            accepting: watch::Sender::new(true),
        }
    }

    pub fn address(&self) -> &ListenerAddress {
        &self.address
    }

    pub fn description(&self) -> String {
        self.address.to_string()
    }

    /// The descriptor that is handed to a successor.
    pub fn fileno(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    pub fn is_accepting(&self) -> bool {
        *self.accepting.borrow()
    }

    /// Stop delivering new connections from this listener. Idempotent.
    ///
    /// Every [`Acceptor`] returns `None` on its next poll and releases its
    /// duplicate descriptor. The listening descriptor itself stays open.
    pub fn stop_accepting(&self) {
        if self.accepting.send_replace(false) {
            debug!("Stopped accepting on {}", self.address);
        }
    }

    /// Resolves once no [`Acceptor`] for this listener is alive.
    pub async fn stopped(&self) {
        self.accepting.closed().await;
    }

    /// A reactor-registered duplicate of the listening descriptor.
    ///
    /// The duplicate is close-on-exec, so only [`Listener::fileno`] reaches
    /// a successor.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Io`] if the listener has already stopped
    /// accepting or the descriptor cannot be duplicated and registered.
    #[track_caller]
    pub fn acceptor(&self) -> Result<Acceptor, ListenerError> {
        if !self.is_accepting() {
            return Err(ListenerError::Io {
                message: format!("Listener {} no longer accepts connections", self.address),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let socket = match &self.socket {
            ListenSocket::Tcp(listener) => {
                let duplicate = listener.try_clone()?;
                duplicate.set_nonblocking(true)?;
                AcceptSocket::Tcp(TcpListener::from_std(duplicate)?)
            }
            ListenSocket::Unix(listener) => {
                let duplicate = listener.try_clone()?;
                duplicate.set_nonblocking(true)?;
                AcceptSocket::Unix(UnixListener::from_std(duplicate)?)
            }
        };

        Ok(Acceptor {
            address: self.address.clone(),
            socket,
            accepting: self.accepting.subscribe(),
        })
    }

    pub fn record(&self) -> ListenerRecord {
        ListenerRecord::new(self.description(), self.fileno())
    }
}

enum AcceptSocket {
    Tcp(TcpListener),
    Unix(UnixListener),
}

/// A connection taken off a listener's queue.
pub enum Accepted {
    Tcp(TcpStream, SocketAddr),
    Unix(UnixStream),
}

/// Accept handle used by one accept loop.
pub struct Acceptor {
    address: ListenerAddress,
    socket: AcceptSocket,
    accepting: watch::Receiver<bool>,
}

impl Acceptor {
    pub fn address(&self) -> &ListenerAddress {
        &self.address
    }

    /// Wait for the next connection, or `None` once the listener stopped.
    ///
    /// A stop request wins over a connection that is ready in the same
    /// poll, so nothing is accepted after [`Listener::stop_accepting`].
    pub async fn accept(&mut self) -> Option<io::Result<Accepted>> {
        let socket = &self.socket;
        tokio::select! {
            biased;
            _ = self.accepting.wait_for(|accepting| !*accepting) => None,
            accepted = accept_from(socket) => Some(accepted),
        }
    }
}

async fn accept_from(socket: &AcceptSocket) -> io::Result<Accepted> {
    match socket {
        AcceptSocket::Tcp(listener) => {
            let (stream, peer) = listener.accept().await?;
            Ok(Accepted::Tcp(stream, peer))
        }
        AcceptSocket::Unix(listener) => {
            let (stream, _peer) = listener.accept().await?;
            Ok(Accepted::Unix(stream))
        }
    }
}
