use crate::error::listener::ListenerError;
use crate::listener::{
    ActiveListeners, ListenSocket, Listener, ListenerAddress, ListenerSource, cloexec,
};

use common::ErrorLocation;

use std::io::Error as IoError;
use std::net::SocketAddr;
use std::panic::Location;
use std::path::Path;

use log::info;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

/// Binds brand-new listening sockets. Used on first boot, when nothing was
/// inherited.
pub struct FreshListenerSet {
    addresses: Vec<ListenerAddress>,
    backlog: i32,
}

impl FreshListenerSet {
    pub fn new(addresses: Vec<ListenerAddress>, backlog: i32) -> Self {
        Self { addresses, backlog }
    }

    #[track_caller]
    fn bind(&self, address: &ListenerAddress) -> Result<Listener, ListenerError> {
        let bind_error = |source: IoError| ListenerError::Bind {
            message: format!("Failed to bind {address}: {source}"),
            location: ErrorLocation::from(Location::caller()),
            source,
        };

        let (address, socket) = match address {
            ListenerAddress::Tcp(addr) => bind_tcp(SocketAddr::V4(*addr), self.backlog)
                .map_err(bind_error)?,
            ListenerAddress::Tcp6(addr) => bind_tcp(SocketAddr::V6(*addr), self.backlog)
                .map_err(bind_error)?,
            ListenerAddress::Unix(path) => {
                let listener = bind_unix(path, self.backlog).map_err(bind_error)?;
                (address.clone(), ListenSocket::Unix(listener))
            }
        };

        let listener = Listener::new(address, socket);
        cloexec::clear_close_on_exec(listener.fileno())?;

        info!(
            "Listening on {} (fd {})",
            listener.address(),
            listener.fileno()
        );
        Ok(listener)
    }
}

impl ListenerSource for FreshListenerSet {
    fn open(self) -> Result<ActiveListeners, ListenerError> {
        let listeners = self
            .addresses
            .iter()
            .map(|address| self.bind(address))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ActiveListeners::new(listeners))
    }
}

fn bind_tcp(addr: SocketAddr, backlog: i32) -> Result<(ListenerAddress, ListenSocket), IoError> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    if addr.is_ipv6() {
        socket.set_only_v6(true)?;
    }
    socket.bind(&SockAddr::from(addr))?;
    socket.listen(backlog)?;

    let listener = std::net::TcpListener::from(socket);
    // Port 0 resolves here, and the record must carry the real port.
    let bound = ListenerAddress::from_socket_addr(listener.local_addr()?);
    Ok((bound, ListenSocket::Tcp(listener)))
}

fn bind_unix(path: &Path, backlog: i32) -> Result<std::os::unix::net::UnixListener, IoError> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    socket.bind(&SockAddr::unix(path)?)?;
    socket.listen(backlog)?;
    Ok(socket.into())
}
