use crate::error::listener::ListenerError;
use crate::handoff::{ListenerRecord, ListenerSet};
use crate::listener::{
    ActiveListeners, AddressFamily, ListenSocket, Listener, ListenerAddress, ListenerSource,
    cloexec,
};

use common::ErrorLocation;

use std::collections::HashSet;
use std::os::fd::FromRawFd;
use std::panic::Location;

use log::info;
use socket2::{Domain, Socket};

/// Adopts listening descriptors passed down by a predecessor. No bind or
/// listen happens here; the sockets are already accepting into their
/// kernel backlog.
pub struct InheritedListenerSet {
    set: ListenerSet,
}

impl InheritedListenerSet {
    pub fn new(set: ListenerSet) -> Self {
        Self { set }
    }

    #[track_caller]
    fn adopt(record: &ListenerRecord) -> Result<Listener, ListenerError> {
        let address: ListenerAddress = record.description.parse()?;
        let fd = record.file_descriptor;

        if !cloexec::is_open(fd) {
            return Err(ListenerError::InvalidDescriptor {
                message: format!("Inherited descriptor for {record} is not open"),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        cloexec::clear_close_on_exec(fd)?;

        // SAFETY: `fd` is open in this process and the handoff record hands
        // its ownership to us. `open` rejects records that name the same
        // descriptor twice, so it is wrapped at most once.
        let socket = unsafe { Socket::from_raw_fd(fd) };

        let actual = socket.local_addr()?.domain();
        let expected = match address.family() {
            AddressFamily::Ipv4 => Domain::IPV4,
            AddressFamily::Ipv6 => Domain::IPV6,
            AddressFamily::Unix => Domain::UNIX,
        };
        if actual != expected {
            return Err(ListenerError::FamilyMismatch {
                message: format!(
                    "Inherited {record} is a {actual:?} socket, description says {}",
                    address.family()
                ),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        if !socket.is_listener()? {
            return Err(ListenerError::InvalidDescriptor {
                message: format!("Inherited {record} is not a listening socket"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let socket = match address.family() {
            AddressFamily::Ipv4 | AddressFamily::Ipv6 => ListenSocket::Tcp(socket.into()),
            AddressFamily::Unix => ListenSocket::Unix(socket.into()),
        };

        info!("Adopted inherited listener {record}");
        Ok(Listener::new(address, socket))
    }
}

impl ListenerSource for InheritedListenerSet {
    fn open(self) -> Result<ActiveListeners, ListenerError> {
        let mut seen = HashSet::new();
        if let Some(duplicate) = self
            .set
            .records()
            .iter()
            .find(|record| !seen.insert(record.file_descriptor))
        {
            return Err(ListenerError::InvalidDescriptor {
                message: format!(
                    "Descriptor {} appears more than once in the handoff record",
                    duplicate.file_descriptor
                ),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let listeners = self
            .set
            .records()
            .iter()
            .map(Self::adopt)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ActiveListeners::new(listeners))
    }
}
