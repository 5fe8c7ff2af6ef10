use crate::error::listener::ListenerError;

use common::ErrorLocation;

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::panic::Location;
use std::path::PathBuf;
use std::str::FromStr;

const TCP_PREFIX: &str = "tcp:";
const TCP6_PREFIX: &str = "tcp6:";
const UNIX_PREFIX: &str = "unix:";

/// Address family a listening socket belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
    Unix,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => f.write_str("ipv4"),
            AddressFamily::Ipv6 => f.write_str("ipv6"),
            AddressFamily::Unix => f.write_str("unix"),
        }
    }
}

/// A parsed listener description.
///
/// Accepted forms:
///
/// * `tcp:PORT` / `tcp:HOST:PORT` - IPv4 stream socket
/// * `tcp6:PORT` / `tcp6:[HOST]:PORT` - IPv6 stream socket
/// * `unix:PATH` - Unix-domain stream socket
///
/// `Display` writes the canonical form (`tcp:0.0.0.0:8080`), which is what
/// goes into handoff records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerAddress {
    Tcp(SocketAddrV4),
    Tcp6(SocketAddrV6),
    Unix(PathBuf),
}

impl ListenerAddress {
    pub fn family(&self) -> AddressFamily {
        match self {
            ListenerAddress::Tcp(_) => AddressFamily::Ipv4,
            ListenerAddress::Tcp6(_) => AddressFamily::Ipv6,
            ListenerAddress::Unix(_) => AddressFamily::Unix,
        }
    }

    pub(crate) fn from_socket_addr(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => ListenerAddress::Tcp(v4),
            SocketAddr::V6(v6) => ListenerAddress::Tcp6(v6),
        }
    }

    #[track_caller]
    fn unclassifiable(description: &str, reason: &str) -> ListenerError {
        ListenerError::UnknownAddressFamily {
            message: format!("Cannot classify listener description {description:?}: {reason}"),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl FromStr for ListenerAddress {
    type Err = ListenerError;

    #[track_caller]
    fn from_str(description: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = description.strip_prefix(TCP6_PREFIX) {
            if let Ok(port) = rest.parse::<u16>() {
                return Ok(ListenerAddress::Tcp6(SocketAddrV6::new(
                    Ipv6Addr::UNSPECIFIED,
                    port,
                    0,
                    0,
                )));
            }
            return rest
                .parse::<SocketAddrV6>()
                .map(ListenerAddress::Tcp6)
                .map_err(|_| {
                    Self::unclassifiable(description, "expected tcp6:PORT or tcp6:[HOST]:PORT")
                });
        }

        if let Some(rest) = description.strip_prefix(TCP_PREFIX) {
            if let Ok(port) = rest.parse::<u16>() {
                return Ok(ListenerAddress::Tcp(SocketAddrV4::new(
                    Ipv4Addr::UNSPECIFIED,
                    port,
                )));
            }
            return rest
                .parse::<SocketAddrV4>()
                .map(ListenerAddress::Tcp)
                .map_err(|_| {
                    Self::unclassifiable(description, "expected tcp:PORT or tcp:HOST:PORT")
                });
        }

        if let Some(path) = description.strip_prefix(UNIX_PREFIX) {
            if path.is_empty() {
                return Err(Self::unclassifiable(description, "empty socket path"));
            }
            return Ok(ListenerAddress::Unix(PathBuf::from(path)));
        }

        Err(Self::unclassifiable(
            description,
            "expected a tcp:, tcp6: or unix: prefix",
        ))
    }
}

impl fmt::Display for ListenerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerAddress::Tcp(addr) => write!(f, "{TCP_PREFIX}{addr}"),
            ListenerAddress::Tcp6(addr) => {
                write!(f, "{TCP6_PREFIX}[{}]:{}", addr.ip(), addr.port())
            }
            ListenerAddress::Unix(path) => write!(f, "{UNIX_PREFIX}{}", path.display()),
        }
    }
}
