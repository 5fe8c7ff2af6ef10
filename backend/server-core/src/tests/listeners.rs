// Fresh binding, inheritance and accept-stop behavior on real sockets

use crate::error::listener::ListenerError;
use crate::handoff::{ListenerRecord, ListenerSet};
use crate::listener::cloexec::is_close_on_exec;
use crate::listener::{
    Accepted, AddressFamily, FreshListenerSet, InheritedListenerSet, ListenerAddress,
    ListenerSource,
};

use std::net::{SocketAddr, TcpStream};
use std::os::fd::IntoRawFd;
use std::time::Duration;

use socket2::{Domain, Socket, Type};
use tempfile::tempdir;
use tokio::time::timeout as TokioTimeout;

const WAIT: Duration = Duration::from_secs(5);

fn loopback_v4() -> ListenerAddress {
    "tcp:127.0.0.1:0".parse().unwrap()
}

fn bound_socket_addr(address: &ListenerAddress) -> SocketAddr {
    match address {
        ListenerAddress::Tcp(addr) => SocketAddr::V4(*addr),
        ListenerAddress::Tcp6(addr) => SocketAddr::V6(*addr),
        ListenerAddress::Unix(path) => panic!("Not a TCP address: {}", path.display()),
    }
}

/// **VALUE**: Port 0 must be recorded as the port the kernel picked.
///
/// **BUG THIS CATCHES**: Recording the requested address would hand
/// `tcp:127.0.0.1:0` to the successor, which then cannot describe what it
/// serves.
#[test]
fn given_port_zero_when_bound_then_real_port_recorded_and_inheritable() {
    // GIVEN / WHEN: Binding an ephemeral loopback port
    let listeners = FreshListenerSet::new(vec![loopback_v4()], 16).open().unwrap();

    // THEN: One listener, real port, no close-on-exec
    assert_eq!(listeners.len(), 1);
    let listener = listeners.iter().next().unwrap();
    assert_ne!(bound_socket_addr(listener.address()).port(), 0);
    assert!(!is_close_on_exec(listener.fileno()).unwrap());
    assert!(listener.is_accepting());
}

#[test]
fn given_ipv6_loopback_when_bound_then_family_is_ipv6() {
    // Hosts without IPv6 cannot run this one
    if std::net::TcpListener::bind("[::1]:0").is_err() {
        return;
    }

    let address: ListenerAddress = "tcp6:[::1]:0".parse().unwrap();
    let listeners = FreshListenerSet::new(vec![address], 16).open().unwrap();

    let listener = listeners.iter().next().unwrap();
    assert_eq!(listener.address().family(), AddressFamily::Ipv6);
    assert!(listener.description().starts_with("tcp6:[::1]:"));
}

#[test]
fn given_unix_path_when_bound_then_description_keeps_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("server.sock");
    let address = ListenerAddress::Unix(path.clone());

    let listeners = FreshListenerSet::new(vec![address], 16).open().unwrap();

    let listener = listeners.iter().next().unwrap();
    assert_eq!(listener.description(), format!("unix:{}", path.display()));
    assert!(path.exists());
}

#[test]
fn given_port_in_use_when_bound_then_bind_error() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = ListenerAddress::from_socket_addr(taken.local_addr().unwrap());

    let result = FreshListenerSet::new(vec![address], 16).open();

    assert!(matches!(result, Err(ListenerError::Bind { .. })));
}

/// **VALUE**: Inherited descriptors are adopted as-is, with no new bind.
#[test]
fn given_inherited_tcp_descriptor_when_adopted_then_serves_same_socket() {
    // GIVEN: A listening socket whose ownership moves into a handoff record
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let local = std_listener.local_addr().unwrap();
    let fd = std_listener.into_raw_fd();
    let set = ListenerSet::new(vec![ListenerRecord::new(format!("tcp:{local}"), fd)]);

    // WHEN: Adopting it
    let listeners = InheritedListenerSet::new(set).open().unwrap();

    // THEN: Same descriptor, same address, close-on-exec cleared
    let listener = listeners.iter().next().unwrap();
    assert_eq!(listener.fileno(), fd);
    assert_eq!(bound_socket_addr(listener.address()), local);
    assert!(!is_close_on_exec(fd).unwrap());

    // AND: The kernel still queues connections for it
    assert!(TcpStream::connect(local).is_ok());
}

#[test]
fn given_inherited_unix_descriptor_when_adopted_then_family_is_unix() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("inherited.sock");
    let fd = std::os::unix::net::UnixListener::bind(&path)
        .unwrap()
        .into_raw_fd();
    let set = ListenerSet::new(vec![ListenerRecord::new(
        format!("unix:{}", path.display()),
        fd,
    )]);

    let listeners = InheritedListenerSet::new(set).open().unwrap();

    assert_eq!(
        listeners.iter().next().unwrap().address().family(),
        AddressFamily::Unix
    );
}

#[test]
fn given_inherited_ipv6_descriptor_when_adopted_then_family_is_ipv6() {
    let Ok(std_listener) = std::net::TcpListener::bind("[::1]:0") else {
        return;
    };
    let local = std_listener.local_addr().unwrap();
    let fd = std_listener.into_raw_fd();
    let address = ListenerAddress::from_socket_addr(local);
    let set = ListenerSet::new(vec![ListenerRecord::new(address.to_string(), fd)]);

    let listeners = InheritedListenerSet::new(set).open().unwrap();

    let listener = listeners.iter().next().unwrap();
    assert_eq!(listener.address().family(), AddressFamily::Ipv6);
    assert_eq!(listener.address(), &address);
}

/// **VALUE**: What a successor decodes classifies to the family the
/// predecessor bound, for every supported family.
#[test]
fn given_captured_listeners_when_decoded_then_families_are_preserved() {
    // GIVEN: One listener per family this host supports
    let dir = tempdir().unwrap();
    let mut addresses = vec![
        loopback_v4(),
        ListenerAddress::Unix(dir.path().join("captured.sock")),
    ];
    if std::net::TcpListener::bind("[::1]:0").is_ok() {
        addresses.push("tcp6:[::1]:0".parse().unwrap());
    }
    let listeners = FreshListenerSet::new(addresses, 16).open().unwrap();

    // WHEN: Capturing, encoding and decoding as the successor would
    let encoded = listeners.capture().unwrap().encode().unwrap();
    let decoded = ListenerSet::decode(Some(&encoded)).unwrap();

    // THEN: Each description classifies to its listener's family
    assert_eq!(decoded.len(), listeners.len());
    for (record, listener) in decoded.records().iter().zip(listeners.iter()) {
        let address: ListenerAddress = record.description.parse().unwrap();
        assert_eq!(address.family(), listener.address().family());
        assert_eq!(record.file_descriptor, listener.fileno());
    }
}

/// **BUG THIS CATCHES**: Would catch trusting the description over the
/// socket, which would wrap a TCP socket as a Unix listener.
#[test]
fn given_description_of_other_family_when_adopted_then_family_mismatch() {
    let fd = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .into_raw_fd();
    let set = ListenerSet::new(vec![ListenerRecord::new("unix:/tmp/not-this.sock", fd)]);

    let result = InheritedListenerSet::new(set).open();

    assert!(matches!(result, Err(ListenerError::FamilyMismatch { .. })));
}

/// **BUG THIS CATCHES**: Would catch adopting a stream socket that never
/// called listen, leaving the accept loop failing on every attempt.
#[test]
fn given_connected_stream_when_adopted_then_invalid_descriptor() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let fd = TcpStream::connect(listener.local_addr().unwrap())
        .unwrap()
        .into_raw_fd();
    let set = ListenerSet::new(vec![ListenerRecord::new("tcp:127.0.0.1:8080", fd)]);

    let result = InheritedListenerSet::new(set).open();

    assert!(matches!(result, Err(ListenerError::InvalidDescriptor { .. })));
}

#[test]
fn given_bound_socket_not_listening_when_adopted_then_invalid_descriptor() {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
    socket
        .bind(&SocketAddr::from(([127, 0, 0, 1], 0)).into())
        .unwrap();
    let set = ListenerSet::new(vec![ListenerRecord::new(
        "tcp:127.0.0.1:8080",
        socket.into_raw_fd(),
    )]);

    let result = InheritedListenerSet::new(set).open();

    assert!(matches!(result, Err(ListenerError::InvalidDescriptor { .. })));
}

#[test]
fn given_closed_descriptor_when_adopted_then_invalid_descriptor() {
    let set = ListenerSet::new(vec![ListenerRecord::new("tcp:127.0.0.1:8080", 1_000_000)]);

    let result = InheritedListenerSet::new(set).open();

    assert!(matches!(result, Err(ListenerError::InvalidDescriptor { .. })));
}

#[test]
fn given_same_descriptor_twice_when_adopted_then_invalid_descriptor() {
    let set = ListenerSet::new(vec![
        ListenerRecord::new("tcp:127.0.0.1:8080", 1_000_000),
        ListenerRecord::new("tcp:127.0.0.1:8081", 1_000_000),
    ]);

    let result = InheritedListenerSet::new(set).open();

    assert!(matches!(result, Err(ListenerError::InvalidDescriptor { .. })));
}

#[tokio::test]
async fn given_acceptor_when_client_connects_then_connection_is_accepted() {
    let listeners = FreshListenerSet::new(vec![loopback_v4()], 16).open().unwrap();
    let listener = listeners.iter().next().unwrap();
    let mut acceptor = listener.acceptor().unwrap();

    let _client = TcpStream::connect(bound_socket_addr(listener.address())).unwrap();

    let accepted = TokioTimeout(WAIT, acceptor.accept()).await.unwrap();
    assert!(matches!(accepted, Some(Ok(Accepted::Tcp(_, _)))));
}

/// **VALUE**: Nothing is accepted after a stop, even a connection that is
/// already waiting in the backlog.
///
/// **WHY THIS MATTERS**: A connection accepted by the old process after the
/// stop would race the handoff; it belongs to the successor.
#[tokio::test]
async fn given_pending_connection_when_stopped_then_accept_returns_none() {
    // GIVEN: A connection waiting in the backlog
    let listeners = FreshListenerSet::new(vec![loopback_v4()], 16).open().unwrap();
    let listener = listeners.iter().next().unwrap();
    let mut acceptor = listener.acceptor().unwrap();
    let _client = TcpStream::connect(bound_socket_addr(listener.address())).unwrap();

    // WHEN: Stopping before the next accept
    listeners.stop_accepting();

    // THEN: The acceptor reports the stop instead of the connection
    let accepted = TokioTimeout(WAIT, acceptor.accept()).await.unwrap();
    assert!(accepted.is_none());
    assert!(!listener.is_accepting());
}

#[tokio::test]
async fn given_stopped_listener_when_acceptors_dropped_then_stopped_resolves() {
    let listeners = FreshListenerSet::new(vec![loopback_v4()], 16).open().unwrap();
    let acceptor = listeners.iter().next().unwrap().acceptor().unwrap();

    listeners.stop_accepting();
    drop(acceptor);

    TokioTimeout(WAIT, listeners.stopped()).await.unwrap();
}

#[tokio::test]
async fn given_stopped_listener_when_new_acceptor_requested_then_refused() {
    let listeners = FreshListenerSet::new(vec![loopback_v4()], 16).open().unwrap();
    listeners.stop_accepting();

    let result = listeners.iter().next().unwrap().acceptor();

    assert!(matches!(result, Err(ListenerError::Io { .. })));
}

/// **VALUE**: Capture yields exactly the live descriptors, ready for exec.
#[test]
fn given_two_listeners_when_captured_then_records_match_live_descriptors() {
    let listeners = FreshListenerSet::new(vec![loopback_v4(), loopback_v4()], 16)
        .open()
        .unwrap();

    let captured = listeners.capture().unwrap();

    assert_eq!(captured.len(), 2);
    for (record, listener) in captured.records().iter().zip(listeners.iter()) {
        assert_eq!(record.file_descriptor, listener.fileno());
        assert_eq!(record.description, listener.description());
        assert!(!is_close_on_exec(record.file_descriptor).unwrap());
    }
}
