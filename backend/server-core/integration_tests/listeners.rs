use server_core::config::ServerConfig;
use server_core::handoff::{HANDOFF_ENV_VAR, ListenerRecord, ListenerSet};
use server_core::listener::AddressFamily;
use server_core::server::open_listeners;

use std::os::fd::IntoRawFd;

use serial_test::serial;
use tempfile::tempdir;

// ============================================================================
// Choosing between a first boot and an inherited start
// ============================================================================

/// **VALUE**: With no handoff variable, the configured addresses are bound.
#[test]
#[serial]
fn given_no_handoff_variable_when_opening_then_configured_addresses_bound() {
    // SAFETY: environment access is serialized across this test binary.
    unsafe { std::env::remove_var(HANDOFF_ENV_VAR) };
    let dir = tempdir().unwrap();
    let path = dir.path().join("fresh.sock");
    let config = ServerConfig {
        listen: vec![
            "tcp:127.0.0.1:0".to_string(),
            format!("unix:{}", path.display()),
        ],
        ..ServerConfig::default()
    };

    let listeners = open_listeners(&config).unwrap();

    let families: Vec<AddressFamily> = listeners
        .iter()
        .map(|listener| listener.address().family())
        .collect();
    assert_eq!(families, vec![AddressFamily::Ipv4, AddressFamily::Unix]);
}

/// **VALUE**: A successor adopts what it was handed and ignores its own
/// listen configuration.
///
/// **BUG THIS CATCHES**: Would catch a successor re-binding the configured
/// port, which fails with "address in use" while the inherited socket is
/// still open.
#[test]
#[serial]
fn given_handoff_variable_when_opening_then_inherited_listeners_adopted() {
    // GIVEN: A handed-down listening socket and a config naming another port
    let inherited = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let local = inherited.local_addr().unwrap();
    let fd = inherited.into_raw_fd();
    let value = ListenerSet::new(vec![ListenerRecord::new(format!("tcp:{local}"), fd)])
        .encode()
        .unwrap();
    // SAFETY: environment access is serialized across this test binary.
    unsafe { std::env::set_var(HANDOFF_ENV_VAR, &value) };
    let config = ServerConfig {
        listen: vec!["tcp:127.0.0.1:1".to_string()],
        ..ServerConfig::default()
    };

    // WHEN: Opening listeners
    let result = open_listeners(&config);
    // SAFETY: as above.
    unsafe { std::env::remove_var(HANDOFF_ENV_VAR) };

    // THEN: Exactly the inherited descriptor
    let listeners = result.unwrap();
    assert_eq!(listeners.len(), 1);
    let listener = listeners.iter().next().unwrap();
    assert_eq!(listener.fileno(), fd);
    assert_eq!(listener.description(), format!("tcp:{local}"));
}
