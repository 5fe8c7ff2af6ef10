use crate::config::{DEFAULT_BACKLOG, DEFAULT_MAX_REQUESTS, ServerConfig};
use crate::error::config::ConfigError;
use crate::listener::ListenerAddress;

use std::path::Path;
use std::time::Duration;

use tempfile::tempdir;

#[test]
fn given_no_config_file_when_loaded_then_defaults() {
    let config = ServerConfig::load(None).unwrap();

    assert_eq!(config, ServerConfig::default());
    assert_eq!(config.max_requests, DEFAULT_MAX_REQUESTS);
    assert_eq!(config.backlog, DEFAULT_BACKLOG);
    assert_eq!(config.listen, vec!["tcp:8080".to_string()]);
    assert_eq!(config.application, "hello");
    assert!(config.validate().is_ok());
}

/// **VALUE**: Fields left out of the file keep their defaults.
#[test]
fn given_partial_file_when_loaded_then_missing_fields_default() {
    // GIVEN: A file that sets only two fields
    let dir = tempdir().unwrap();
    let path = dir.path().join("server.toml");
    std::fs::write(
        &path,
        "max_requests = 5\nlisten = [\"tcp:127.0.0.1:9000\", \"unix:/tmp/app.sock\"]\n",
    )
    .unwrap();

    // WHEN: Loading it
    let config = ServerConfig::load(Some(&path)).unwrap();

    // THEN: Given fields applied, the rest defaulted
    assert_eq!(config.max_requests, 5);
    assert_eq!(config.listen.len(), 2);
    assert_eq!(config.backlog, DEFAULT_BACKLOG);
    assert_eq!(config.access_log, None);

    let addresses = config.listen_addresses().unwrap();
    assert!(matches!(addresses[0], ListenerAddress::Tcp(_)));
    assert!(matches!(addresses[1], ListenerAddress::Unix(_)));
}

#[test]
fn given_named_file_missing_when_loaded_then_read_error() {
    let result = ServerConfig::load(Some(Path::new("/nonexistent/max-requests.toml")));

    assert!(matches!(result, Err(ConfigError::ReadError { .. })));
}

#[test]
fn given_invalid_toml_when_loaded_then_parse_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("server.toml");
    std::fs::write(&path, "max_requests = \"many\"\n").unwrap();

    let result = ServerConfig::load(Some(&path));

    assert!(matches!(result, Err(ConfigError::ParseError { .. })));
}

#[test]
fn given_invalid_values_when_validated_then_validation_error() {
    let cases = [
        ServerConfig {
            max_requests: 0,
            ..ServerConfig::default()
        },
        ServerConfig {
            listen: Vec::new(),
            ..ServerConfig::default()
        },
        ServerConfig {
            listen: vec!["udp:53".to_string()],
            ..ServerConfig::default()
        },
        ServerConfig {
            backlog: 0,
            ..ServerConfig::default()
        },
        ServerConfig {
            drain_timeout: Some("soon".to_string()),
            ..ServerConfig::default()
        },
    ];

    for config in &cases {
        assert!(
            matches!(config.validate(), Err(ConfigError::ValidationError { .. })),
            "Expected validation error for {config:?}"
        );
    }
}

#[test]
fn given_drain_timeout_when_parsed_then_humantime_duration() {
    let config = ServerConfig {
        drain_timeout: Some("1m 30s".to_string()),
        ..ServerConfig::default()
    };

    assert_eq!(config.drain_timeout().unwrap(), Some(Duration::from_secs(90)));
    assert_eq!(ServerConfig::default().drain_timeout().unwrap(), None);
}
