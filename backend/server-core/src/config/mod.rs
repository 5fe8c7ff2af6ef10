use crate::error::config::ConfigError;
use crate::listener::ListenerAddress;

use common::ErrorLocation;

use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_REQUESTS: u64 = 100;
pub const DEFAULT_LISTEN: &str = "tcp:8080";
pub const DEFAULT_BACKLOG: i32 = 1024;
pub const DEFAULT_APPLICATION: &str = "hello";

// ============================================
// CONFIG STRUCTS
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Requests served before this process hands its listeners to a successor.
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// Listener descriptions bound on first boot.
    #[serde(default = "default_listen")]
    pub listen: Vec<String>,

    /// Combined Log Format access log.
    #[serde(default)]
    pub access_log: Option<PathBuf>,

    /// Upper bound on waiting for in-flight requests, e.g. `"30s"`. Unbounded when absent.
    #[serde(default)]
    pub drain_timeout: Option<String>,

    #[serde(default = "default_backlog")]
    pub backlog: i32,

    /// Registered name of the application to serve.
    #[serde(default = "default_application")]
    pub application: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            listen: default_listen(),
            access_log: None,
            drain_timeout: None,
            backlog: default_backlog(),
            application: default_application(),
        }
    }
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_max_requests() -> u64 {
    DEFAULT_MAX_REQUESTS
}
fn default_listen() -> Vec<String> {
    vec![DEFAULT_LISTEN.to_string()]
}
fn default_backlog() -> i32 {
    DEFAULT_BACKLOG
}
fn default_application() -> String {
    DEFAULT_APPLICATION.to_string()
}

// ============================================
// IMPLEMENTATION
// ============================================

impl ServerConfig {
    /// Load a TOML config file, or defaults when no path is given.
    ///
    /// An explicitly named file that cannot be read is an error; a missing
    /// config must not silently start a server on the default port.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadError`] or [`ConfigError::ParseError`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            location: ErrorLocation::from(Location::caller()),
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: ServerConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
                location: ErrorLocation::from(Location::caller()),
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        info!("Config loaded from {}", path.display());
        Ok(config)
    }

    /// Validate config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_requests == 0 {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "max_requests must be at least 1".to_string(),
            });
        }

        if self.backlog <= 0 {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!("Invalid backlog: {} (must be positive)", self.backlog),
            });
        }

        self.listen_addresses()?;
        self.drain_timeout()?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for an empty list or an
    /// unparseable description.
    pub fn listen_addresses(&self) -> Result<Vec<ListenerAddress>, ConfigError> {
        if self.listen.is_empty() {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "At least one listen address is required".to_string(),
            });
        }

        self.listen
            .iter()
            .map(|description| {
                description
                    .parse::<ListenerAddress>()
                    .map_err(|e| ConfigError::ValidationError {
                        location: ErrorLocation::from(Location::caller()),
                        reason: format!("Invalid listen address {description:?}: {e}"),
                    })
            })
            .collect()
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if the value is not a duration.
    pub fn drain_timeout(&self) -> Result<Option<Duration>, ConfigError> {
        self.drain_timeout
            .as_deref()
            .map(|raw| {
                humantime::parse_duration(raw).map_err(|e| ConfigError::ValidationError {
                    location: ErrorLocation::from(Location::caller()),
                    reason: format!("Invalid drain timeout {raw:?}: {e}"),
                })
            })
            .transpose()
    }
}
