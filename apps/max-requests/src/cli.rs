//! Command line of the `max-requests` binary.
//!
//! Flags override the values of the optional TOML config file, which in turn
//! override the built-in defaults. The successor is launched with the very
//! same arguments, so it resolves the same configuration.

use server_core::config::ServerConfig;
use server_core::error::ConfigError;

use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "max-requests")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Listener address: tcp:PORT, tcp:HOST:PORT, tcp6:PORT, tcp6:[HOST]:PORT
    /// or unix:PATH. Repeatable.
    #[arg(long = "listen", value_name = "ADDRESS")]
    pub listen: Vec<String>,

    /// Requests served before handing the listeners to a new process
    #[arg(long, value_name = "N")]
    pub max_requests: Option<u64>,

    /// Access log in Combined Log Format
    #[arg(short = 'l', long = "logfile", value_name = "PATH")]
    pub access_log: Option<PathBuf>,

    /// Upper bound on draining in-flight requests, e.g. "30s"
    #[arg(long, value_name = "DURATION")]
    pub drain_timeout: Option<String>,

    /// Listen backlog for freshly bound sockets
    #[arg(long, value_name = "N")]
    pub backlog: Option<i32>,

    /// Diagnostic log file, in addition to stdout
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Diagnostic log level (error, warn, info, debug, trace)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<LevelFilter>,

    /// Name of the application to serve (hello, echo, pid)
    #[arg(value_name = "APPLICATION")]
    pub application: Option<String>,
}

impl Cli {
    /// Load the config file (if any), apply the flags and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or the
    /// merged values are invalid.
    pub fn resolve(&self) -> Result<ServerConfig, ConfigError> {
        let mut config = ServerConfig::load(self.config.as_deref())?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Overwrite every value given on the command line.
    pub fn apply(&self, config: &mut ServerConfig) {
        if !self.listen.is_empty() {
            config.listen = self.listen.clone();
        }
        if let Some(max_requests) = self.max_requests {
            config.max_requests = max_requests;
        }
        if let Some(path) = &self.access_log {
            config.access_log = Some(path.clone());
        }
        if let Some(timeout) = &self.drain_timeout {
            config.drain_timeout = Some(timeout.clone());
        }
        if let Some(backlog) = self.backlog {
            config.backlog = backlog;
        }
        if let Some(application) = &self.application {
            config.application = application.clone();
        }
    }
}
