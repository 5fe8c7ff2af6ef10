//! Combined Log Format access log.

use crate::error::config::ConfigError;

use common::ErrorLocation;

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, warn};

const CLF_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S +0000";
const MISSING: &str = "-";

/// One finished request, as it appears in the access log.
#[derive(Debug, Clone)]
pub struct AccessEntry {
    pub remote: Option<SocketAddr>,
    pub method: String,
    pub target: String,
    pub version: String,
    pub status: u16,
    pub bytes: usize,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
}

impl AccessEntry {
    /// `host - - [time] "request" status bytes "referer" "user-agent"`
    pub fn format_line(&self, time: DateTime<Utc>) -> String {
        let host = self
            .remote
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| MISSING.to_string());

        format!(
            "{host} - - [{time}] \"{method} {target} {version}\" {status} {bytes} \"{referer}\" \"{agent}\"",
            time = time.format(CLF_TIME_FORMAT),
            method = quote_safe(&self.method),
            target = quote_safe(&self.target),
            version = self.version,
            status = self.status,
            bytes = self.bytes,
            referer = quote_safe(self.referer.as_deref().unwrap_or(MISSING)),
            agent = quote_safe(self.user_agent.as_deref().unwrap_or(MISSING)),
        )
    }
}

fn quote_safe(value: &str) -> String {
    value.replace('"', "\\\"")
}

/// Append-only access log file shared by every connection.
pub struct AccessLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl AccessLog {
    /// # Errors
    ///
    /// Returns [`ConfigError::AccessLog`] if the file cannot be opened for appending.
    #[track_caller]
    pub fn open(path: &Path) -> Result<Self, ConfigError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ConfigError::AccessLog {
                location: ErrorLocation::from(Location::caller()),
                path: path.to_path_buf(),
                source: e,
            })?;

        debug!("Access log opened at {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line. Failures are logged, never returned: losing a log
    /// line must not fail the request.
    pub fn record(&self, entry: &AccessEntry) {
        let mut line = entry.format_line(Utc::now());
        line.push('\n');

        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = file.write_all(line.as_bytes()) {
            warn!("Failed to write access log {}: {e}", self.path.display());
        }
    }
}
