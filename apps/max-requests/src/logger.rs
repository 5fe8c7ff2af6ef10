//! Diagnostic logging for the server process.
//!
//! Colored stdout output plus an optional plain-text file, with thread-safe
//! initialization. A successor process installs its own logger on start.

use crate::error::MaxRequestsError;

use common::ErrorLocation;

use std::io::stdout;
use std::panic::Location;
use std::path::Path;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use fern::Dispatch;
use fern::colors::Color::{Blue, Green, Magenta, Red, Yellow};
use fern::colors::ColoredLevelConfig;
use humantime::format_rfc3339;
use log::{LevelFilter, info, warn};

/// Thread-safe initialization guard.
static INIT_LOGGER_ONCE: Once = Once::new();

/// Tracks if logger initialization was already attempted.
static LOGGER_ALREADY_CALLED: AtomicBool = AtomicBool::new(false);

const LOGGER_INITIALIZED_MESSAGE_PREFIX: &str = "Logger initialized with level: ";

const LOGGER_ALREADY_INITIALIZED_MESSAGE: &str = "Logger already initialized";

/// Default log level for debug builds.
#[cfg(debug_assertions)]
pub const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Debug;

/// Default log level for release builds.
#[cfg(not(debug_assertions))]
pub const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Info;

/// Initialize the logger: stdout always, `log_file` when given.
///
/// Safe to call multiple times; later calls log a warning and return Ok.
///
/// # Errors
///
/// Returns [`MaxRequestsError::Logger`] if the log file cannot be opened or
/// another global logger is already installed.
pub fn initialize(
    log_file: Option<&Path>,
    level: Option<LevelFilter>,
) -> Result<(), MaxRequestsError> {
    if LOGGER_ALREADY_CALLED.swap(true, Ordering::SeqCst) {
        warn!("{LOGGER_ALREADY_INITIALIZED_MESSAGE}");
        return Ok(());
    }

    let level = level.unwrap_or(DEFAULT_LOG_LEVEL);
    let mut result = Ok(());

    INIT_LOGGER_ONCE.call_once(|| {
        result = initialize_internal(log_file, level);
        if result.is_ok() {
            info!("{LOGGER_INITIALIZED_MESSAGE_PREFIX}{level:?}");
        }
    });

    result
}

#[track_caller]
pub(crate) fn initialize_internal(
    log_file: Option<&Path>,
    level: LevelFilter,
) -> Result<(), MaxRequestsError> {
    let color_configuration = ColoredLevelConfig::new()
        .debug(Blue)
        .info(Green)
        .warn(Yellow)
        .error(Red)
        .trace(Magenta);

    let pid = std::process::id();

    let stdout_dispatch = Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{date} - {level} - {pid}] {message} [{file}:{line}]",
                date = format_rfc3339(SystemTime::now()),
                level = color_configuration.color(record.level()),
                message = message,
                file = record.file().unwrap_or("unknown"),
                line = record.line().unwrap_or(0),
            ))
        })
        .chain(stdout());

    let mut base_dispatch = Dispatch::new().level(level).chain(stdout_dispatch);

    // Plain text, no colors
    if let Some(path) = log_file {
        let file = fern::log_file(path).map_err(|e| MaxRequestsError::Logger {
            message: format!("Failed to open log file {}: {e}", path.display()),
            location: ErrorLocation::from(Location::caller()),
        })?;

        base_dispatch = base_dispatch.chain(
            Dispatch::new()
                .format(move |out, message, record| {
                    out.finish(format_args!(
                        "[{date} - {level} - {pid}] {message} [{file}:{line}]",
                        date = format_rfc3339(SystemTime::now()),
                        level = record.level(),
                        message = message,
                        file = record.file().unwrap_or("unknown"),
                        line = record.line().unwrap_or(0)
                    ))
                })
                .chain(file),
        );
    }

    base_dispatch.apply().map_err(|e| MaxRequestsError::Logger {
        message: format!("Failed to initialize logger: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    Ok(())
}
