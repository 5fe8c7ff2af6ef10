use crate::error::CoreError;
use crate::error::spawn::SpawnError;
use crate::handoff::{ListenerSet, environment};

use common::ErrorLocation;

use std::env::{args_os, current_exe};
use std::ffi::OsString;
use std::mem::forget;
use std::panic::Location;
use std::path::PathBuf;

use log::{debug, info};
use tokio::process::Command as TokioCommand;

/// The process launched to take over the listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Successor {
    pub pid: u32,
}

/// Program and arguments for the successor process.
#[derive(Debug, Clone)]
pub struct SuccessorCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl SuccessorCommand {
    pub fn new(
        program: impl Into<PathBuf>,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Relaunch this very program with the same arguments.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError::Spawn`] if the executable path is unavailable.
    #[track_caller]
    pub fn current_process() -> Result<Self, SpawnError> {
        let program = current_exe().map_err(|e| SpawnError::Spawn {
            message: format!("Failed to get current executable path: {e}"),
            location: ErrorLocation::from(Location::caller()),
            source: Box::new(e),
        })?;

        Ok(Self::new(program, args_os().skip(1)))
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    pub(crate) fn build(&self, listeners: &ListenerSet) -> Result<TokioCommand, CoreError> {
        let (name, value) = environment::successor_variable(listeners)?;

        let mut command = TokioCommand::new(&self.program);
        command.args(&self.args).env(name, value);
        Ok(command)
    }

    /// Launch the successor. The captured descriptors are not close-on-exec,
    /// so they survive into the child under the same numbers.
    pub(crate) fn spawn(&self, listeners: &ListenerSet) -> Result<Successor, CoreError> {
        debug!(
            "Launching successor {} with {} listener(s)",
            self.program.display(),
            listeners.len()
        );

        let child = self.build(listeners)?.spawn().map_err(|e| SpawnError::Spawn {
            message: format!("Failed to launch successor {}: {e}", self.program.display()),
            location: ErrorLocation::from(Location::caller()),
            source: Box::new(e),
        })?;

        let pid = child.id().unwrap_or_default();
        info!("Successor launched (PID: {pid})");

        // Detach: the successor outlives this process.
        forget(child);

        Ok(Successor { pid })
    }
}
