//! Close-on-exec handling for descriptors that must survive a successor launch.

use crate::error::listener::ListenerError;

use common::ErrorLocation;

use std::os::fd::RawFd;
use std::panic::Location;

use log::trace;
use nix::fcntl::{FcntlArg, FdFlag, fcntl};

/// Read the descriptor flags, failing if `fd` is not open in this process.
#[track_caller]
fn descriptor_flags(fd: RawFd) -> Result<FdFlag, ListenerError> {
    fcntl(fd, FcntlArg::F_GETFD)
        .map(FdFlag::from_bits_truncate)
        .map_err(|errno| ListenerError::InvalidDescriptor {
            message: format!("Descriptor {fd} is not open: {errno}"),
            location: ErrorLocation::from(Location::caller()),
        })
}

pub fn is_open(fd: RawFd) -> bool {
    fcntl(fd, FcntlArg::F_GETFD).is_ok()
}

#[track_caller]
pub fn is_close_on_exec(fd: RawFd) -> Result<bool, ListenerError> {
    Ok(descriptor_flags(fd)?.contains(FdFlag::FD_CLOEXEC))
}

/// Clear `FD_CLOEXEC` so `fd` stays open across exec. Idempotent.
#[track_caller]
pub fn clear_close_on_exec(fd: RawFd) -> Result<(), ListenerError> {
    let flags = descriptor_flags(fd)?;
    if !flags.contains(FdFlag::FD_CLOEXEC) {
        return Ok(());
    }

    fcntl(fd, FcntlArg::F_SETFD(flags.difference(FdFlag::FD_CLOEXEC))).map_err(|errno| {
        ListenerError::CloseOnExec {
            message: format!("Failed to clear close-on-exec on descriptor {fd}: {errno}"),
            location: ErrorLocation::from(Location::caller()),
        }
    })?;

    trace!("Cleared close-on-exec on descriptor {fd}");
    Ok(())
}
