//! The one place that touches the handoff environment variable.

use crate::error::handoff::HandoffError;
use crate::handoff::ListenerSet;

use common::ErrorLocation;

use std::env::{VarError, var};
use std::panic::Location;

use log::debug;

/// Environment variable carrying the encoded [`ListenerSet`] to a successor.
pub const HANDOFF_ENV_VAR: &str = "MAX_REQUESTS_LISTENERS";

/// Read and decode the handoff variable of the current process.
///
/// An absent variable is a first boot and yields an empty set.
///
/// # Errors
///
/// Returns [`HandoffError::Environment`] if the value is not valid unicode and
/// [`HandoffError::MalformedHandoffRecord`] if it does not decode.
#[track_caller]
pub fn inherited_listeners() -> Result<ListenerSet, HandoffError> {
    let value = match var(HANDOFF_ENV_VAR) {
        Ok(value) => Some(value),
        Err(VarError::NotPresent) => None,
        Err(VarError::NotUnicode(raw)) => {
            return Err(HandoffError::Environment {
                message: format!("{HANDOFF_ENV_VAR} is not valid unicode: {raw:?}"),
                location: ErrorLocation::from(Location::caller()),
            });
        }
    };

    let set = ListenerSet::decode(value.as_deref())?;
    debug!(
        "{HANDOFF_ENV_VAR} carries {} inherited listener(s)",
        set.len()
    );
    Ok(set)
}

/// The `(name, value)` pair to place in a successor's environment.
///
/// # Errors
///
/// Propagates [`ListenerSet::encode`] failures.
#[track_caller]
pub fn successor_variable(set: &ListenerSet) -> Result<(&'static str, String), HandoffError> {
    Ok((HANDOFF_ENV_VAR, set.encode()?))
}
