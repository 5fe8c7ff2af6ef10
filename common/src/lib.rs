//! Types shared by every crate in the max-requests workspace.
//!
//! Errors across the workspace carry an [`ErrorLocation`] so that a fatal
//! diagnostic printed at process exit points at the exact line that raised it.

pub mod error;

pub use error::error_location::ErrorLocation;
