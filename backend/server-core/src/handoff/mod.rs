//! Handoff record: the listening sockets one process passes to its successor.
//!
//! The record travels in a single environment variable. Records are joined
//! with ASCII RS and, inside a record, the description and descriptor number
//! are joined with ASCII US. Neither byte can appear in a listener
//! description, so arbitrary description text never collides with framing.
//!
//! Only [`environment`] reads the variable. The rest of the crate sees a
//! decoded [`ListenerSet`].

pub mod environment;
mod record;

pub use environment::HANDOFF_ENV_VAR;
pub use record::{FIELD_SEPARATOR, ListenerRecord, ListenerSet, RECORD_SEPARATOR};
