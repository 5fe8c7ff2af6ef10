//! Connection draining.
//!
//! [`RequestGate`] counts requests in flight and moves through
//! `Accepting -> Draining -> Drained` once the request quota is reached.
//! [`RequestCounter`] wraps the application dispatch path and reports every
//! request start and completion to the gate.

mod counter;
mod request_gate;

pub use counter::{ConnectionActivity, CountedBody, RequestCounter};
pub use request_gate::{GatePhase, GateState, InFlightGuard, RequestGate, RequestStart};

/// Invoked exactly once, by the request that reaches the quota.
pub trait HandoffTrigger: Send + Sync {
    /// Must not block; the caller is on the request path.
    fn begin_handoff(&self);
}
