use std::sync::Arc;

use log::{debug, info};
use tokio::sync::watch;

/// Where the gate is in its one-way life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    /// Quota not reached yet.
    Accepting,
    /// Quota reached, requests still in flight.
    Draining,
    /// Quota reached and every request finished. Terminal.
    Drained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateState {
    pub in_flight: u64,
    pub served: u64,
    pub phase: GatePhase,
}

impl GateState {
    pub fn quota_exceeded(&self) -> bool {
        self.phase != GatePhase::Accepting
    }

    pub fn finished(&self) -> bool {
        self.phase == GatePhase::Drained
    }
}

/// Outcome of counting a request start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStart {
    /// Counted; nothing else to do.
    Counted,
    /// This request reached the quota. Reported to exactly one request.
    QuotaReached,
}

/// In-flight request accounting with a one-shot "drained" notification.
///
/// The state lives in a `watch` channel: subscribers are only woken on phase
/// changes, and a subscriber that arrives after the gate drained sees the
/// terminal phase immediately instead of waiting for a notification that
/// already happened.
pub struct RequestGate {
    maximum_requests: u64,
    state: watch::Sender<GateState>,
}

impl RequestGate {
    pub fn new(maximum_requests: u64) -> Arc<Self> {
        Arc::new(Self {
            maximum_requests,
            state: watch::Sender::new(GateState {
                in_flight: 0,
                served: 0,
                phase: GatePhase::Accepting,
            }),
        })
    }

    pub fn maximum_requests(&self) -> u64 {
        self.maximum_requests
    }

    pub fn state(&self) -> GateState {
        *self.state.borrow()
    }

    /// Count a request start.
    ///
    /// The returned guard decrements the in-flight count when dropped, which
    /// covers normal completion, application failure and client disconnect
    /// alike. The request that brings the total to the configured maximum
    /// is itself served normally.
    pub fn request_started(self: &Arc<Self>) -> (InFlightGuard, RequestStart) {
        let mut start = RequestStart::Counted;
        let maximum = self.maximum_requests;

        self.state.send_if_modified(|state| {
            state.in_flight += 1;
            state.served += 1;
            if state.phase == GatePhase::Accepting && state.served >= maximum {
                state.phase = GatePhase::Draining;
                start = RequestStart::QuotaReached;
                return true;
            }
            false
        });

        if start == RequestStart::QuotaReached {
            info!("Received {maximum} request(s); will stop accepting connections on all listeners");
        }

        (
            InFlightGuard {
                gate: Arc::clone(self),
            },
            start,
        )
    }

    /// Move to `Draining` (or straight to `Drained` with nothing in flight).
    ///
    /// Returns `true` only for the call that made the transition; every
    /// later or concurrent call returns `false`.
    pub fn trigger_shutdown(&self) -> bool {
        let mut triggered = false;

        self.state.send_if_modified(|state| {
            if state.phase != GatePhase::Accepting {
                return false;
            }
            triggered = true;
            state.phase = if state.in_flight == 0 {
                GatePhase::Drained
            } else {
                GatePhase::Draining
            };
            true
        });

        if triggered {
            debug!("Request gate shut down: {:?}", self.state());
        }
        triggered
    }

    fn request_finished(&self) {
        let drained = self.state.send_if_modified(|state| {
            state.in_flight = state.in_flight.saturating_sub(1);
            if state.phase == GatePhase::Draining && state.in_flight == 0 {
                state.phase = GatePhase::Drained;
                return true;
            }
            false
        });

        if drained {
            info!("Last in-flight request finished; request gate drained");
        }
    }

    /// Resolves once the gate is `Drained`; immediately if it already is.
    pub async fn drained(&self) {
        let mut receiver = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = receiver.wait_for(GateState::finished).await;
    }

    /// Resolves once the quota has been reached; immediately if it already was.
    pub async fn quota_exceeded(&self) {
        let mut receiver = self.state.subscribe();
        let _ = receiver.wait_for(GateState::quota_exceeded).await;
    }
}

/// Holds one unit of the in-flight count until dropped.
pub struct InFlightGuard {
    gate: Arc<RequestGate>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.gate.request_finished();
    }
}

impl std::fmt::Debug for InFlightGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightGuard")
            .field("state", &self.gate.state())
            .finish()
    }
}
