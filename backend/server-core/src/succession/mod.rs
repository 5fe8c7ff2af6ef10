//! Process succession: stop accepting, drain, launch a successor that
//! inherits the listening sockets, then let this process finish.

mod command;

pub use command::{Successor, SuccessorCommand};

use crate::error::CoreError;
use crate::error::spawn::SpawnError;
use crate::gate::{HandoffTrigger, RequestGate};
use crate::listener::ActiveListeners;

use common::ErrorLocation;

use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::spawn as TokioSpawn;
use tokio::sync::oneshot;
use tokio::time::timeout as TokioTimeout;

type HandoffResult = Result<Successor, CoreError>;

/// Orchestrates the one-way handoff to a successor process.
pub struct Succession {
    this: Weak<Succession>,
    listeners: Arc<ActiveListeners>,
    gate: Arc<RequestGate>,
    command: SuccessorCommand,
    drain_timeout: Option<Duration>,
    started: AtomicBool,
    outcome: Mutex<Option<oneshot::Sender<HandoffResult>>>,
}

/// Receives the result of the handoff once it has run.
pub struct HandoffCompletion {
    receiver: oneshot::Receiver<HandoffResult>,
}

impl HandoffCompletion {
    /// # Errors
    ///
    /// Returns the handoff's own error, or [`SpawnError::Abandoned`] if the
    /// handoff task ended without reporting.
    pub async fn wait(self) -> HandoffResult {
        self.receiver.await.map_err(|_| {
            CoreError::from(SpawnError::Abandoned {
                message: "Handoff task ended without reporting an outcome".to_string(),
                location: ErrorLocation::from(Location::caller()),
            })
        })?
    }
}

impl Succession {
    pub fn new(
        listeners: Arc<ActiveListeners>,
        gate: Arc<RequestGate>,
        command: SuccessorCommand,
        drain_timeout: Option<Duration>,
    ) -> (Arc<Self>, HandoffCompletion) {
        let (sender, receiver) = oneshot::channel();

        let succession = Arc::new_cyclic(|this| Self {
            this: this.clone(),
            listeners,
            gate,
            command,
            drain_timeout,
            started: AtomicBool::new(false),
            outcome: Mutex::new(Some(sender)),
        });

        (succession, HandoffCompletion { receiver })
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Capture, encode and launch. Assumes accepting has stopped.
    async fn hand_off(&self) -> HandoffResult {
        self.listeners.stopped().await;
        info!("All listeners stopped accepting; waiting for in-flight requests");

        match self.drain_timeout {
            None => self.gate.drained().await,
            Some(limit) => {
                if TokioTimeout(limit, self.gate.drained()).await.is_err() {
                    warn!(
                        "Drain timeout of {limit:?} elapsed with {} request(s) in flight; handing off anyway",
                        self.gate.state().in_flight
                    );
                }
            }
        }

        let captured = self.listeners.capture()?;
        self.command.spawn(&captured)
    }

    fn report(&self, outcome: HandoffResult) {
        let sender = self
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match sender {
            Some(sender) => {
                if sender.send(outcome).is_err() {
                    debug!("Nobody is waiting for the handoff outcome");
                }
            }
            None => warn!("Handoff outcome reported twice"),
        }
    }
}

impl HandoffTrigger for Succession {
    /// Idempotent. The first call stops every listener before returning, so
    /// no connection is accepted after the request that reached the quota;
    /// the drain and launch continue on a separate task.
    fn begin_handoff(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Handoff already in progress");
            return;
        }

        self.gate.trigger_shutdown();
        self.listeners.stop_accepting();

        let Some(this) = self.this.upgrade() else {
            return;
        };

        TokioSpawn(async move {
            let outcome = this.hand_off().await;
            if let Err(e) = &outcome {
                error!("Handoff failed: {e}");
            }
            this.report(outcome);
        });
    }
}
