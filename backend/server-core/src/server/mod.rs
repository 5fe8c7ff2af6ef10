//! The max-requests server: open listeners, serve until the quota, hand
//! the listeners to a successor, finish the remaining connections, return.

mod connection;

use connection::{ConnectionContext, accept_loop};

use crate::access_log::AccessLog;
use crate::application::{Application, ApplicationRegistry};
use crate::config::ServerConfig;
use crate::error::CoreError;
use crate::gate::{HandoffTrigger, RequestGate};
use crate::handoff::environment;
use crate::listener::{ActiveListeners, FreshListenerSet, InheritedListenerSet, ListenerSource};
use crate::succession::{HandoffCompletion, Succession, Successor, SuccessorCommand};

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::task::JoinSet;
use tokio::time::timeout as TokioTimeout;

/// Everything a [`Server`] needs besides its listeners.
pub struct ServerOptions {
    pub max_requests: u64,
    pub drain_timeout: Option<Duration>,
    pub application: Arc<dyn Application>,
    pub access_log: Option<Arc<AccessLog>>,
    pub successor: SuccessorCommand,
}

impl ServerOptions {
    /// Resolve a validated config into server options.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] for invalid values or an access log that
    /// cannot be opened, and [`CoreError::Application`] for an unknown
    /// application name.
    pub fn from_config(
        config: &ServerConfig,
        registry: &ApplicationRegistry,
        successor: SuccessorCommand,
    ) -> Result<Self, CoreError> {
        config.validate()?;

        let application = registry.resolve(&config.application)?;
        let access_log = config
            .access_log
            .as_deref()
            .map(AccessLog::open)
            .transpose()?
            .map(Arc::new);

        Ok(Self {
            max_requests: config.max_requests,
            drain_timeout: config.drain_timeout()?,
            application,
            access_log,
            successor,
        })
    }
}

/// Open the listeners this process starts with.
///
/// Descriptors handed down by a predecessor win; the configured addresses
/// are only bound on a first boot.
///
/// # Errors
///
/// Returns [`CoreError::Handoff`] for a malformed handoff variable,
/// [`CoreError::Listener`] if a listener cannot be adopted or bound, and
/// [`CoreError::Config`] for invalid listen addresses.
pub fn open_listeners(config: &ServerConfig) -> Result<ActiveListeners, CoreError> {
    let inherited = environment::inherited_listeners()?;

    if inherited.is_empty() {
        let addresses = config.listen_addresses()?;
        info!("First boot: binding {} listener(s)", addresses.len());
        return Ok(FreshListenerSet::new(addresses, config.backlog).open()?);
    }

    info!(
        "Adopting {} listener(s) from predecessor; configured listen addresses are ignored",
        inherited.len()
    );
    Ok(InheritedListenerSet::new(inherited).open()?)
}

pub struct Server {
    listeners: Arc<ActiveListeners>,
    gate: Arc<RequestGate>,
    succession: Arc<Succession>,
    completion: HandoffCompletion,
    application: Arc<dyn Application>,
    access_log: Option<Arc<AccessLog>>,
    drain_timeout: Option<Duration>,
}

impl Server {
    pub fn new(listeners: ActiveListeners, options: ServerOptions) -> Self {
        let listeners = Arc::new(listeners);
        let gate = RequestGate::new(options.max_requests);
        let (succession, completion) = Succession::new(
            Arc::clone(&listeners),
            Arc::clone(&gate),
            options.successor,
            options.drain_timeout,
        );

        Self {
            listeners,
            gate,
            succession,
            completion,
            application: options.application,
            access_log: options.access_log,
            drain_timeout: options.drain_timeout,
        }
    }

    pub fn listeners(&self) -> &ActiveListeners {
        &self.listeners
    }

    pub fn gate(&self) -> &Arc<RequestGate> {
        &self.gate
    }

    /// Start the handoff without waiting for the quota.
    pub fn trigger(&self) -> Arc<dyn HandoffTrigger> {
        Arc::clone(&self.succession) as Arc<dyn HandoffTrigger>
    }

    /// Serve until the quota is reached and a successor has taken over.
    ///
    /// Returns once the successor is running and every connection this
    /// process accepted has finished (or the drain timeout elapsed again).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError`] if accepting cannot start, the listeners cannot
    /// be captured, or the successor cannot be launched. Open connections
    /// are dropped in that case.
    pub async fn run(self) -> Result<Successor, CoreError> {
        let context = ConnectionContext {
            gate: Arc::clone(&self.gate),
            trigger: self.trigger(),
            application: self.application,
            access_log: self.access_log,
        };

        let mut accept_loops = JoinSet::new();
        for listener in self.listeners.iter() {
            accept_loops.spawn(accept_loop(listener.acceptor()?, context.clone()));
            info!("Accepting connections on {}", listener.address());
        }
        drop(context);

        info!(
            "Serving up to {} request(s) in PID {}",
            self.gate.maximum_requests(),
            std::process::id()
        );

        let successor = self.completion.wait().await?;
        info!(
            "Successor PID {} owns the listeners; finishing open connections",
            successor.pid
        );

        let finish = async { while accept_loops.join_next().await.is_some() {} };
        match self.drain_timeout {
            None => finish.await,
            Some(limit) => {
                if TokioTimeout(limit, finish).await.is_err() {
                    warn!("Connections still open after {limit:?}; exiting anyway");
                }
            }
        }

        Ok(successor)
    }
}
