use crate::access_log::AccessLog;
use crate::application::{Application, ApplicationService};
use crate::gate::{HandoffTrigger, RequestCounter, RequestGate};
use crate::listener::{Accepted, Acceptor};

use std::net::SocketAddr;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use log::{debug, trace, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinSet;
use tokio::time::sleep as TokioSleep;

/// Pause after a failed accept so a persistent error (e.g. descriptor
/// exhaustion) does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Everything a connection needs, shared by every accept loop.
#[derive(Clone)]
pub(crate) struct ConnectionContext {
    pub(crate) gate: Arc<RequestGate>,
    pub(crate) trigger: Arc<dyn HandoffTrigger>,
    pub(crate) application: Arc<dyn Application>,
    pub(crate) access_log: Option<Arc<AccessLog>>,
}

/// Accept until the listener stops, then wait for this loop's connections.
///
/// The acceptor is released as soon as accepting ends, which is what lets
/// the handoff proceed while the remaining connections finish.
pub(crate) async fn accept_loop(mut acceptor: Acceptor, context: ConnectionContext) {
    let address = acceptor.address().clone();
    let mut connections = JoinSet::new();

    while let Some(accepted) = acceptor.accept().await {
        match accepted {
            Ok(Accepted::Tcp(stream, peer)) => {
                trace!("Accepted {peer} on {address}");
                connections.spawn(serve_connection(stream, Some(peer), context.clone()));
            }
            Ok(Accepted::Unix(stream)) => {
                trace!("Accepted connection on {address}");
                connections.spawn(serve_connection(stream, None, context.clone()));
            }
            Err(e) => {
                warn!("Accept failed on {address}: {e}");
                TokioSleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }

        while connections.try_join_next().is_some() {}
    }

    drop(acceptor);
    debug!(
        "Accept loop for {address} stopped with {} connection(s) open",
        connections.len()
    );

    while connections.join_next().await.is_some() {}
}

/// Serve HTTP/1.1 on one connection.
///
/// Once the quota is reached the connection is shut down gracefully: a
/// response in progress completes, then the connection closes instead of
/// reading another request. A connection that has not dispatched a request
/// yet is served its first one before closing; the header read timeout
/// bounds how long it can stay silent.
async fn serve_connection<S>(stream: S, remote: Option<SocketAddr>, context: ConnectionContext)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = RequestCounter::new(
        ApplicationService::new(context.application, context.access_log, remote),
        Arc::clone(&context.gate),
        context.trigger,
    );
    let activity = service.activity().clone();

    let mut connection = pin!(
        http1::Builder::new()
            .timer(TokioTimer::new())
            .serve_connection(TokioIo::new(stream), service)
    );

    let result = tokio::select! {
        result = connection.as_mut() => result,
        () = context.gate.quota_exceeded() => {
            tokio::select! {
                result = connection.as_mut() => result,
                () = activity.dispatched() => {
                    connection.as_mut().graceful_shutdown();
                    connection.await
                }
            }
        }
    };

    if let Err(e) = result {
        debug!("Connection closed with error: {e}");
    }
}
