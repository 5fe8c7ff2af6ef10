use crate::gate::{HandoffTrigger, InFlightGuard, RequestGate, RequestStart};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::{Body, Frame, SizeHint};
use hyper::service::Service;
use hyper::{Request, Response};
use tokio::sync::watch;

/// Dispatch decorator that counts every request on the [`RequestGate`].
///
/// Calls are forwarded untouched to the inner service. The in-flight unit is
/// carried by the response body, so a request only counts as finished once
/// the connection has released its body, or the request future was dropped.
#[derive(Clone)]
pub struct RequestCounter<S> {
    inner: S,
    gate: Arc<RequestGate>,
    trigger: Arc<dyn HandoffTrigger>,
    activity: ConnectionActivity,
}

impl<S> RequestCounter<S> {
    pub fn new(inner: S, gate: Arc<RequestGate>, trigger: Arc<dyn HandoffTrigger>) -> Self {
        Self {
            inner,
            gate,
            trigger,
            activity: ConnectionActivity::default(),
        }
    }

    /// Marker for the connection this counter dispatches for.
    pub fn activity(&self) -> &ConnectionActivity {
        &self.activity
    }
}

/// Set once a connection has dispatched its first request.
#[derive(Clone)]
pub struct ConnectionActivity {
    dispatched: Arc<watch::Sender<bool>>,
}

impl Default for ConnectionActivity {
    fn default() -> Self {
        Self {
            dispatched: Arc::new(watch::Sender::new(false)),
        }
    }
}

impl ConnectionActivity {
    pub fn mark_dispatched(&self) {
        self.dispatched.send_if_modified(|dispatched| !std::mem::replace(dispatched, true));
    }

    pub fn is_dispatched(&self) -> bool {
        *self.dispatched.borrow()
    }

    /// Resolves once a request has been dispatched; immediately if one was.
    pub async fn dispatched(&self) {
        let mut receiver = self.dispatched.subscribe();
        let _ = receiver.wait_for(|dispatched| *dispatched).await;
    }
}

impl<S, ReqBody> Service<Request<ReqBody>> for RequestCounter<S>
where
    S: Service<Request<ReqBody>, Response = Response<Full<Bytes>>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response<CountedBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, request: Request<ReqBody>) -> Self::Future {
        self.activity.mark_dispatched();
        let (guard, start) = self.gate.request_started();
        if start == RequestStart::QuotaReached {
            self.trigger.begin_handoff();
        }

        let response = self.inner.call(request);
        Box::pin(async move {
            let response = response.await?;
            Ok(response.map(|body| CountedBody::new(body, guard)))
        })
    }
}

/// Response body that releases its request's in-flight unit when dropped.
pub struct CountedBody {
    inner: Full<Bytes>,
    _in_flight: InFlightGuard,
}

impl CountedBody {
    pub fn new(inner: Full<Bytes>, in_flight: InFlightGuard) -> Self {
        Self {
            inner,
            _in_flight: in_flight,
        }
    }
}

impl Body for CountedBody {
    type Data = Bytes;
    type Error = std::convert::Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.get_mut().inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
