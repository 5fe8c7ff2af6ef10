// Request gate accounting and the counting service decorator

use crate::gate::{GatePhase, HandoffTrigger, RequestCounter, RequestGate, RequestStart};

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::{Service, service_fn};
use hyper::{Request, Response};
use tokio::time::timeout as TokioTimeout;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct CountingTrigger {
    calls: AtomicUsize,
}

impl HandoffTrigger for CountingTrigger {
    fn begin_handoff(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// **VALUE**: The request that brings the total to the maximum trips the
/// quota, and only that one.
///
/// **BUG THIS CATCHES**: Would catch an off-by-one that serves N+1 requests
/// before the handoff, or reports the quota to more than one request.
#[test]
fn given_maximum_of_three_when_requests_start_then_third_reaches_quota() {
    let gate = RequestGate::new(3);

    let starts: Vec<RequestStart> = (0..5).map(|_| gate.request_started().1).collect();

    assert_eq!(
        starts,
        vec![
            RequestStart::Counted,
            RequestStart::Counted,
            RequestStart::QuotaReached,
            RequestStart::Counted,
            RequestStart::Counted,
        ]
    );
    assert_eq!(gate.state().served, 5);
}

#[test]
fn given_maximum_of_one_when_first_request_starts_then_quota_reached() {
    let gate = RequestGate::new(1);

    let (_guard, start) = gate.request_started();

    assert_eq!(start, RequestStart::QuotaReached);
    assert_eq!(gate.state().phase, GatePhase::Draining);
}

/// **VALUE**: Draining waits for every in-flight request, whatever order
/// they finish in.
#[tokio::test]
async fn given_requests_in_flight_when_quota_reached_then_drained_after_last_finishes() {
    // GIVEN: Three requests in flight, the third tripping the quota
    let gate = RequestGate::new(3);
    let (first, _) = gate.request_started();
    let (second, _) = gate.request_started();
    let (third, start) = gate.request_started();
    assert_eq!(start, RequestStart::QuotaReached);

    // WHEN: Finishing out of order
    drop(third);
    drop(first);

    // THEN: Still draining with one request left
    let state = gate.state();
    assert_eq!(state.phase, GatePhase::Draining);
    assert_eq!(state.in_flight, 1);

    // WHEN: The last one finishes
    drop(second);

    // THEN: Drained
    TokioTimeout(WAIT, gate.drained()).await.unwrap();
    assert_eq!(gate.state().in_flight, 0);
}

#[test]
fn given_requests_finish_before_quota_when_counted_then_gate_keeps_accepting() {
    let gate = RequestGate::new(3);

    drop(gate.request_started());
    drop(gate.request_started());

    let state = gate.state();
    assert_eq!(state.phase, GatePhase::Accepting);
    assert_eq!(state.in_flight, 0);
    assert_eq!(state.served, 2);
}

/// **WHY THIS MATTERS**: The handoff task may subscribe after the last
/// request already finished; it must not wait for a notification that was
/// already sent.
#[tokio::test]
async fn given_gate_already_drained_when_waiting_then_resolves_immediately() {
    let gate = RequestGate::new(1);
    drop(gate.request_started());
    assert_eq!(gate.state().phase, GatePhase::Drained);

    TokioTimeout(WAIT, gate.drained()).await.unwrap();
    TokioTimeout(WAIT, gate.quota_exceeded()).await.unwrap();
}

#[test]
fn given_idle_gate_when_shutdown_triggered_twice_then_only_first_transitions() {
    let gate = RequestGate::new(10);

    assert!(gate.trigger_shutdown());
    assert!(!gate.trigger_shutdown());
    assert_eq!(gate.state().phase, GatePhase::Drained);
}

#[test]
fn given_request_in_flight_when_shutdown_triggered_then_draining() {
    let gate = RequestGate::new(10);
    let (guard, _) = gate.request_started();

    assert!(gate.trigger_shutdown());
    assert_eq!(gate.state().phase, GatePhase::Draining);

    drop(guard);
    assert_eq!(gate.state().phase, GatePhase::Drained);
}

fn empty_request() -> Request<Full<Bytes>> {
    Request::new(Full::default())
}

fn ok_service() -> impl Service<
    Request<Full<Bytes>>,
    Response = Response<Full<Bytes>>,
    Error = Infallible,
    Future = impl Future<Output = Result<Response<Full<Bytes>>, Infallible>> + Send + 'static,
> {
    service_fn(|_request: Request<Full<Bytes>>| async {
        Ok::<_, Infallible>(Response::new(Full::new(Bytes::from_static(b"ok"))))
    })
}

/// **VALUE**: A request stays in flight until its response body is
/// released, not merely until the handler returns.
#[tokio::test]
async fn given_counted_response_when_body_dropped_then_request_finishes() {
    // GIVEN: A counter in front of a trivial service
    let gate = RequestGate::new(10);
    let trigger = Arc::new(CountingTrigger::default());
    let counter = RequestCounter::new(ok_service(), Arc::clone(&gate), trigger.clone());

    // WHEN: The handler has answered but the body is still held
    let response = counter.call(empty_request()).await.unwrap();

    // THEN: The request is still in flight
    assert_eq!(gate.state().in_flight, 1);

    // WHEN: The body is consumed and dropped
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, Bytes::from_static(b"ok"));

    // THEN: Nothing is in flight
    assert_eq!(gate.state().in_flight, 0);
    assert_eq!(trigger.calls.load(Ordering::SeqCst), 0);
}

/// **BUG THIS CATCHES**: Would catch the handoff being started twice, or by
/// a request other than the one that reached the quota.
#[tokio::test]
async fn given_quota_of_two_when_three_requests_then_handoff_triggered_once() {
    let gate = RequestGate::new(2);
    let trigger = Arc::new(CountingTrigger::default());
    let counter = RequestCounter::new(ok_service(), Arc::clone(&gate), trigger.clone());

    drop(counter.call(empty_request()).await.unwrap());
    assert_eq!(trigger.calls.load(Ordering::SeqCst), 0);

    drop(counter.call(empty_request()).await.unwrap());
    assert_eq!(trigger.calls.load(Ordering::SeqCst), 1);

    drop(counter.call(empty_request()).await.unwrap());
    assert_eq!(trigger.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn given_request_future_dropped_when_client_disconnects_then_request_finishes() {
    let gate = RequestGate::new(10);
    let counter = RequestCounter::new(
        ok_service(),
        Arc::clone(&gate),
        Arc::new(CountingTrigger::default()),
    );

    let pending = counter.call(empty_request());
    assert_eq!(gate.state().in_flight, 1);

    drop(pending);
    assert_eq!(gate.state().in_flight, 0);
}

/// **VALUE**: The connection learns when it has dispatched its first request,
/// so a connection accepted just before the quota is not closed unanswered.
#[tokio::test]
async fn given_fresh_connection_when_first_request_dispatched_then_activity_resolves() {
    // GIVEN: A counter that has not dispatched anything
    let gate = RequestGate::new(10);
    let counter = RequestCounter::new(
        ok_service(),
        Arc::clone(&gate),
        Arc::new(CountingTrigger::default()),
    );
    let activity = counter.activity().clone();
    assert!(!activity.is_dispatched());

    // WHEN: A request is dispatched
    drop(counter.call(empty_request()).await.unwrap());

    // THEN: The marker is set and its waiter resolves immediately
    assert!(activity.is_dispatched());
    TokioTimeout(WAIT, activity.dispatched()).await.unwrap();
}
