use server_core::application::ApplicationRegistry;
use server_core::listener::{ActiveListeners, FreshListenerSet, ListenerAddress, ListenerSource};
use server_core::server::{Server, ServerOptions};
use server_core::succession::SuccessorCommand;

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep as TokioSleep, timeout as TokioTimeout};

// ============================================================================
// A whole server run in-process: serve, hand off, finish.
// The successor is a shell that records its handoff variable, so these tests
// cover everything up to the exec boundary.
// ============================================================================

const WAIT: Duration = Duration::from_secs(10);

fn loopback() -> (ActiveListeners, SocketAddr) {
    let address: ListenerAddress = "tcp:127.0.0.1:0".parse().unwrap();
    let listeners = FreshListenerSet::new(vec![address], 16).open().unwrap();
    let bound = match listeners.iter().next().unwrap().address() {
        ListenerAddress::Tcp(addr) => SocketAddr::V4(*addr),
        other => panic!("Unexpected address {other}"),
    };
    (listeners, bound)
}

fn recording_successor(out: &Path) -> SuccessorCommand {
    SuccessorCommand::new(
        "/bin/sh",
        [
            "-c".to_string(),
            "printf '%s' \"$MAX_REQUESTS_LISTENERS\" > \"$0\"".to_string(),
            out.display().to_string(),
        ],
    )
}

fn options(max_requests: u64, application: &str, successor: SuccessorCommand) -> ServerOptions {
    ServerOptions {
        max_requests,
        drain_timeout: None,
        application: ApplicationRegistry::default().resolve(application).unwrap(),
        access_log: None,
        successor,
    }
}

fn fresh_connection_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}

async fn read_when_written(path: &Path) -> String {
    loop {
        if let Ok(contents) = std::fs::read_to_string(path) {
            if !contents.is_empty() {
                return contents;
            }
        }
        TokioSleep(Duration::from_millis(20)).await;
    }
}

/// **VALUE**: The full life of one generation: N requests served, then the
/// listeners are handed to a successor and `run` returns.
///
/// **BUG THIS CATCHES**: Would catch the server hanging after the quota
/// (acceptors never released, gate never drained) or launching the
/// successor without the listener variable.
#[tokio::test]
async fn given_quota_of_two_when_two_requests_served_then_listeners_handed_off() {
    // GIVEN: A server limited to two requests
    let dir = tempdir().unwrap();
    let out = dir.path().join("handoff.txt");
    let (listeners, addr) = loopback();
    let server = Server::new(listeners, options(2, "pid", recording_successor(&out)));
    let running = tokio::spawn(server.run());

    // WHEN: Two requests are served
    let client = fresh_connection_client();
    for _ in 0..2 {
        let body = client
            .get(format!("http://{addr}/"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, format!("{}\n", std::process::id()));
    }

    // THEN: The run ends with a launched successor
    let successor = TokioTimeout(WAIT, running).await.unwrap().unwrap().unwrap();
    assert!(successor.pid > 0);

    // AND: The successor saw this listener's record
    let handed_off = TokioTimeout(WAIT, read_when_written(&out)).await.unwrap();
    assert!(
        handed_off.starts_with(&format!("tcp:{addr}\u{1f}")),
        "Unexpected handoff value {handed_off:?}"
    );
}

/// **WHY THIS MATTERS**: An idle keep-alive connection must not keep the old
/// process alive after the handoff.
#[tokio::test]
async fn given_keep_alive_client_when_quota_reached_then_run_still_completes() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("handoff.txt");
    let (listeners, addr) = loopback();
    let server = Server::new(listeners, options(1, "hello", recording_successor(&out)));
    let running = tokio::spawn(server.run());

    // Pooled client: the connection stays open after the response
    let client = reqwest::Client::new();
    let body = client
        .get(format!("http://{addr}/"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "Hello, world!\n");

    assert!(TokioTimeout(WAIT, running).await.unwrap().unwrap().is_ok());
}

/// **VALUE**: A connection accepted before the quota was reached is still
/// answered, even when its request arrives after the quota.
///
/// **BUG THIS CATCHES**: Would catch the graceful shutdown at the quota
/// closing connections that are open but have not sent a request yet.
#[tokio::test]
async fn given_accepted_idle_connection_when_quota_reached_then_first_request_still_served() {
    // GIVEN: A server limited to one request and a connection it has accepted
    let dir = tempdir().unwrap();
    let out = dir.path().join("handoff.txt");
    let (listeners, addr) = loopback();
    let server = Server::new(listeners, options(1, "hello", recording_successor(&out)));
    let running = tokio::spawn(server.run());

    let mut waiting = TcpStream::connect(addr).await.unwrap();
    TokioSleep(Duration::from_millis(200)).await;

    // WHEN: Another client uses up the quota
    let response = fresh_connection_client()
        .get(format!("http://{addr}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // AND: The waiting connection sends its request afterwards
    waiting
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let mut raw = String::new();
    TokioTimeout(WAIT, waiting.read_to_string(&mut raw))
        .await
        .unwrap()
        .unwrap();

    // THEN: It gets a full response before the connection closes
    assert!(raw.starts_with("HTTP/1.1 200"), "Unexpected response {raw:?}");
    assert!(raw.ends_with("Hello, world!\n"), "Unexpected response {raw:?}");

    // AND: The run still completes
    assert!(TokioTimeout(WAIT, running).await.unwrap().unwrap().is_ok());
}

#[tokio::test]
async fn given_echo_application_when_posting_then_body_is_echoed_before_handoff() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("handoff.txt");
    let (listeners, addr) = loopback();
    let server = Server::new(listeners, options(1, "echo", recording_successor(&out)));
    let running = tokio::spawn(server.run());

    let response = fresh_connection_client()
        .post(format!("http://{addr}/submit?x=1"))
        .body("hello")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "POST /submit?x=1\nhello");

    assert!(TokioTimeout(WAIT, running).await.unwrap().unwrap().is_ok());
}

#[tokio::test]
async fn given_missing_successor_program_when_quota_reached_then_run_fails() {
    let (listeners, addr) = loopback();
    let server = Server::new(
        listeners,
        options(
            1,
            "hello",
            SuccessorCommand::new("/nonexistent/max-requests", Vec::<String>::new()),
        ),
    );
    let running = tokio::spawn(server.run());

    let response = fresh_connection_client()
        .get(format!("http://{addr}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let result = TokioTimeout(WAIT, running).await.unwrap().unwrap();
    assert!(result.is_err());
}
