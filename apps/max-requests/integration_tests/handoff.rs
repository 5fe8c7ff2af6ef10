use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tempfile::tempdir;

// ============================================================================
// End-to-end: the real binary hands its listeners to a fresh copy of itself.
// ============================================================================

const BINARY: &str = env!("CARGO_BIN_EXE_max-requests");
const HANDOFF_ENV_VAR: &str = "MAX_REQUESTS_LISTENERS";
const WAIT: Duration = Duration::from_secs(15);

fn free_loopback_port() -> SocketAddr {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
}

fn start(args: &[String]) -> Child {
    Command::new(BINARY)
        .args(args)
        .env_remove(HANDOFF_ENV_VAR)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap()
}

fn wait_until_listening(addr: SocketAddr) {
    let deadline = Instant::now() + WAIT;
    while TcpStream::connect(addr).is_err() {
        assert!(Instant::now() < deadline, "Server never listened on {addr}");
        sleep(Duration::from_millis(50));
    }
}

fn wait_for_exit(child: &mut Child) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait().unwrap() {
            return status.success();
        }
        sleep(Duration::from_millis(50));
    }
    false
}

fn terminate(pid: u32) {
    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
}

async fn get_pid(client: &reqwest::Client, addr: SocketAddr) -> u32 {
    client
        .get(format!("http://{addr}/"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap()
        .trim()
        .parse()
        .unwrap()
}

fn get_pid_over_unix(path: &Path) -> u32 {
    let mut stream = UnixStream::connect(path).unwrap();
    stream.set_read_timeout(Some(WAIT)).unwrap();
    stream
        .write_all(b"GET / HTTP/1.0\r\nHost: localhost\r\n\r\n")
        .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    let (_head, body) = response.split_once("\r\n\r\n").unwrap();
    body.trim().parse().unwrap()
}

/// **VALUE**: The core promise: after N requests a new process serves the
/// same port, and no request is refused across the switch.
///
/// **BUG THIS CATCHES**: Would catch descriptors being closed on exec, the
/// handoff variable not reaching the successor, or the successor re-binding
/// instead of adopting.
#[tokio::test]
async fn given_quota_of_two_when_third_request_arrives_then_successor_serves_it() {
    // GIVEN: A server that hands off after two requests
    let addr = free_loopback_port();
    let mut original = start(&[
        "--listen".to_string(),
        format!("tcp:{addr}"),
        "--max-requests".to_string(),
        "2".to_string(),
        "pid".to_string(),
    ]);
    wait_until_listening(addr);
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap();

    // WHEN: Three requests on fresh connections
    let first = get_pid(&client, addr).await;
    let second = get_pid(&client, addr).await;
    let third = get_pid(&client, addr).await;
    terminate(third);

    // THEN: The first two came from the original process
    assert_eq!(first, original.id());
    assert_eq!(second, original.id());

    // AND: The third from a different process
    assert_ne!(third, original.id());

    // AND: The original process exited cleanly
    assert!(wait_for_exit(&mut original), "Original process did not exit cleanly");
}

/// **VALUE**: Every listener is handed over, not just the first one.
#[tokio::test]
async fn given_tcp_and_unix_listeners_when_handed_off_then_successor_serves_both() {
    // GIVEN: A server on a TCP port and a Unix socket, quota of one
    let dir = tempdir().unwrap();
    let socket = dir.path().join("server.sock");
    let addr = free_loopback_port();
    let mut original = start(&[
        "--listen".to_string(),
        format!("tcp:{addr}"),
        "--listen".to_string(),
        format!("unix:{}", socket.display()),
        "--max-requests".to_string(),
        "1".to_string(),
        "pid".to_string(),
    ]);
    wait_until_listening(addr);
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap();

    // WHEN: One request uses up the quota
    let served_by_original = get_pid(&client, addr).await;
    assert_eq!(served_by_original, original.id());
    assert!(wait_for_exit(&mut original), "Original process did not exit cleanly");

    // THEN: The successor answers on both listeners
    let over_tcp = get_pid(&client, addr).await;
    let over_unix = get_pid_over_unix(&socket);
    terminate(over_tcp);

    assert_ne!(over_tcp, served_by_original);
    assert_eq!(over_tcp, over_unix);
}

#[test]
fn given_malformed_handoff_variable_when_started_then_exits_with_failure() {
    let status = Command::new(BINARY)
        .args(["--listen", "tcp:127.0.0.1:0", "hello"])
        .env(HANDOFF_ENV_VAR, "not-a-record")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .unwrap();

    assert!(!status.success());
}

#[test]
fn given_unknown_application_when_started_then_exits_with_failure() {
    let status = Command::new(BINARY)
        .args(["--listen", "tcp:127.0.0.1:0", "no-such-app"])
        .env_remove(HANDOFF_ENV_VAR)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .unwrap();

    assert!(!status.success());
}
