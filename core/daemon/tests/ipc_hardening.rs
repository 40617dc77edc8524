use seeme_protocol::{Method, Request, Response, ERROR_TOO_MANY_CONNECTIONS, PROTOCOL_VERSION};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

const MAX_ACTIVE_CONNECTIONS: usize = 8;

struct DaemonGuard {
    child: Child,
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn spawn_daemon(home: &Path) -> Child {
    let root = home.join(".seeme");
    std::fs::create_dir_all(&root).expect("failed to create data dir");
    std::fs::write(
        root.join("seeme.toml"),
        format!(
            "[server]\nlisten_addr = \"127.0.0.1:0\"\nmax_connections = {}\n\n[security]\nhash_iterations = 500\n",
            MAX_ACTIVE_CONNECTIONS
        ),
    )
    .expect("failed to write config");

    Command::new(env!("CARGO_BIN_EXE_seeme-daemon"))
        .env("HOME", home)
        .env_remove("SEEME_CONFIG")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn seeme-daemon")
}

fn wait_for_addr(home: &Path, timeout: Duration) -> SocketAddr {
    let path = home.join(".seeme").join("daemon.addr");
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(contents) = std::fs::read_to_string(&path) {
            if let Ok(addr) = contents.trim().parse::<SocketAddr>() {
                return addr;
            }
        }
        sleep(Duration::from_millis(25));
    }
    panic!("timed out waiting for daemon address at {}", path.display());
}

fn health_request() -> Request {
    Request {
        protocol_version: PROTOCOL_VERSION,
        method: Method::GetHealth,
        id: Some("health-retry".to_string()),
        params: None,
    }
}

fn send_raw_request(addr: SocketAddr, payload: &[u8]) -> Response {
    let mut stream = TcpStream::connect(addr).expect("failed to connect to daemon");
    stream
        .write_all(payload)
        .expect("failed to write raw payload");
    stream.flush().expect("failed to flush raw payload");
    read_response(&mut stream)
}

fn read_response(stream: &mut TcpStream) -> Response {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).expect("failed to read response");
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if chunk[..n].contains(&b'\n') {
            break;
        }
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let response_bytes = match newline_index {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    serde_json::from_slice(response_bytes).expect("failed to parse response JSON")
}

fn try_send_request(addr: SocketAddr, request: &Request) -> Option<Response> {
    let mut stream = TcpStream::connect(addr).ok()?;
    serde_json::to_writer(&mut stream, request).ok()?;
    stream.write_all(b"\n").ok()?;
    stream.flush().ok()?;
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if chunk[..n].contains(&b'\n') {
            break;
        }
    }
    let end = buffer
        .iter()
        .position(|b| *b == b'\n')
        .unwrap_or(buffer.len());
    serde_json::from_slice(&buffer[..end]).ok()
}

fn wait_for_health_ok(addr: SocketAddr, timeout: Duration) -> Option<Response> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(response) = try_send_request(addr, &health_request()) {
            if response.ok {
                return Some(response);
            }
        }
        sleep(Duration::from_millis(25));
    }
    None
}

#[test]
fn daemon_connection_limit_rejects_overflow_and_stays_healthy() {
    let home = tempfile::Builder::new()
        .prefix("seeme-daemon-hardening-limit")
        .tempdir()
        .expect("failed to create temp HOME");

    let child = spawn_daemon(home.path());
    let mut guard = Some(DaemonGuard { child });
    let addr = wait_for_addr(home.path(), Duration::from_secs(5));
    wait_for_health_ok(addr, Duration::from_secs(5)).expect("daemon never became healthy");

    let mut saturated_streams = Vec::with_capacity(MAX_ACTIVE_CONNECTIONS);
    for _ in 0..MAX_ACTIVE_CONNECTIONS {
        saturated_streams.push(TcpStream::connect(addr).expect("failed to saturate connection"));
    }
    // Give the accept loop time to hand every idle stream a slot.
    sleep(Duration::from_millis(200));

    let mut overflow = TcpStream::connect(addr).expect("failed to connect overflow stream");
    let overflow_response = read_response(&mut overflow);
    assert!(
        !overflow_response.ok,
        "overflow response should be an error"
    );
    assert_eq!(
        overflow_response
            .error
            .as_ref()
            .map(|err| err.code.as_str()),
        Some(ERROR_TOO_MANY_CONNECTIONS)
    );

    saturated_streams.clear();

    let health = wait_for_health_ok(addr, Duration::from_secs(5))
        .expect("daemon should become healthy after releasing connections");
    let rejected = health
        .data
        .as_ref()
        .and_then(|data| data.get("security"))
        .and_then(|security| security.get("rejected_connections"))
        .and_then(|value| value.as_u64())
        .unwrap_or(0);
    assert!(
        rejected >= 1,
        "expected rejected_connections >= 1, got {rejected}"
    );

    drop(overflow);
    drop(guard.take());
}

#[test]
fn daemon_handles_malformed_payload_flood_without_losing_health() {
    let home = tempfile::Builder::new()
        .prefix("seeme-daemon-hardening-malformed")
        .tempdir()
        .expect("failed to create temp HOME");

    let child = spawn_daemon(home.path());
    let mut guard = Some(DaemonGuard { child });
    let addr = wait_for_addr(home.path(), Duration::from_secs(5));

    for _ in 0..128 {
        let response = send_raw_request(addr, b"{\"bad_json\": true\n");
        assert!(!response.ok, "malformed payload must be rejected");
        assert_eq!(
            response.error.as_ref().map(|err| err.code.as_str()),
            Some("invalid_json")
        );
    }

    let health = wait_for_health_ok(addr, Duration::from_secs(2));
    assert!(
        health.is_some(),
        "daemon should remain healthy after malformed flood"
    );

    drop(guard.take());
}

#[test]
fn daemon_idle_connection_returns_read_timeout_error() {
    let home = tempfile::Builder::new()
        .prefix("seeme-daemon-hardening-timeout")
        .tempdir()
        .expect("failed to create temp HOME");

    let child = spawn_daemon(home.path());
    let mut guard = Some(DaemonGuard { child });
    let addr = wait_for_addr(home.path(), Duration::from_secs(5));

    let mut idle = TcpStream::connect(addr).expect("failed to connect idle stream");
    let response = read_response(&mut idle);
    assert!(!response.ok, "idle request should return an error");
    assert_eq!(
        response.error.as_ref().map(|err| err.code.as_str()),
        Some("read_timeout")
    );

    drop(guard.take());
}
