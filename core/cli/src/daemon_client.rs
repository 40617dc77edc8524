//! Client helper for talking to the SeeMe daemon.
//!
//! One request per connection. Only connection failures are retried: once a
//! request has been written, a second attempt could repeat a non-idempotent
//! admin call.

use seeme_core::{SeemeConfig, StorageConfig};
use seeme_protocol::{Method, Request, Response, MAX_REQUEST_BYTES};
use serde_json::Value;
use std::env;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

pub const ADDR_ENV: &str = "SEEME_ADDR";
const CONNECT_TIMEOUT_MS: u64 = 1_000;
const READ_TIMEOUT_MS: u64 = 10_000;
const WRITE_TIMEOUT_MS: u64 = 2_000;
const RETRY_DELAY_MS: u64 = 50;

#[derive(Debug, Clone)]
pub struct DaemonClient {
    addr: SocketAddr,
}

impl DaemonClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Resolves the daemon address: `explicit`, then `$SEEME_ADDR`, then the
    /// address file the daemon publishes, then the configured listen address.
    pub fn resolve(
        explicit: Option<&str>,
        storage: &StorageConfig,
        config: &SeemeConfig,
    ) -> Result<Self, String> {
        if let Some(addr) = explicit.map(str::trim).filter(|value| !value.is_empty()) {
            return parse_addr(addr).map(Self::new);
        }

        if let Ok(addr) = env::var(ADDR_ENV) {
            if !addr.trim().is_empty() {
                return parse_addr(addr.trim()).map(Self::new);
            }
        }

        let addr_file = storage.daemon_addr_file();
        match fs_err::read_to_string(&addr_file) {
            Ok(contents) if !contents.trim().is_empty() => {
                return parse_addr(contents.trim()).map(Self::new);
            }
            Ok(_) => {
                tracing::warn!(path = %addr_file.display(), "Daemon address file is empty");
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(error = %err, "Failed to read daemon address file");
            }
        }

        parse_addr(&config.server.listen_addr).map(Self::new)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn call(&self, method: Method, params: Option<Value>) -> Result<Response, String> {
        let request = Request::new(method, params);
        let mut stream = match self.connect() {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(error = %err, addr = %self.addr, "Failed to reach daemon; retrying");
                std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
                self.connect().map_err(|retry_err| {
                    tracing::warn!(error = %retry_err, "Retry failed reaching daemon");
                    retry_err
                })?
            }
        };

        serde_json::to_writer(&mut stream, &request)
            .map_err(|err| format!("Failed to write request: {}", err))?;
        stream
            .write_all(b"\n")
            .map_err(|err| format!("Failed to flush request: {}", err))?;
        stream.flush().ok();

        read_response(&mut stream)
    }

    fn connect(&self) -> Result<TcpStream, String> {
        let stream =
            TcpStream::connect_timeout(&self.addr, Duration::from_millis(CONNECT_TIMEOUT_MS))
                .map_err(|err| format!("Failed to connect to daemon at {}: {}", self.addr, err))?;
        let _ = stream.set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)));
        let _ = stream.set_write_timeout(Some(Duration::from_millis(WRITE_TIMEOUT_MS)));
        Ok(stream)
    }
}

fn parse_addr(value: &str) -> Result<SocketAddr, String> {
    value
        .to_socket_addrs()
        .map_err(|err| format!("Invalid daemon address '{}': {}", value, err))?
        .next()
        .ok_or_else(|| format!("Daemon address '{}' did not resolve", value))
}

fn read_response(stream: &mut TcpStream) -> Result<Response, String> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err("Response exceeded maximum size".to_string());
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return Err("Timed out waiting for daemon response".to_string());
            }
            Err(err) => return Err(format!("Failed to read response: {}", err)),
        }
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let response_bytes = match newline_index {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if response_bytes.is_empty() {
        return Err("Daemon response was empty".to_string());
    }

    serde_json::from_slice(response_bytes)
        .map_err(|err| format!("Failed to parse response JSON: {}", err))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::{Mutex, MutexGuard, OnceLock};
    use std::thread::JoinHandle;
    use tempfile::TempDir;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    pub(crate) struct EnvGuard {
        key: &'static str,
        prior: Option<String>,
    }

    impl EnvGuard {
        pub(crate) fn set(key: &'static str, value: &str) -> Self {
            let prior = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self { key, prior }
        }

        pub(crate) fn unset(key: &'static str) -> Self {
            let prior = std::env::var(key).ok();
            std::env::remove_var(key);
            Self { key, prior }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.prior {
                std::env::set_var(self.key, value);
            } else {
                std::env::remove_var(self.key);
            }
        }
    }

    pub(crate) fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_request(stream: &mut TcpStream) -> Option<Request> {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    buffer.extend_from_slice(&chunk[..n]);
                    if buffer.contains(&b'\n') {
                        break;
                    }
                }
                Err(_) => return None,
            }
        }
        let end = buffer
            .iter()
            .position(|b| *b == b'\n')
            .unwrap_or(buffer.len());
        serde_json::from_slice(&buffer[..end]).ok()
    }

    /// Answers each incoming request with the next canned response and hands
    /// back the requests it saw.
    pub(crate) fn fake_daemon(responses: Vec<Response>) -> (SocketAddr, JoinHandle<Vec<Request>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let mut seen = Vec::new();
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                if let Some(request) = read_request(&mut stream) {
                    seen.push(request);
                }
                let mut payload = serde_json::to_vec(&response).unwrap();
                payload.push(b'\n');
                let _ = stream.write_all(&payload);
            }
            seen
        });
        (addr, server)
    }

    #[test]
    fn call_round_trips_one_request() {
        let (addr, server) = fake_daemon(vec![Response::ok(
            None,
            serde_json::json!({ "status": "ok" }),
        )]);

        let response = DaemonClient::new(addr)
            .call(Method::GetHealth, None)
            .expect("call succeeds");
        assert!(response.ok);

        let seen = server.join().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, Method::GetHealth);
    }

    #[test]
    fn daemon_errors_are_returned_not_retried() {
        let (addr, server) = fake_daemon(vec![Response::error(None, "test_error", "simulated")]);

        let response = DaemonClient::new(addr)
            .call(
                Method::AddAccount,
                Some(serde_json::json!({ "display_name": "alice", "password": "pw" })),
            )
            .expect("transport succeeds");
        assert!(!response.ok);
        assert_eq!(server.join().unwrap().len(), 1);
    }

    #[test]
    fn call_reports_unreachable_daemon() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = DaemonClient::new(addr)
            .call(Method::GetHealth, None)
            .unwrap_err();
        assert!(err.contains("Failed to connect"), "unexpected error: {err}");
    }

    #[test]
    fn resolve_prefers_explicit_then_env_then_addr_file() {
        let _guard = env_lock();
        let temp = TempDir::new().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        std::fs::write(storage.daemon_addr_file(), "127.0.0.1:7003").unwrap();
        let config = SeemeConfig::default();

        let _env = EnvGuard::set(ADDR_ENV, "127.0.0.1:7002");
        let client = DaemonClient::resolve(Some("127.0.0.1:7001"), &storage, &config).unwrap();
        assert_eq!(client.addr().port(), 7001);

        let client = DaemonClient::resolve(None, &storage, &config).unwrap();
        assert_eq!(client.addr().port(), 7002);

        let _unset = EnvGuard::unset(ADDR_ENV);
        let client = DaemonClient::resolve(None, &storage, &config).unwrap();
        assert_eq!(client.addr().port(), 7003);
    }

    #[test]
    fn resolve_falls_back_to_configured_listen_addr() {
        let _guard = env_lock();
        let temp = TempDir::new().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        let _addr = EnvGuard::unset(ADDR_ENV);
        let mut config = SeemeConfig::default();

        let client = DaemonClient::resolve(None, &storage, &config).unwrap();
        assert_eq!(client.addr().port(), 5050);

        config.server.listen_addr = "127.0.0.1:6060".to_string();
        let client = DaemonClient::resolve(None, &storage, &config).unwrap();
        assert_eq!(client.addr().port(), 6060);
    }

    #[test]
    fn resolve_rejects_garbage_address() {
        let _guard = env_lock();
        let temp = TempDir::new().unwrap();
        let storage = StorageConfig::with_root(temp.path().to_path_buf());
        let config = SeemeConfig::default();
        assert!(DaemonClient::resolve(Some("not an address"), &storage, &config).is_err());
    }
}
