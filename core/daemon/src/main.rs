//! SeeMe daemon entrypoint.
//!
//! Owns the account store, the login registry and the activity cache, and
//! serves them to clients over line-delimited JSON on a TCP listener.

use fs_err as fs;
use std::env;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use seeme_core::{config_path, load_config, Coordinator, StorageConfig};
use seeme_protocol::{
    ErrorInfo, Request, Response, ERROR_TOO_MANY_CONNECTIONS, MAX_REQUEST_BYTES,
};

mod handlers;
mod state;

use state::SharedState;

const READ_TIMEOUT_SECS: u64 = 2;
const READ_CHUNK_SIZE: usize = 4096;

fn main() {
    init_logging();

    let storage = StorageConfig::default();
    let config_file = config_path(&storage);
    let config = match load_config(&config_file) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, path = %config_file.display(), "Failed to load config");
            std::process::exit(1);
        }
    };

    if let Err(err) = storage.ensure_dirs() {
        error!(error = %err, root = %storage.root().display(), "Failed to prepare data directory");
        std::process::exit(1);
    }

    let addr_file = storage.daemon_addr_file();
    if let Err(err) = remove_stale_addr_file(&addr_file) {
        error!(error = %err, path = %addr_file.display(), "Failed to remove stale address file");
        std::process::exit(1);
    }

    let coordinator = match Coordinator::open(&storage, &config) {
        Ok(coordinator) => coordinator,
        Err(err) => {
            error!(error = %err, "Failed to open account store");
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(&config.server.listen_addr) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, addr = %config.server.listen_addr, "Failed to bind listener");
            std::process::exit(1);
        }
    };

    let local_addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, "Failed to resolve listener address");
            std::process::exit(1);
        }
    };

    if let Err(err) = write_addr_file(&addr_file, local_addr) {
        error!(error = %err, path = %addr_file.display(), "Failed to publish daemon address");
        std::process::exit(1);
    }

    info!(
        addr = %local_addr,
        max_connections = config.server.max_connections,
        admin_loopback_only = config.server.admin_loopback_only,
        "SeeMe daemon started"
    );

    let shared_state = Arc::new(SharedState::new(coordinator, config.server));

    for stream in listener.incoming() {
        match stream {
            Ok(mut stream) => match shared_state.try_acquire_connection() {
                Some(permit) => {
                    thread::spawn(move || handle_connection(stream, permit.state()));
                }
                None => {
                    warn!("Connection limit reached; rejecting client");
                    let response = Response::error(
                        None,
                        ERROR_TOO_MANY_CONNECTIONS,
                        "too many active connections",
                    );
                    let _ = write_response(&mut stream, response);
                }
            },
            Err(err) => {
                warn!(error = %err, "Failed to accept connection");
            }
        }
    }
}

fn init_logging() {
    let debug_enabled = env::var("SEEME_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn remove_stale_addr_file(path: &Path) -> Result<(), String> {
    if path.exists() {
        fs::remove_file(path).map_err(|err| format!("Failed to remove address file: {}", err))?;
    }
    Ok(())
}

fn write_addr_file(path: &Path, addr: SocketAddr) -> Result<(), String> {
    let tmp = path.with_extension("addr.tmp");
    fs::write(&tmp, addr.to_string())
        .map_err(|err| format!("Failed to write address file: {}", err))?;
    fs::rename(&tmp, path).map_err(|err| format!("Failed to publish address file: {}", err))
}

fn handle_connection(mut stream: TcpStream, state: &SharedState) {
    let peer = stream.peer_addr().ok();
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, peer = ?peer, "Failed to read request");
            let response = Response::error_with_info(None, err);
            let _ = write_response(&mut stream, response);
            return;
        }
    };

    tracing::debug!(method = ?request.method, id = ?request.id, "Request received");
    let response = handlers::handle_request(request, peer, state);
    let _ = write_response(&mut stream, response);
}

fn read_request(stream: &mut TcpStream) -> Result<Request, ErrorInfo> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(READ_TIMEOUT_SECS)));

    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ErrorInfo::new(
                        "request_too_large",
                        "request exceeded maximum size",
                    ));
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(ErrorInfo::new("read_timeout", "request timed out"));
            }
            Err(err) => {
                return Err(ErrorInfo::new(
                    "read_error",
                    format!("failed to read request: {}", err),
                ));
            }
        }
    }

    if buffer.is_empty() {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let request_bytes = match newline_index {
        Some(index) => {
            if buffer.len() > index + 1 {
                let trailing = &buffer[index + 1..];
                if trailing.iter().any(|b| !b.is_ascii_whitespace()) {
                    warn!("Extra bytes detected after newline; ignoring trailing data");
                }
            }
            &buffer[..index]
        }
        None => buffer.as_slice(),
    };

    if request_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    serde_json::from_slice(request_bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })
}

fn write_response(stream: &mut TcpStream, response: Response) -> std::io::Result<()> {
    serde_json::to_writer(&mut *stream, &response)?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}
