//! State shared by every connection thread.

use seeme_core::{Coordinator, ServerSection};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

pub struct SharedState {
    coordinator: Coordinator,
    server: ServerSection,
    active_connections: AtomicUsize,
    rejected_connections: AtomicU64,
}

/// Held for the lifetime of one accepted connection.
pub struct ConnectionPermit {
    state: Arc<SharedState>,
}

impl ConnectionPermit {
    pub fn state(&self) -> &SharedState {
        &self.state
    }
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        self.state.active_connections.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SecuritySnapshot {
    pub active_connections: usize,
    pub max_connections: usize,
    pub rejected_connections: u64,
    pub admin_loopback_only: bool,
}

impl SharedState {
    pub fn new(coordinator: Coordinator, server: ServerSection) -> Self {
        Self {
            coordinator,
            server,
            active_connections: AtomicUsize::new(0),
            rejected_connections: AtomicU64::new(0),
        }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn server(&self) -> &ServerSection {
        &self.server
    }

    /// Claims a connection slot, or counts a rejection once `max_connections`
    /// are already open.
    pub fn try_acquire_connection(self: &Arc<Self>) -> Option<ConnectionPermit> {
        let previous = self.active_connections.fetch_add(1, Ordering::SeqCst);
        if previous >= self.server.max_connections {
            self.active_connections.fetch_sub(1, Ordering::SeqCst);
            self.rejected_connections.fetch_add(1, Ordering::SeqCst);
            return None;
        }
        Some(ConnectionPermit {
            state: Arc::clone(self),
        })
    }

    pub fn security_snapshot(&self) -> SecuritySnapshot {
        SecuritySnapshot {
            active_connections: self.active_connections.load(Ordering::SeqCst),
            max_connections: self.server.max_connections,
            rejected_connections: self.rejected_connections.load(Ordering::SeqCst),
            admin_loopback_only: self.server.admin_loopback_only,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seeme_core::{SeemeConfig, StorageConfig};
    use tempfile::TempDir;

    fn state(max_connections: usize) -> (TempDir, Arc<SharedState>) {
        let temp = TempDir::new().unwrap();
        let mut config = SeemeConfig::default();
        config.security.hash_iterations = 500;
        config.server.max_connections = max_connections;
        let coordinator =
            Coordinator::open(&StorageConfig::with_root(temp.path().to_path_buf()), &config)
                .unwrap();
        (temp, Arc::new(SharedState::new(coordinator, config.server)))
    }

    #[test]
    fn connection_slots_are_capped_and_released() {
        let (_temp, state) = state(2);

        let first = state.try_acquire_connection();
        let second = state.try_acquire_connection();
        assert!(first.is_some() && second.is_some());
        assert!(state.try_acquire_connection().is_none());
        assert_eq!(state.security_snapshot().rejected_connections, 1);

        drop(first);
        assert!(state.try_acquire_connection().is_some());
        assert_eq!(state.security_snapshot().active_connections, 1);
    }
}
