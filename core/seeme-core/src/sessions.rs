//! In-memory login registry.
//!
//! A session is the exact (identity, display name, password) triple a client
//! presented at a successful login. Clients re-send the triple with every
//! activity push and it must match exactly; there is no token and no expiry.
//! The password itself is not retained, only a SHA-256 fingerprint of it.
//!
//! Logins verify without the registry lock held. While a login for an
//! identity is in flight the identity carries a revocation epoch; a revoke
//! bumps it, and a login whose epoch moved re-reads the store instead of
//! recording a stale session. The epoch is dropped when the last in-flight
//! login for the identity finishes, so idle identities cost nothing.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::accounts::AccountStore;
use crate::error::Result;

/// Verification passes a login makes before giving up on a churning account.
const LOGIN_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Accepted,
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No account has this identity with this display name.
    UserNotFound,
    /// The password did not verify, or the account kept changing mid-login.
    BadCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    display_name: String,
    password_digest: [u8; 32],
}

impl SessionKey {
    fn new(display_name: &str, password: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        Self {
            display_name: display_name.to_string(),
            password_digest: hasher.finalize().into(),
        }
    }
}

#[derive(Debug, Default)]
struct InFlight {
    logins: usize,
    epoch: u64,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<String, HashSet<SessionKey>>,
    in_flight: HashMap<String, InFlight>,
}

/// One verification pass. Dropping it releases the identity's epoch once no
/// other pass is running.
struct PendingLogin<'a> {
    owner: &'a SessionRegistry,
    identity: String,
    epoch: u64,
}

impl Drop for PendingLogin<'_> {
    fn drop(&mut self) {
        let mut registry = self.owner.registry();
        let finished = match registry.in_flight.get_mut(&self.identity) {
            Some(entry) => {
                entry.logins = entry.logins.saturating_sub(1);
                entry.logins == 0
            }
            None => false,
        };
        if finished {
            registry.in_flight.remove(&self.identity);
        }
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<Registry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Verifies the presented credentials and records a session on success.
    ///
    /// Logging in twice with the same credentials leaves one session. If the
    /// account is updated or deleted mid-verification the login starts over
    /// against the store's current contents.
    pub fn login(
        &self,
        store: &AccountStore,
        identity: &str,
        display_name: &str,
        password: &str,
    ) -> Result<LoginOutcome> {
        for attempt in 1..=LOGIN_ATTEMPTS {
            let pending = self.begin_login(identity);

            let Some(stored_hash) = store.find_credential_hash(identity, display_name)? else {
                debug!(identity = %identity, "Login rejected; account not found");
                return Ok(LoginOutcome::Rejected(RejectReason::UserNotFound));
            };

            if !store
                .hasher()
                .verify(password, display_name, identity, &stored_hash)
            {
                debug!(identity = %identity, "Login rejected; bad credentials");
                return Ok(LoginOutcome::Rejected(RejectReason::BadCredentials));
            }

            if self.record_session(&pending, display_name, password) {
                return Ok(LoginOutcome::Accepted);
            }
            debug!(identity = %identity, attempt, "Account changed during verification");
        }

        debug!(identity = %identity, "Login rejected; account kept changing");
        Ok(LoginOutcome::Rejected(RejectReason::BadCredentials))
    }

    fn begin_login(&self, identity: &str) -> PendingLogin<'_> {
        let mut registry = self.registry();
        let entry = registry.in_flight.entry(identity.to_string()).or_default();
        entry.logins += 1;
        let epoch = entry.epoch;
        drop(registry);

        PendingLogin {
            owner: self,
            identity: identity.to_string(),
            epoch,
        }
    }

    /// Inserts the session unless the identity was revoked after `pending` began.
    fn record_session(
        &self,
        pending: &PendingLogin<'_>,
        display_name: &str,
        password: &str,
    ) -> bool {
        let mut registry = self.registry();
        let current = registry
            .in_flight
            .get(&pending.identity)
            .map(|entry| entry.epoch);
        if current != Some(pending.epoch) {
            return false;
        }
        let inserted = registry
            .sessions
            .entry(pending.identity.clone())
            .or_default()
            .insert(SessionKey::new(display_name, password));
        if inserted {
            info!(identity = %pending.identity, "Session opened");
        }
        true
    }

    /// Exact match against a previously accepted triple.
    pub fn is_logged_in(&self, identity: &str, display_name: &str, password: &str) -> bool {
        self.registry()
            .sessions
            .get(identity)
            .map(|keys| keys.contains(&SessionKey::new(display_name, password)))
            .unwrap_or(false)
    }

    /// Drops every session of `identity` and invalidates in-flight logins.
    /// Returns how many sessions were removed.
    pub fn revoke(&self, identity: &str) -> usize {
        let mut registry = self.registry();
        if let Some(entry) = registry.in_flight.get_mut(identity) {
            entry.epoch += 1;
        }
        let removed = registry
            .sessions
            .remove(identity)
            .map(|keys| keys.len())
            .unwrap_or(0);
        if removed > 0 {
            info!(identity = %identity, removed, "Sessions revoked");
        }
        removed
    }

    /// Number of distinct sessions across all identities.
    pub fn len(&self) -> usize {
        self.registry().sessions.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn tracked_epochs(&self) -> usize {
        self.registry().in_flight.len()
    }
}
