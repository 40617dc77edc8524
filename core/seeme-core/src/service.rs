//! Coordination façade over the account store, login registry and activity cache.
//!
//! Each component owns its own lock and none is held while another is taken,
//! so there is no lock ordering to get wrong. Cross-component sequences such
//! as delete → revoke → remove are not one transaction; `report_activity`
//! re-checks its session after writing so a concurrent delete cannot leave a
//! record behind.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::accounts::{AccountStore, AccountSummary};
use crate::activity::ActivityCache;
use crate::config::SeemeConfig;
use crate::error::Result;
use crate::password::CredentialHasher;
use crate::sessions::{LoginOutcome, SessionRegistry};
use crate::storage::StorageConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Accepted,
    Unauthenticated,
}

/// What `query_activity` hands back to readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivitySnapshot {
    pub label: String,
    pub updated_at: DateTime<Utc>,
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceHealth {
    pub accounts: usize,
    pub sessions: usize,
}

pub struct Coordinator {
    accounts: AccountStore,
    sessions: SessionRegistry,
    activity: ActivityCache,
}

impl Coordinator {
    /// Opens the account store named by `config` and seeds an activity record
    /// for every stored account.
    pub fn open(storage: &StorageConfig, config: &SeemeConfig) -> Result<Self> {
        let accounts = AccountStore::new(
            config.accounts_file(storage),
            CredentialHasher::new(config.security.hash_iterations),
        );
        let activity = ActivityCache::new(Duration::seconds(config.activity.online_window_secs));
        Self::from_parts(accounts, activity)
    }

    pub fn from_parts(accounts: AccountStore, activity: ActivityCache) -> Result<Self> {
        let existing = accounts.list()?;
        for account in &existing {
            activity.seed(&account.identity);
        }
        info!(
            accounts = existing.len(),
            path = %accounts.path().display(),
            "Loaded accounts"
        );

        Ok(Self {
            accounts,
            sessions: SessionRegistry::new(),
            activity,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Administration
    // ─────────────────────────────────────────────────────────────────────

    pub fn add_account(&self, display_name: &str, password: &str) -> Result<String> {
        let identity = self.accounts.create(display_name, password)?;
        self.activity.seed(&identity);
        Ok(identity)
    }

    pub fn delete_account(&self, identity: &str) -> Result<bool> {
        if !self.accounts.delete(identity)? {
            return Ok(false);
        }
        self.sessions.revoke(identity);
        self.activity.remove(identity);
        Ok(true)
    }

    /// Renames and re-passwords. Existing sessions are revoked; the last
    /// reported activity is kept.
    pub fn update_account(
        &self,
        identity: &str,
        new_display_name: &str,
        new_password: &str,
    ) -> Result<bool> {
        if !self
            .accounts
            .rename_and_repassword(identity, new_display_name, new_password)?
        {
            return Ok(false);
        }
        self.sessions.revoke(identity);
        self.activity.seed(identity);
        Ok(true)
    }

    pub fn list_accounts(&self) -> Result<Vec<AccountSummary>> {
        self.accounts.list()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Clients
    // ─────────────────────────────────────────────────────────────────────

    pub fn authenticate(
        &self,
        identity: &str,
        display_name: &str,
        password: &str,
    ) -> Result<LoginOutcome> {
        self.sessions
            .login(&self.accounts, identity, display_name, password)
    }

    pub fn report_activity(
        &self,
        identity: &str,
        display_name: &str,
        password: &str,
        label: &str,
    ) -> Result<ReportOutcome> {
        if !self.sessions.is_logged_in(identity, display_name, password) {
            debug!(identity = %identity, "Activity rejected; not logged in");
            return Ok(ReportOutcome::Unauthenticated);
        }
        self.activity.update(identity, label, Utc::now());

        // A delete that revoked us mid-push may already have cleared the record.
        if !self.sessions.is_logged_in(identity, display_name, password)
            && !self.accounts.contains(identity)?
        {
            self.activity.remove(identity);
            debug!(identity = %identity, "Activity dropped; account deleted during push");
            return Ok(ReportOutcome::Unauthenticated);
        }
        debug!(identity = %identity, "Activity recorded");
        Ok(ReportOutcome::Accepted)
    }

    /// Public read; no credentials required.
    pub fn query_activity(&self, identity: &str) -> Option<ActivitySnapshot> {
        let record = self.activity.get(identity)?;
        let online = record.is_online(Utc::now(), self.activity.online_window());
        Some(ActivitySnapshot {
            label: record.label,
            updated_at: record.updated_at,
            online,
        })
    }

    pub fn health(&self) -> Result<ServiceHealth> {
        Ok(ServiceHealth {
            accounts: self.accounts.list()?.len(),
            sessions: self.sessions.len(),
        })
    }
}
