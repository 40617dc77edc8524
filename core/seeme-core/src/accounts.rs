//! File-backed account store.
//!
//! The account set lives in a single JSON file that is authoritative for
//! identity, display name and credential hash.
//!
//! # File Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "accounts": [
//!     { "identity": "…", "display_name": "alice", "credential_hash": "pbkdf2-sha256$…" }
//!   ]
//! }
//! ```
//!
//! # Locking
//!
//! Every mutation re-reads the file, applies the change and writes the whole
//! set back while holding the exclusive side of one `RwLock`, so concurrent
//! mutations serialize and never lose a write. Lookups hold the shared side.
//!
//! # Atomic Writes
//!
//! Uses temp file + rename in the same directory; a crash mid-write leaves the
//! previous file intact.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, SeemeError};
use crate::password::{CredentialHasher, FIELD_SEPARATOR};

const STORE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub identity: String,
    pub display_name: String,
    pub credential_hash: String,
}

/// Public view of an account; never carries the hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub identity: String,
    pub display_name: String,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            identity: account.identity.clone(),
            display_name: account.display_name.clone(),
        }
    }
}

/// The on-disk JSON structure for the account file.
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    accounts: Vec<Account>,
}

impl Default for StoreFile {
    fn default() -> Self {
        StoreFile {
            version: STORE_VERSION,
            accounts: Vec::new(),
        }
    }
}

pub struct AccountStore {
    path: PathBuf,
    hasher: CredentialHasher,
    lock: RwLock<()>,
}

impl AccountStore {
    pub fn new(path: impl Into<PathBuf>, hasher: CredentialHasher) -> Self {
        AccountStore {
            path: path.into(),
            hasher,
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn hasher(&self) -> &CredentialHasher {
        &self.hasher
    }

    /// Adds an account and returns its freshly generated identity.
    pub fn create(&self, display_name: &str, password: &str) -> Result<String> {
        validate_field("display_name", display_name)?;
        validate_field("password", password)?;

        let identity = new_identity();
        let credential_hash = self.hasher.hash(password, display_name, &identity);

        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        let mut store = read_store(&self.path)?;
        store.accounts.push(Account {
            identity: identity.clone(),
            display_name: display_name.to_string(),
            credential_hash,
        });
        write_store(&self.path, &store)?;

        info!(identity = %identity, accounts = store.accounts.len(), "Account created");
        Ok(identity)
    }

    /// Removes an account. Returns `false` when the identity is unknown.
    pub fn delete(&self, identity: &str) -> Result<bool> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        let mut store = read_store(&self.path)?;
        let Some(index) = store.accounts.iter().position(|a| a.identity == identity) else {
            debug!(identity = %identity, "Delete skipped; account not found");
            return Ok(false);
        };
        store.accounts.remove(index);
        write_store(&self.path, &store)?;

        info!(identity = %identity, accounts = store.accounts.len(), "Account deleted");
        Ok(true)
    }

    /// Replaces display name and password, re-hashing against the new name.
    /// Returns `false` when the identity is unknown.
    pub fn rename_and_repassword(
        &self,
        identity: &str,
        new_display_name: &str,
        new_password: &str,
    ) -> Result<bool> {
        validate_field("display_name", new_display_name)?;
        validate_field("password", new_password)?;

        let credential_hash = self.hasher.hash(new_password, new_display_name, identity);

        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        let mut store = read_store(&self.path)?;
        let Some(account) = store.accounts.iter_mut().find(|a| a.identity == identity) else {
            debug!(identity = %identity, "Update skipped; account not found");
            return Ok(false);
        };
        account.display_name = new_display_name.to_string();
        account.credential_hash = credential_hash;
        write_store(&self.path, &store)?;

        info!(identity = %identity, "Account credentials updated");
        Ok(true)
    }

    /// Exact match on identity and current display name.
    pub fn find_credential_hash(&self, identity: &str, display_name: &str) -> Result<Option<String>> {
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        let store = read_store(&self.path)?;
        Ok(store
            .accounts
            .into_iter()
            .find(|a| a.identity == identity && a.display_name == display_name)
            .map(|a| a.credential_hash))
    }

    pub fn contains(&self, identity: &str) -> Result<bool> {
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        let store = read_store(&self.path)?;
        Ok(store.accounts.iter().any(|a| a.identity == identity))
    }

    /// All accounts in insertion order.
    pub fn list(&self) -> Result<Vec<AccountSummary>> {
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        let store = read_store(&self.path)?;
        Ok(store.accounts.iter().map(AccountSummary::from).collect())
    }
}

/// Rejects empty values and values containing the hash field separator.
fn validate_field(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(SeemeError::empty(field));
    }
    if value.contains(FIELD_SEPARATOR) {
        return Err(SeemeError::InvalidInput {
            field,
            reason: "must not contain NUL characters".to_string(),
        });
    }
    Ok(())
}

fn new_identity() -> String {
    Uuid::new_v4().to_string().to_uppercase()
}

fn read_store(path: &Path) -> Result<StoreFile> {
    let content = match fs_err::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(StoreFile::default()),
        Err(err) => return Err(SeemeError::storage("Failed to read account store", path, err)),
    };

    if content.trim().is_empty() {
        warn!(path = %path.display(), "Empty account store, treating as no accounts");
        return Ok(StoreFile::default());
    }

    let store: StoreFile =
        serde_json::from_str(&content).map_err(|err| SeemeError::StorageFormat {
            path: path.to_path_buf(),
            details: err.to_string(),
        })?;
    if store.version != STORE_VERSION {
        return Err(SeemeError::StorageFormat {
            path: path.to_path_buf(),
            details: format!(
                "unsupported version {} (expected {})",
                store.version, STORE_VERSION
            ),
        });
    }
    Ok(store)
}

fn write_store(path: &Path, store: &StoreFile) -> Result<()> {
    let content = serde_json::to_string_pretty(store).map_err(|source| {
        SeemeError::Serialization {
            context: "account store".to_string(),
            source,
        }
    })?;

    let parent_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs_err::create_dir_all(parent_dir)
        .map_err(|err| SeemeError::storage("Failed to create store directory", parent_dir, err))?;

    let mut temp_file = NamedTempFile::new_in(parent_dir)
        .map_err(|err| SeemeError::storage("Failed to create temp store file", parent_dir, err))?;
    temp_file
        .write_all(content.as_bytes())
        .map_err(|err| SeemeError::storage("Failed to write temp store file", path, err))?;
    temp_file
        .flush()
        .map_err(|err| SeemeError::storage("Failed to flush temp store file", path, err))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|err| SeemeError::storage("Failed to sync temp store file", path, err))?;
    temp_file
        .persist(path)
        .map_err(|err| SeemeError::storage("Failed to replace account store", path, err.error))?;

    Ok(())
}
