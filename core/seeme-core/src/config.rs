//! Runtime configuration loaded from `seeme.toml`.
//!
//! Every section and field has a default, so a missing file or a partial file
//! both load cleanly.
//!
//! ```toml
//! [server]
//! listen_addr = "127.0.0.1:5050"
//! admin_loopback_only = true
//! max_connections = 64
//!
//! [storage]
//! accounts_file = "/var/lib/seeme/accounts.json"
//!
//! [security]
//! hash_iterations = 100000
//!
//! [activity]
//! online_window_secs = 60
//!
//! [client]
//! identity = "3F2504E0-4F89-41D3-9A0C-0305E82C3301"
//! display_name = "alice"
//! password = "pw1"
//! report_every_secs = 30
//! ```
//!
//! `[client]` is read only by the CLI, so credentials stay out of argv.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, SeemeError};
use crate::storage::StorageConfig;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "SEEME_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeemeConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub security: SecuritySection,
    #[serde(default)]
    pub activity: ActivitySection,
    #[serde(default)]
    pub client: ClientSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerSection {
    /// Address the daemon listens on. Port 0 picks a free port.
    pub listen_addr: String,
    /// Reject account administration from non-loopback peers.
    pub admin_loopback_only: bool,
    /// Concurrent connections served before new ones are turned away.
    pub max_connections: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:5050".to_string(),
            admin_loopback_only: true,
            max_connections: 64,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageSection {
    /// Overrides `<root>/accounts.json`.
    pub accounts_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SecuritySection {
    /// PBKDF2 rounds used for new credential hashes.
    pub hash_iterations: u32,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            hash_iterations: crate::password::DEFAULT_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ActivitySection {
    /// A record updated within this many seconds reads as online.
    pub online_window_secs: i64,
}

impl Default for ActivitySection {
    fn default() -> Self {
        Self {
            online_window_secs: 60,
        }
    }
}

/// Credentials a monitored machine logs in and reports with.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientSection {
    pub identity: Option<String>,
    pub display_name: Option<String>,
    pub password: Option<String>,
    /// Default interval for `seeme report`; unset reports once.
    pub report_every_secs: Option<u64>,
}

impl fmt::Debug for ClientSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSection")
            .field("identity", &self.identity)
            .field("display_name", &self.display_name)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("report_every_secs", &self.report_every_secs)
            .finish()
    }
}

impl SeemeConfig {
    /// Resolves the accounts file, honouring the `[storage]` override.
    pub fn accounts_file(&self, storage: &StorageConfig) -> PathBuf {
        self.storage
            .accounts_file
            .clone()
            .unwrap_or_else(|| storage.accounts_file())
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.security.hash_iterations == 0 {
            return Err(SeemeError::Config {
                path: path.to_path_buf(),
                details: "security.hash_iterations must be at least 1".to_string(),
            });
        }
        if self.activity.online_window_secs < 0 {
            return Err(SeemeError::Config {
                path: path.to_path_buf(),
                details: "activity.online_window_secs must not be negative".to_string(),
            });
        }
        if self.server.max_connections == 0 {
            return Err(SeemeError::Config {
                path: path.to_path_buf(),
                details: "server.max_connections must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Returns the config path: `$SEEME_CONFIG`, else `<root>/seeme.toml`.
pub fn config_path(storage: &StorageConfig) -> PathBuf {
    match env::var(CONFIG_ENV) {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => storage.config_file(),
    }
}

/// Loads the configuration, returning defaults if the file doesn't exist.
pub fn load_config(path: &Path) -> Result<SeemeConfig> {
    let content = match fs_err::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(SeemeConfig::default())
        }
        Err(err) => return Err(SeemeError::storage("Failed to read config", path, err)),
    };

    let config: SeemeConfig = toml::from_str(&content).map_err(|err| SeemeError::Config {
        path: path.to_path_buf(),
        details: err.to_string(),
    })?;
    config.validate(path)?;
    Ok(config)
}
