//! Storage configuration and path management for SeeMe.
//!
//! `StorageConfig` owns every on-disk location the daemon and CLI touch, so
//! tests can redirect all of them at once with [`StorageConfig::with_root`].

use std::path::{Path, PathBuf};

const ROOT_DIR_NAME: &str = ".seeme";

/// Central configuration for all SeeMe storage paths.
///
/// Production code uses `StorageConfig::default()` which points to `~/.seeme/`.
/// Tests use `StorageConfig::with_root(temp_dir)` for isolation.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            root: home.join(ROOT_DIR_NAME),
        }
    }
}

impl StorageConfig {
    /// Creates a StorageConfig with a custom root directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// Returns the root directory for SeeMe data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Files
    // ─────────────────────────────────────────────────────────────────────────────

    /// Path to accounts.json (the durable account set).
    pub fn accounts_file(&self) -> PathBuf {
        self.root.join("accounts.json")
    }

    /// Path to seeme.toml (daemon and CLI settings).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("seeme.toml")
    }

    /// Path to daemon.addr, holding the address the running daemon bound.
    pub fn daemon_addr_file(&self) -> PathBuf {
        self.root.join("daemon.addr")
    }

    /// Path to logs/ directory (CLI log files).
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Ensures the root directory exists.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs_err::create_dir_all(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_root_is_seeme() {
        let config = StorageConfig::default();
        assert!(config.root().ends_with(".seeme"));
    }

    #[test]
    fn test_with_root_sets_custom_path() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/test-seeme"));
        assert_eq!(config.root(), Path::new("/tmp/test-seeme"));
    }

    #[test]
    fn test_file_paths_live_under_root() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/seeme"));
        assert_eq!(
            config.accounts_file(),
            PathBuf::from("/tmp/seeme/accounts.json")
        );
        assert_eq!(config.config_file(), PathBuf::from("/tmp/seeme/seeme.toml"));
        assert_eq!(
            config.daemon_addr_file(),
            PathBuf::from("/tmp/seeme/daemon.addr")
        );
        assert_eq!(config.logs_dir(), PathBuf::from("/tmp/seeme/logs"));
    }

    #[test]
    fn test_ensure_dirs_creates_root() {
        let temp = TempDir::new().unwrap();
        let config = StorageConfig::with_root(temp.path().join("nested").join(".seeme"));

        config.ensure_dirs().unwrap();

        assert!(config.root().is_dir());
    }
}
