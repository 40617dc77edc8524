//! # seeme-core
//!
//! Core library for SeeMe: the durable account store, the credential hashing
//! scheme, the login registry and the activity cache, composed behind
//! [`Coordinator`].
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. The daemon drives it from
//!   plain threads.
//! - **Thread-safe façade**: [`Coordinator`] is `Send + Sync`; each store owns
//!   its own lock and no two are ever held together.
//! - **Durable store is authoritative**: sessions and activity are derived,
//!   in-memory, and rebuilt on startup.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use seeme_core::{Coordinator, SeemeConfig, StorageConfig};
//!
//! let coordinator = Coordinator::open(&StorageConfig::default(), &SeemeConfig::default())?;
//! let identity = coordinator.add_account("alice", "pw1")?;
//! ```

pub mod accounts;
pub mod activity;
pub mod config;
pub mod error;
pub mod password;
pub mod service;
pub mod sessions;
pub mod storage;

pub use accounts::{Account, AccountStore, AccountSummary};
pub use activity::{ActivityCache, ActivityRecord, UNKNOWN_LABEL};
pub use config::{
    config_path, load_config, ActivitySection, ClientSection, SecuritySection, SeemeConfig,
    ServerSection, StorageSection, CONFIG_ENV,
};
pub use error::{Result, SeemeError};
pub use password::CredentialHasher;
pub use service::{ActivitySnapshot, Coordinator, ReportOutcome, ServiceHealth};
pub use sessions::{LoginOutcome, RejectReason, SessionRegistry};
pub use storage::StorageConfig;
