//! Error types for seeme-core operations.
//!
//! "Not found" and "rejected" are ordinary outcomes (`bool`, `Option`, outcome
//! enums) and never appear here.

use std::path::PathBuf;

/// All errors that can occur in seeme-core operations.
#[derive(Debug, thiserror::Error)]
pub enum SeemeError {
    // ─────────────────────────────────────────────────────────────────────
    // Input Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    // ─────────────────────────────────────────────────────────────────────
    // Storage Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Storage failure: {context}: {path}: {source}")]
    Storage {
        context: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Account store malformed: {path}: {details}")]
    StorageFormat { path: PathBuf, details: String },

    #[error("Serialization error: {context}: {source}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration malformed: {path}: {details}")]
    Config { path: PathBuf, details: String },
}

impl SeemeError {
    pub(crate) fn empty(field: &'static str) -> Self {
        SeemeError::InvalidInput {
            field,
            reason: "must not be empty".to_string(),
        }
    }

    pub(crate) fn storage(
        context: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        SeemeError::Storage {
            context: context.into(),
            path: path.into(),
            source,
        }
    }

    /// True for failures of the durable store (I/O or on-disk format).
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            SeemeError::Storage { .. } | SeemeError::StorageFormat { .. }
        )
    }
}

/// Convenience type alias for Results using SeemeError.
pub type Result<T> = std::result::Result<T, SeemeError>;
