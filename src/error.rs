//! Error types for salonbook.
//!
//! This module defines all error types used throughout the salonbook crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for salonbook operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Store Errors ===
    /// Failed to open or create the key-value store.
    #[error("failed to open store at {path}: {source}")]
    StoreOpen {
        /// Path to the store file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A store query failed.
    #[error("store query failed: {0}")]
    StoreQuery(#[from] rusqlite::Error),

    /// A write would exceed the configured storage quota.
    ///
    /// The write is abandoned; nothing is partially persisted. The user
    /// message asks them to free up space (delete old backups or records).
    #[error(
        "storage quota exceeded: write of {attempted} bytes would exceed the \
         {limit}-byte limit; free up space by deleting old backups or records"
    )]
    QuotaExceeded {
        /// Size of the value that was being written.
        attempted: u64,
        /// The configured quota in bytes.
        limit: u64,
    },

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Snapshot Errors ===
    /// The requested snapshot does not exist.
    #[error("snapshot not found: {key}")]
    SnapshotMissing {
        /// The snapshot key that was looked up.
        key: String,
    },

    /// A persisted snapshot entry could not be parsed.
    #[error("corrupt snapshot entry {key}: {source}")]
    SnapshotCorrupt {
        /// The snapshot key.
        key: String,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Record Errors ===
    /// A record failed input validation.
    #[error("invalid record: {message}")]
    Validation {
        /// Description of what was invalid.
        message: String,
    },

    /// The referenced record does not exist.
    #[error("{kind} not found: {id}")]
    RecordMissing {
        /// What kind of record was looked up.
        kind: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    // === I/O and Serialization Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for salonbook operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a missing-record error.
    #[must_use]
    pub fn record_missing(kind: &'static str, id: impl Into<String>) -> Self {
        Self::RecordMissing {
            kind,
            id: id.into(),
        }
    }

    /// Create a missing-snapshot error.
    #[must_use]
    pub fn snapshot_missing(key: impl Into<String>) -> Self {
        Self::SnapshotMissing { key: key.into() }
    }

    /// Check if this error is a storage-quota failure.
    #[must_use]
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }

    /// Check if this error indicates a snapshot was not found.
    #[must_use]
    pub fn is_snapshot_missing(&self) -> bool {
        matches!(self, Self::SnapshotMissing { .. })
    }
}
