//! Error types for storage operations.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Kind of integrity constraint a write violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// A row with the same key already exists.
    Unique,
    /// A row references another row that does not exist.
    ForeignKey,
    /// A required field is missing or null.
    NotNull,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintKind::Unique => "unique",
            ConstraintKind::ForeignKey => "foreign key",
            ConstraintKind::NotNull => "not null",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The store file is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the store's lock.
    #[error("storage locked: {0}")]
    Locked(String),

    /// Encryption or decryption failed.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// A write violated an integrity constraint.
    #[error("{kind} constraint violated on {key}: {detail}")]
    Constraint {
        /// Which constraint was violated.
        kind: ConstraintKind,
        /// The key (or field) involved.
        key: String,
        /// Human-readable detail.
        detail: String,
    },
}

impl StorageError {
    /// Creates a constraint violation error.
    pub fn constraint(
        kind: ConstraintKind,
        key: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::Constraint {
            kind,
            key: key.into(),
            detail: detail.into(),
        }
    }

    /// Creates a unique constraint violation for `key`.
    pub fn duplicate_key(key: impl Into<String>) -> Self {
        Self::constraint(ConstraintKind::Unique, key, "key already exists")
    }
}
