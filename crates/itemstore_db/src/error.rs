//! Error types for the storage layer.

use itemstore_protocol::ConfigError;
use std::fmt;
use thiserror::Error;

/// Database operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Which table key a key-identity conflict concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Primary,
    Range,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Primary => f.write_str("primaryKey"),
            KeyKind::Range => f.write_str("rangeKey"),
        }
    }
}

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error (file system operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Table definitions failed structural validation
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A reconciled table's key field differs from what was recorded when it
    /// was created. Never retryable; the operator has to resolve it.
    #[error("table {table:?}: {key} field changed from {recorded:?} to {configured:?}; this is not allowed")]
    KeyFieldChanged {
        table: String,
        key: KeyKind,
        recorded: String,
        configured: String,
    },

    /// The metadata table has never been created
    #[error("_meta table does not exist; run migrate or use --skip-config-validation")]
    MetaMissing,

    /// No structural fingerprint has been stored
    #[error("database config hash is missing in _meta; run migrate or use --skip-config-validation")]
    ConfigHashMissing,

    /// Stored fingerprint disagrees with the running configuration
    #[error("configuration hash mismatch: database={stored} config={expected}")]
    ConfigHashMismatch { stored: String, expected: String },

    /// Operation not enabled for this table or index
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    /// Addressed key does not fit the table's key shape
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Stored data could not be interpreted
    #[error("Corrupt data: {0}")]
    Corrupt(String),
}

impl DbError {
    /// Create a not permitted error.
    pub fn not_permitted(msg: impl Into<String>) -> Self {
        Self::NotPermitted(msg.into())
    }

    /// Create an invalid key error.
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    /// Create a corrupt data error.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    /// Whether retrying the same call could succeed.
    ///
    /// Only transport/storage failures qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::Sqlx(_) | DbError::Io(_))
    }

    /// Whether this is a startup drift-check failure.
    pub fn is_drift(&self) -> bool {
        matches!(
            self,
            DbError::MetaMissing | DbError::ConfigHashMissing | DbError::ConfigHashMismatch { .. }
        )
    }
}
