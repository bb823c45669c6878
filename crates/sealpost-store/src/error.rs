//! Error types for the store module.

use sealpost_core::{ErrorCode, KeyringId};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Key or attribute serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A keyring with this id already exists.
    #[error("keyring already exists: {0}")]
    KeyringAlreadyExists(KeyringId),

    /// No keyring with this id.
    #[error("no keyring for id: {0}")]
    NoKeyringForId(KeyringId),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock around in-memory state was poisoned.
    #[error("store lock poisoned")]
    Poisoned,

    /// A blocking task failed to complete.
    #[error("blocking task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::KeyringAlreadyExists(_) => ErrorCode::KeyringAlreadyExists,
            StoreError::NoKeyringForId(_) => ErrorCode::NoKeyringForId,
            _ => ErrorCode::InternalError,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
