//! Error types for Sealpost.

use sealpost_core::{CoreError, CryptoError, ErrorCode};
use sealpost_store::StoreError;
use sealpost_sync::SyncError;
use sealpost_unlock::UnlockError;
use thiserror::Error;

/// Routing failures. All of them are configuration or host errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// The channel name is not `"<type>-<id>"`.
    #[error("malformed channel name: {0}")]
    MalformedChannel(String),

    /// No factory is registered for the type.
    #[error("no controller registered for type {0}")]
    UnknownType(String),

    /// A secondary channel connected before its primary.
    #[error("channel {channel} requires an open {primary} channel")]
    MissingPrimary { channel: String, primary: String },

    /// The router is gone.
    #[error("router has shut down")]
    Closed,
}

impl From<CoreError> for RouterError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::MalformedChannel(name) => RouterError::MalformedChannel(name),
            other => RouterError::MalformedChannel(other.to_string()),
        }
    }
}

/// Errors that can occur during Sealpost operations.
#[derive(Debug, Error)]
pub enum SealpostError {
    #[error("router error: {0}")]
    Router(#[from] RouterError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("unlock error: {0}")]
    Unlock(#[from] UnlockError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Preferences could not be parsed.
    #[error("invalid preferences: {0}")]
    Preferences(#[from] serde_json::Error),

    /// The host could not open a surface.
    #[error("surface error: {0}")]
    Surface(String),
}

impl SealpostError {
    /// The code carried by `error-message`.
    pub fn code(&self) -> ErrorCode {
        match self {
            SealpostError::Crypto(e) => e.code(),
            SealpostError::Store(e) => e.code(),
            SealpostError::Unlock(e) => e.code(),
            SealpostError::Sync(e) => e.code(),
            _ => ErrorCode::InternalError,
        }
    }
}

/// Result type for Sealpost operations.
pub type Result<T> = std::result::Result<T, SealpostError>;
