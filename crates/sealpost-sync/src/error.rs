//! Error types for the sync module.
//!
//! These never reach callers of [`SyncEngine::trigger`]; they are logged
//! and folded into the cycle report.
//!
//! [`SyncEngine::trigger`]: crate::engine::SyncEngine::trigger

use std::time::Duration;

use sealpost_core::{CryptoError, ErrorCode, KeyId};
use sealpost_store::StoreError;
use sealpost_unlock::UnlockError;
use thiserror::Error;

/// Errors that can occur during a sync sub-step.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// No reply within the request timeout.
    #[error("sync request timed out after {0:?}")]
    Timeout(Duration),

    /// The remote copy moved on since our last sync.
    #[error("version conflict: sent {sent:?}, remote is at {remote:?}")]
    Conflict {
        sent: Option<String>,
        remote: Option<String>,
    },

    /// The payload could not be decoded.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The payload's signature could not be verified.
    #[error("payload signer {0} is not trusted")]
    UntrustedSigner(KeyId),

    /// The key has no packet usable for this step.
    #[error("no usable key: {0}")]
    NoKey(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Crypto engine error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Unlocking the sync key failed.
    #[error("unlock error: {0}")]
    Unlock(#[from] UnlockError),
}

impl SyncError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SyncError::Timeout(_) => ErrorCode::SyncTimeout,
            SyncError::Store(e) => e.code(),
            SyncError::Crypto(e) => e.code(),
            SyncError::Unlock(e) => e.code(),
            SyncError::NoKey(_) => ErrorCode::NoKeyFound,
            _ => ErrorCode::InternalError,
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
