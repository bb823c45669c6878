//! Error types for the unlock module.

use sealpost_core::{CryptoError, ErrorCode, KeyId};
use thiserror::Error;

/// Errors surfaced by the unlock coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnlockError {
    /// The user closed or cancelled the password dialog.
    #[error("password dialog cancelled")]
    PasswordDialogCancel,

    /// Nothing cached and prompting was not allowed.
    #[error("key packet {0} is locked and prompting is disabled")]
    Locked(KeyId),

    /// The prompt surface could not be opened.
    #[error("prompt unavailable: {0}")]
    PromptUnavailable(String),

    /// Crypto engine error (a cached password that no longer works, etc).
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl UnlockError {
    pub fn code(&self) -> ErrorCode {
        match self {
            UnlockError::PasswordDialogCancel => ErrorCode::PwdDialogCancel,
            UnlockError::Crypto(e) => e.code(),
            _ => ErrorCode::InternalError,
        }
    }
}

/// Result type for unlock operations.
pub type Result<T> = std::result::Result<T, UnlockError>;
