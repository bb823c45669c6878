//! Error types for Sealpost Core.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::KeyId;

/// Stable error codes that surfaces receive in `error-message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ArmorParseError,
    NoKeyFound,
    WrongPassword,
    PwdDialogCancel,
    SyncTimeout,
    KeyringAlreadyExists,
    NoKeyringForId,
    ImportError,
    InternalError,
}

impl ErrorCode {
    /// The wire string for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ArmorParseError => "ARMOR_PARSE_ERROR",
            ErrorCode::NoKeyFound => "NO_KEY_FOUND",
            ErrorCode::WrongPassword => "WRONG_PASSWORD",
            ErrorCode::PwdDialogCancel => "PWD_DIALOG_CANCEL",
            ErrorCode::SyncTimeout => "SYNC_TIMEOUT",
            ErrorCode::KeyringAlreadyExists => "KEYRING_ALREADY_EXISTS",
            ErrorCode::NoKeyringForId => "NO_KEYRING_FOR_ID",
            ErrorCode::ImportError => "IMPORT_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors for identifiers, names and encodings.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("malformed channel name: {0}")]
    MalformedChannel(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

impl CoreError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::InternalError
    }
}

/// Errors raised by a crypto engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Armored text could not be parsed.
    #[error("armor parse error: {0}")]
    ArmorParse(String),

    /// No usable key for the operation.
    #[error("no key found: {0}")]
    NoKeyFound(String),

    /// The password did not open the secret packet.
    #[error("wrong password")]
    WrongPassword,

    /// The packet's secret material is still locked.
    #[error("key packet {0} is locked")]
    KeyLocked(KeyId),

    /// The key has no secret material at all.
    #[error("key packet {0} has no secret material")]
    NotPrivate(KeyId),

    /// A signature did not verify.
    #[error("invalid signature from {0}")]
    InvalidSignature(KeyId),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("key import error: {0}")]
    Import(String),
}

impl CryptoError {
    /// Map to the surface-visible error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            CryptoError::ArmorParse(_) => ErrorCode::ArmorParseError,
            CryptoError::NoKeyFound(_) => ErrorCode::NoKeyFound,
            CryptoError::WrongPassword => ErrorCode::WrongPassword,
            CryptoError::Import(_) => ErrorCode::ImportError,
            _ => ErrorCode::InternalError,
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Result type for engine operations.
pub type CryptoResult<T> = std::result::Result<T, CryptoError>;
