//! Strong type definitions for keys and keyrings.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// An 8-byte key packet identifier.
///
/// Every packet of a key (the primary and each sub-key) has its own id.
/// Displayed as 16 upper-case hex digits, which is how surfaces refer to it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyId(pub [u8; 8]);

impl KeyId {
    /// Create a new KeyId from raw bytes.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Derive the id of a packet from its public material.
    pub fn derive(public: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"sealpost-keyid-v0:");
        hasher.update(public);
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&hasher.finalize().as_bytes()[..8]);
        Self(arr)
    }

    /// Convert to upper-case hex string.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    /// Parse from hex string (either case).
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidId(e.to_string()))?;
        let arr: [u8; 8] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidId(format!("key id must be 8 bytes: {s}")))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self.to_hex())
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A 20-byte key fingerprint, derived from the primary public material.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 20]);

impl Fingerprint {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Derive a fingerprint from primary public material.
    pub fn derive(primary_public: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"sealpost-fpr-v0:");
        hasher.update(primary_public);
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&hasher.finalize().as_bytes()[..20]);
        Self(arr)
    }

    /// Convert to lower-case hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidId(e.to_string()))?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidId(format!("fingerprint must be 20 bytes: {s}")))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Identifier of a keyring, e.g. `localhost|#|main`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyringId(String);

impl KeyringId {
    /// The keyring every installation starts with.
    pub const MAIN: &'static str = "localhost|#|main";

    /// Create a keyring id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The main keyring.
    pub fn main() -> Self {
        Self(Self::MAIN.to_string())
    }

    /// Borrow as str.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for KeyringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyringId({})", self.0)
    }
}

impl fmt::Display for KeyringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyringId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
