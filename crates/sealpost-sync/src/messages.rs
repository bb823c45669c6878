//! Sync wire types.
//!
//! A remote holds one opaque payload per keyring plus a version tag. The
//! payload is a CBOR [`SyncPayload`] encrypted to, and signed by, the key
//! that performed the sync.

use serde::{Deserialize, Serialize};

use sealpost_core::{ChangeLog, Key};

use crate::error::{Result, SyncError};

/// Kind of a `sync-event` sent to a sync handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncEventKind {
    Upload,
    Download,
    Backup,
    Restore,
}

/// Ask for the remote payload if it differs from `version`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub version: Option<String>,
}

/// Remote payload (absent when unchanged or empty) and its version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadReply {
    pub payload: Option<String>,
    pub version: Option<String>,
}

/// Replace the remote payload, provided the remote is still at `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub version: Option<String>,
    pub payload: String,
}

/// The version assigned to an accepted upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReply {
    pub version: String,
}

/// Plaintext content of a sync payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncPayload {
    pub change_log: ChangeLog,
    /// Public parts only.
    pub keys: Vec<Key>,
}

impl SyncPayload {
    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| SyncError::InvalidPayload(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| SyncError::InvalidPayload(e.to_string()))
    }
}
