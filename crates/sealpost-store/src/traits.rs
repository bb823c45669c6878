//! KeyringStore trait: the abstract interface for key persistence.
//!
//! Implementations include SQLite (primary) and in-memory (for tests).
//! Stores never hold decrypted secret material: keys are written locked.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use sealpost_core::{Fingerprint, Key, KeyId, KeyringId};

use crate::error::{Result, StoreError};

/// Result of inserting a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// The fingerprint was new to the keyring.
    Inserted,
    /// A key with this fingerprint existed and was merged.
    Updated,
}

/// Merge an incoming copy of a key into the stored one.
///
/// User ids are unioned and secret parts are kept from whichever side has
/// them, so importing a public copy never strips a private key.
pub fn merge_keys(existing: &Key, incoming: &Key) -> Key {
    let mut merged = incoming.to_locked();
    for id in merged.key_ids() {
        let has_secret = merged.packet(id).is_some_and(|p| p.is_private());
        if has_secret {
            continue;
        }
        let theirs = existing.packet(id).and_then(|p| p.secret.clone());
        if let Some(packet) = merged.packet_mut(id) {
            packet.secret = theirs.map(|mut s| {
                s.lock();
                s
            });
        }
    }
    for uid in &existing.user_ids {
        if !merged.user_ids.contains(uid) {
            merged.user_ids.push(uid.clone());
        }
    }
    merged
}

/// The KeyringStore trait: async interface for keyrings, keys and
/// keyring attributes.
///
/// # Design Notes
///
/// - **Locked writes**: `insert_key` persists `key.to_locked()`.
/// - **Merging inserts**: a second insert of the same fingerprint merges.
/// - **Attributes**: opaque named blobs per keyring (sync state, default key).
#[async_trait]
pub trait KeyringStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Keyring Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create an empty keyring. Fails if it exists.
    async fn create_keyring(&self, id: &KeyringId) -> Result<()>;

    /// Delete a keyring with its keys and attributes.
    async fn delete_keyring(&self, id: &KeyringId) -> Result<()>;

    /// Check if a keyring exists.
    async fn has_keyring(&self, id: &KeyringId) -> Result<bool>;

    /// List all keyrings.
    async fn list_keyrings(&self) -> Result<Vec<KeyringId>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Key Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or merge a key.
    async fn insert_key(&self, id: &KeyringId, key: &Key) -> Result<InsertResult>;

    /// Remove a key. Returns whether it existed.
    async fn remove_key(&self, id: &KeyringId, fingerprint: &Fingerprint) -> Result<bool>;

    /// All keys of a keyring, ordered by fingerprint.
    async fn keys(&self, id: &KeyringId) -> Result<Vec<Key>>;

    /// Look up a key by fingerprint.
    async fn key_by_fingerprint(
        &self,
        id: &KeyringId,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Key>>;

    /// Look up the key owning a packet id (primary or sub-key).
    async fn key_by_key_id(&self, id: &KeyringId, key_id: &KeyId) -> Result<Option<Key>>;

    /// Keys with a user id for this e-mail address (case-insensitive).
    async fn keys_by_address(&self, id: &KeyringId, address: &str) -> Result<Vec<Key>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Attribute Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Read a named attribute.
    async fn attribute(&self, id: &KeyringId, name: &str) -> Result<Option<Vec<u8>>>;

    /// Write a named attribute.
    async fn set_attribute(&self, id: &KeyringId, name: &str, value: &[u8]) -> Result<()>;
}

/// Convenience methods on top of [`KeyringStore`].
#[async_trait]
pub trait KeyringStoreExt: KeyringStore {
    /// Create the keyring unless it exists.
    async fn ensure_keyring(&self, id: &KeyringId) -> Result<()> {
        match self.create_keyring(id).await {
            Ok(()) | Err(StoreError::KeyringAlreadyExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Read a CBOR-encoded attribute.
    async fn attribute_cbor<T: DeserializeOwned + Send>(
        &self,
        id: &KeyringId,
        name: &str,
    ) -> Result<Option<T>> {
        match self.attribute(id, name).await? {
            Some(bytes) => ciborium::from_reader(bytes.as_slice())
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Write a CBOR-encoded attribute.
    async fn set_attribute_cbor<T: Serialize + Sync>(
        &self,
        id: &KeyringId,
        name: &str,
        value: &T,
    ) -> Result<()> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.set_attribute(id, name, &buf).await
    }
}

impl<S: KeyringStore + ?Sized> KeyringStoreExt for S {}
