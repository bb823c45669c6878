//! Keyring facade.
//!
//! Key mutations go through here so that every insert and delete lands in
//! the keyring's change log.

use std::sync::Arc;

use tracing::info;

use sealpost_core::{Fingerprint, Key, KeyId, KeyringId, MutationKind};
use sealpost_store::{InsertResult, KeyringStore, KeyringStoreExt, StoreError};

use crate::changelog_store::ChangeLogStore;
use crate::error::Result;

/// Attribute holding the fingerprint of the default private key.
pub const DEFAULT_KEY_ATTRIBUTE: &str = "default_key";

pub struct Keyring {
    id: KeyringId,
    store: Arc<dyn KeyringStore>,
    log: ChangeLogStore,
}

impl Keyring {
    /// Open an existing keyring.
    pub async fn open(store: Arc<dyn KeyringStore>, id: KeyringId) -> Result<Self> {
        if !store.has_keyring(&id).await? {
            return Err(StoreError::NoKeyringForId(id).into());
        }
        let log = ChangeLogStore::load(store.clone(), id.clone()).await?;
        Ok(Self { id, store, log })
    }

    /// Create a new keyring. Fails if it exists.
    pub async fn create(store: Arc<dyn KeyringStore>, id: KeyringId) -> Result<Self> {
        store.create_keyring(&id).await?;
        info!(keyring = %id, "keyring created");
        Self::open(store, id).await
    }

    /// Open the keyring, creating it when missing.
    pub async fn open_or_create(store: Arc<dyn KeyringStore>, id: KeyringId) -> Result<Self> {
        store.ensure_keyring(&id).await?;
        Self::open(store, id).await
    }

    pub fn id(&self) -> &KeyringId {
        &self.id
    }

    pub fn change_log(&self) -> &ChangeLogStore {
        &self.log
    }

    pub async fn keys(&self) -> Result<Vec<Key>> {
        Ok(self.store.keys(&self.id).await?)
    }

    pub async fn private_keys(&self) -> Result<Vec<Key>> {
        Ok(self
            .keys()
            .await?
            .into_iter()
            .filter(Key::is_private)
            .collect())
    }

    pub async fn key_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Option<Key>> {
        Ok(self.store.key_by_fingerprint(&self.id, fingerprint).await?)
    }

    pub async fn key_by_key_id(&self, key_id: &KeyId) -> Result<Option<Key>> {
        Ok(self.store.key_by_key_id(&self.id, key_id).await?)
    }

    pub async fn keys_by_address(&self, address: &str) -> Result<Vec<Key>> {
        Ok(self.store.keys_by_address(&self.id, address).await?)
    }

    /// Insert or merge a key, logging an INSERT for new fingerprints and an
    /// UPDATE otherwise.
    pub async fn import_key(&self, key: &Key) -> Result<InsertResult> {
        let result = self.store.insert_key(&self.id, key).await?;
        let kind = match result {
            InsertResult::Inserted => MutationKind::Insert,
            InsertResult::Updated => MutationKind::Update,
        };
        self.log.record(key.fingerprint, kind);
        self.log.persist().await?;
        Ok(result)
    }

    /// Delete a key, logging a DELETE if it existed.
    pub async fn remove_key(&self, fingerprint: &Fingerprint) -> Result<bool> {
        let removed = self.store.remove_key(&self.id, fingerprint).await?;
        if removed {
            self.log.record(*fingerprint, MutationKind::Delete);
            self.log.persist().await?;
        }
        Ok(removed)
    }

    /// Insert a key taken from the remote log. Nothing is recorded, so the
    /// write does not count as a local change.
    pub async fn apply_remote_key(&self, key: &Key) -> Result<InsertResult> {
        Ok(self.store.insert_key(&self.id, key).await?)
    }

    /// Delete a key the remote log marks deleted. Nothing is recorded.
    pub async fn apply_remote_delete(&self, fingerprint: &Fingerprint) -> Result<bool> {
        Ok(self.store.remove_key(&self.id, fingerprint).await?)
    }

    /// The default private key: the configured one if still present,
    /// otherwise the first private key.
    pub async fn default_key(&self) -> Result<Option<Key>> {
        let configured: Option<Fingerprint> = self
            .store
            .attribute_cbor(&self.id, DEFAULT_KEY_ATTRIBUTE)
            .await?;
        if let Some(fingerprint) = configured {
            if let Some(key) = self.key_by_fingerprint(&fingerprint).await? {
                if key.is_private() {
                    return Ok(Some(key));
                }
            }
        }
        Ok(self.private_keys().await?.into_iter().next())
    }

    pub async fn set_default_key(&self, fingerprint: &Fingerprint) -> Result<()> {
        self.store
            .set_attribute_cbor(&self.id, DEFAULT_KEY_ATTRIBUTE, fingerprint)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealpost_core::{CryptoEngine, GenerateKeyOptions, SoftEngine};
    use sealpost_store::MemoryStore;

    async fn make_key(name: &str) -> Key {
        SoftEngine::new()
            .generate_key(GenerateKeyOptions {
                user_ids: vec![format!("{name} <{name}@example.org>")],
                password: "pw".into(),
            })
            .await
            .unwrap()
    }

    async fn keyring() -> Keyring {
        Keyring::open_or_create(Arc::new(MemoryStore::new()), KeyringId::main())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_missing_fails() {
        let err = Keyring::open(Arc::new(MemoryStore::new()), KeyringId::main())
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), sealpost_core::ErrorCode::NoKeyringForId);
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let store: Arc<dyn KeyringStore> = Arc::new(MemoryStore::new());
        Keyring::create(store.clone(), KeyringId::main()).await.unwrap();
        let err = Keyring::create(store, KeyringId::main()).await.err().unwrap();
        assert_eq!(err.code(), sealpost_core::ErrorCode::KeyringAlreadyExists);
    }

    #[tokio::test]
    async fn test_mutations_are_logged() {
        let ring = keyring().await;
        let key = make_key("alice").await;

        ring.import_key(&key).await.unwrap();
        let log = ring.change_log().change_log();
        assert_eq!(log.get(&key.fingerprint).unwrap().kind, MutationKind::Insert);

        ring.change_log().take_modified();
        ring.import_key(&key.to_public()).await.unwrap();
        // update: modified, no new entry kind
        assert!(ring.change_log().is_modified());
        assert_eq!(
            ring.change_log()
                .change_log()
                .get(&key.fingerprint)
                .unwrap()
                .kind,
            MutationKind::Insert
        );

        assert!(ring.remove_key(&key.fingerprint).await.unwrap());
        assert_eq!(
            ring.change_log().deleted_fingerprints(),
            vec![key.fingerprint]
        );
    }

    #[tokio::test]
    async fn test_remote_writes_are_not_logged() {
        let ring = keyring().await;
        let key = make_key("dave").await.to_public();

        assert_eq!(
            ring.apply_remote_key(&key).await.unwrap(),
            InsertResult::Inserted
        );
        assert!(!ring.change_log().is_modified());
        assert!(ring.change_log().change_log().is_empty());

        assert!(ring.apply_remote_delete(&key.fingerprint).await.unwrap());
        assert!(ring.key_by_fingerprint(&key.fingerprint).await.unwrap().is_none());
        assert!(ring.change_log().deleted_fingerprints().is_empty());
        assert!(!ring.change_log().is_modified());
    }

    #[tokio::test]
    async fn test_default_key() {
        let ring = keyring().await;
        assert!(ring.default_key().await.unwrap().is_none());

        let a = make_key("a").await;
        let b = make_key("b").await;
        ring.import_key(&a).await.unwrap();
        ring.import_key(&b).await.unwrap();
        ring.import_key(&make_key("c").await.to_public()).await.unwrap();

        ring.set_default_key(&b.fingerprint).await.unwrap();
        assert_eq!(
            ring.default_key().await.unwrap().unwrap().fingerprint,
            b.fingerprint
        );

        ring.remove_key(&b.fingerprint).await.unwrap();
        assert_eq!(
            ring.default_key().await.unwrap().unwrap().fingerprint,
            a.fingerprint
        );
    }
}
