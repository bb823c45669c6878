//! In-memory implementation of the KeyringStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use sealpost_core::{Fingerprint, Key, KeyId, KeyringId};

use crate::error::{Result, StoreError};
use crate::traits::{merge_keys, InsertResult, KeyringStore};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<HashMap<KeyringId, KeyringData>>,
}

#[derive(Default)]
struct KeyringData {
    keys: BTreeMap<Fingerprint, Key>,
    attributes: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<KeyringId, KeyringData>>> {
        self.inner.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<KeyringId, KeyringData>>> {
        self.inner.write().map_err(|_| StoreError::Poisoned)
    }

    fn with_keyring<T>(&self, id: &KeyringId, f: impl FnOnce(&KeyringData) -> T) -> Result<T> {
        let inner = self.read()?;
        let data = inner
            .get(id)
            .ok_or_else(|| StoreError::NoKeyringForId(id.clone()))?;
        Ok(f(data))
    }

    fn with_keyring_mut<T>(
        &self,
        id: &KeyringId,
        f: impl FnOnce(&mut KeyringData) -> T,
    ) -> Result<T> {
        let mut inner = self.write()?;
        let data = inner
            .get_mut(id)
            .ok_or_else(|| StoreError::NoKeyringForId(id.clone()))?;
        Ok(f(data))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyringStore for MemoryStore {
    async fn create_keyring(&self, id: &KeyringId) -> Result<()> {
        let mut inner = self.write()?;
        if inner.contains_key(id) {
            return Err(StoreError::KeyringAlreadyExists(id.clone()));
        }
        inner.insert(id.clone(), KeyringData::default());
        Ok(())
    }

    async fn delete_keyring(&self, id: &KeyringId) -> Result<()> {
        self.write()?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NoKeyringForId(id.clone()))
    }

    async fn has_keyring(&self, id: &KeyringId) -> Result<bool> {
        Ok(self.read()?.contains_key(id))
    }

    async fn list_keyrings(&self) -> Result<Vec<KeyringId>> {
        let mut ids: Vec<KeyringId> = self.read()?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn insert_key(&self, id: &KeyringId, key: &Key) -> Result<InsertResult> {
        self.with_keyring_mut(id, |data| match data.keys.get(&key.fingerprint) {
            Some(existing) => {
                let merged = merge_keys(existing, key);
                data.keys.insert(key.fingerprint, merged);
                InsertResult::Updated
            }
            None => {
                data.keys.insert(key.fingerprint, key.to_locked());
                InsertResult::Inserted
            }
        })
    }

    async fn remove_key(&self, id: &KeyringId, fingerprint: &Fingerprint) -> Result<bool> {
        self.with_keyring_mut(id, |data| data.keys.remove(fingerprint).is_some())
    }

    async fn keys(&self, id: &KeyringId) -> Result<Vec<Key>> {
        self.with_keyring(id, |data| data.keys.values().cloned().collect())
    }

    async fn key_by_fingerprint(
        &self,
        id: &KeyringId,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Key>> {
        self.with_keyring(id, |data| data.keys.get(fingerprint).cloned())
    }

    async fn key_by_key_id(&self, id: &KeyringId, key_id: &KeyId) -> Result<Option<Key>> {
        self.with_keyring(id, |data| {
            data.keys
                .values()
                .find(|k| k.packet(*key_id).is_some())
                .cloned()
        })
    }

    async fn keys_by_address(&self, id: &KeyringId, address: &str) -> Result<Vec<Key>> {
        let address = address.trim().to_lowercase();
        self.with_keyring(id, |data| {
            data.keys
                .values()
                .filter(|k| k.addresses().contains(&address))
                .cloned()
                .collect()
        })
    }

    async fn attribute(&self, id: &KeyringId, name: &str) -> Result<Option<Vec<u8>>> {
        self.with_keyring(id, |data| data.attributes.get(name).cloned())
    }

    async fn set_attribute(&self, id: &KeyringId, name: &str, value: &[u8]) -> Result<()> {
        self.with_keyring_mut(id, |data| {
            data.attributes.insert(name.to_string(), value.to_vec());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::KeyringStoreExt;
    use sealpost_core::{CryptoEngine, GenerateKeyOptions, SoftEngine};

    async fn make_key(email: &str) -> Key {
        SoftEngine::new()
            .generate_key(GenerateKeyOptions {
                user_ids: vec![format!("Test <{email}>")],
                password: "pw".into(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_keyring_lifecycle() {
        let store = MemoryStore::new();
        let id = KeyringId::main();

        store.create_keyring(&id).await.unwrap();
        assert!(store.has_keyring(&id).await.unwrap());
        assert!(matches!(
            store.create_keyring(&id).await,
            Err(StoreError::KeyringAlreadyExists(_))
        ));

        store.delete_keyring(&id).await.unwrap();
        assert!(matches!(
            store.keys(&id).await,
            Err(StoreError::NoKeyringForId(_))
        ));
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let store = MemoryStore::new();
        let id = KeyringId::main();
        store.ensure_keyring(&id).await.unwrap();
        store.ensure_keyring(&id).await.unwrap();

        let key = make_key("bob@example.org").await;
        assert_eq!(
            store.insert_key(&id, &key).await.unwrap(),
            InsertResult::Inserted
        );
        assert_eq!(
            store.insert_key(&id, &key.to_public()).await.unwrap(),
            InsertResult::Updated
        );

        let by_sub = store
            .key_by_key_id(&id, &key.subkeys[0].key_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_sub.fingerprint, key.fingerprint);
        // the public re-import kept the secret parts
        assert!(by_sub.is_private());

        let by_addr = store.keys_by_address(&id, "BOB@example.org").await.unwrap();
        assert_eq!(by_addr.len(), 1);

        assert!(store.remove_key(&id, &key.fingerprint).await.unwrap());
        assert!(!store.remove_key(&id, &key.fingerprint).await.unwrap());
    }

    #[tokio::test]
    async fn test_attributes() {
        let store = MemoryStore::new();
        let id = KeyringId::main();
        store.create_keyring(&id).await.unwrap();

        assert!(store.attribute(&id, "x").await.unwrap().is_none());
        store
            .set_attribute_cbor(&id, "x", &vec![1u32, 2, 3])
            .await
            .unwrap();
        let back: Option<Vec<u32>> = store.attribute_cbor(&id, "x").await.unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));
    }
}
