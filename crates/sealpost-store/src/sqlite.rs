//! SQLite implementation of the KeyringStore trait.
//!
//! The persistent backend. It uses rusqlite with bundled SQLite, wrapped in
//! async via `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use sealpost_core::{Fingerprint, Key, KeyId, KeyringId};

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::{merge_keys, InsertResult, KeyringStore};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn encode_key(key: &Key) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(&key.to_locked(), &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_key(blob: &[u8]) -> Result<Key> {
    ciborium::from_reader(blob).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn require_keyring(conn: &Connection, id: &str) -> Result<()> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM keyrings WHERE keyring_id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    match exists {
        Some(_) => Ok(()),
        None => Err(StoreError::NoKeyringForId(KeyringId::new(id))),
    }
}

fn load_key(conn: &Connection, id: &str, fingerprint: &[u8]) -> Result<Option<Key>> {
    let blob: Option<Vec<u8>> = conn
        .query_row(
            "SELECT key_blob FROM keys WHERE keyring_id = ?1 AND fingerprint = ?2",
            params![id, fingerprint],
            |row| row.get(0),
        )
        .optional()?;
    blob.map(|b| decode_key(&b)).transpose()
}

fn delete_key_rows(tx: &Transaction<'_>, id: &str, fingerprint: &[u8]) -> Result<usize> {
    tx.execute(
        "DELETE FROM key_ids WHERE keyring_id = ?1 AND fingerprint = ?2",
        params![id, fingerprint],
    )?;
    tx.execute(
        "DELETE FROM key_addresses WHERE keyring_id = ?1 AND fingerprint = ?2",
        params![id, fingerprint],
    )?;
    Ok(tx.execute(
        "DELETE FROM keys WHERE keyring_id = ?1 AND fingerprint = ?2",
        params![id, fingerprint],
    )?)
}

fn write_key_rows(tx: &Transaction<'_>, id: &str, key: &Key) -> Result<()> {
    let fingerprint = key.fingerprint.as_bytes().as_slice();
    tx.execute(
        "INSERT INTO keys (keyring_id, fingerprint, key_blob, updated_at) VALUES (?1, ?2, ?3, ?4)",
        params![id, fingerprint, encode_key(key)?, now_millis()],
    )?;
    for key_id in key.key_ids() {
        tx.execute(
            "INSERT OR REPLACE INTO key_ids (keyring_id, key_id, fingerprint) VALUES (?1, ?2, ?3)",
            params![id, key_id.as_bytes().as_slice(), fingerprint],
        )?;
    }
    for address in key.addresses() {
        tx.execute(
            "INSERT OR IGNORE INTO key_addresses (keyring_id, address, fingerprint) VALUES (?1, ?2, ?3)",
            params![id, address, fingerprint],
        )?;
    }
    Ok(())
}

#[async_trait]
impl KeyringStore for SqliteStore {
    async fn create_keyring(&self, id: &KeyringId) -> Result<()> {
        let id = id.clone();
        self.blocking(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO keyrings (keyring_id, created_at) VALUES (?1, ?2)",
                params![id.as_str(), now_millis()],
            )?;
            if inserted == 0 {
                return Err(StoreError::KeyringAlreadyExists(id));
            }
            Ok(())
        })
        .await
    }

    async fn delete_keyring(&self, id: &KeyringId) -> Result<()> {
        let id = id.clone();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            for table in ["key_ids", "key_addresses", "keys", "keyring_attributes"] {
                tx.execute(
                    &format!("DELETE FROM {table} WHERE keyring_id = ?1"),
                    params![id.as_str()],
                )?;
            }
            let removed = tx.execute(
                "DELETE FROM keyrings WHERE keyring_id = ?1",
                params![id.as_str()],
            )?;
            if removed == 0 {
                return Err(StoreError::NoKeyringForId(id));
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn has_keyring(&self, id: &KeyringId) -> Result<bool> {
        let id = id.clone();
        self.blocking(move |conn| match require_keyring(conn, id.as_str()) {
            Ok(()) => Ok(true),
            Err(StoreError::NoKeyringForId(_)) => Ok(false),
            Err(e) => Err(e),
        })
        .await
    }

    async fn list_keyrings(&self) -> Result<Vec<KeyringId>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT keyring_id FROM keyrings ORDER BY keyring_id")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .map(|r| r.map(KeyringId::new))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
        .await
    }

    async fn insert_key(&self, id: &KeyringId, key: &Key) -> Result<InsertResult> {
        let id = id.clone();
        let key = key.clone();
        self.blocking(move |conn| {
            require_keyring(conn, id.as_str())?;
            let fingerprint = key.fingerprint.as_bytes().to_vec();
            let existing = load_key(conn, id.as_str(), &fingerprint)?;

            let tx = conn.transaction()?;
            let result = match existing {
                Some(existing) => {
                    delete_key_rows(&tx, id.as_str(), &fingerprint)?;
                    write_key_rows(&tx, id.as_str(), &merge_keys(&existing, &key))?;
                    InsertResult::Updated
                }
                None => {
                    write_key_rows(&tx, id.as_str(), &key)?;
                    InsertResult::Inserted
                }
            };
            tx.commit()?;
            Ok(result)
        })
        .await
    }

    async fn remove_key(&self, id: &KeyringId, fingerprint: &Fingerprint) -> Result<bool> {
        let id = id.clone();
        let fingerprint = *fingerprint;
        self.blocking(move |conn| {
            require_keyring(conn, id.as_str())?;
            let tx = conn.transaction()?;
            let removed = delete_key_rows(&tx, id.as_str(), fingerprint.as_bytes())?;
            tx.commit()?;
            Ok(removed > 0)
        })
        .await
    }

    async fn keys(&self, id: &KeyringId) -> Result<Vec<Key>> {
        let id = id.clone();
        self.blocking(move |conn| {
            require_keyring(conn, id.as_str())?;
            let mut stmt = conn.prepare(
                "SELECT key_blob FROM keys WHERE keyring_id = ?1 ORDER BY fingerprint",
            )?;
            let blobs = stmt
                .query_map(params![id.as_str()], |row| row.get::<_, Vec<u8>>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            blobs.iter().map(|b| decode_key(b)).collect()
        })
        .await
    }

    async fn key_by_fingerprint(
        &self,
        id: &KeyringId,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Key>> {
        let id = id.clone();
        let fingerprint = *fingerprint;
        self.blocking(move |conn| {
            require_keyring(conn, id.as_str())?;
            load_key(conn, id.as_str(), fingerprint.as_bytes())
        })
        .await
    }

    async fn key_by_key_id(&self, id: &KeyringId, key_id: &KeyId) -> Result<Option<Key>> {
        let id = id.clone();
        let key_id = *key_id;
        self.blocking(move |conn| {
            require_keyring(conn, id.as_str())?;
            let fingerprint: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT fingerprint FROM key_ids WHERE keyring_id = ?1 AND key_id = ?2",
                    params![id.as_str(), key_id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            match fingerprint {
                Some(f) => load_key(conn, id.as_str(), &f),
                None => Ok(None),
            }
        })
        .await
    }

    async fn keys_by_address(&self, id: &KeyringId, address: &str) -> Result<Vec<Key>> {
        let id = id.clone();
        let address = address.trim().to_lowercase();
        self.blocking(move |conn| {
            require_keyring(conn, id.as_str())?;
            let mut stmt = conn.prepare(
                "SELECT k.key_blob FROM keys k
                 JOIN key_addresses a
                   ON a.keyring_id = k.keyring_id AND a.fingerprint = k.fingerprint
                 WHERE a.keyring_id = ?1 AND a.address = ?2
                 ORDER BY k.fingerprint",
            )?;
            let blobs = stmt
                .query_map(params![id.as_str(), address], |row| row.get::<_, Vec<u8>>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            blobs.iter().map(|b| decode_key(b)).collect()
        })
        .await
    }

    async fn attribute(&self, id: &KeyringId, name: &str) -> Result<Option<Vec<u8>>> {
        let id = id.clone();
        let name = name.to_string();
        self.blocking(move |conn| {
            require_keyring(conn, id.as_str())?;
            Ok(conn
                .query_row(
                    "SELECT value FROM keyring_attributes WHERE keyring_id = ?1 AND name = ?2",
                    params![id.as_str(), name],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }

    async fn set_attribute(&self, id: &KeyringId, name: &str, value: &[u8]) -> Result<()> {
        let id = id.clone();
        let name = name.to_string();
        let value = value.to_vec();
        self.blocking(move |conn| {
            require_keyring(conn, id.as_str())?;
            conn.execute(
                "INSERT INTO keyring_attributes (keyring_id, name, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(keyring_id, name) DO UPDATE SET value = excluded.value",
                params![id.as_str(), name, value],
            )?;
            Ok(())
        })
        .await
    }
}
