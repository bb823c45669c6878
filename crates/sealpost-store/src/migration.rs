//! Database schema migrations for SQLite.
//!
//! Versioned migrations: each step transforms the schema from version N to
//! N+1 and is recorded in `schema_migrations`.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Keyrings
        CREATE TABLE keyrings (
            keyring_id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL
        );

        -- Keys, stored locked as CBOR
        CREATE TABLE keys (
            keyring_id TEXT NOT NULL,
            fingerprint BLOB NOT NULL,        -- 20 bytes
            key_blob BLOB NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (keyring_id, fingerprint)
        );

        -- Packet id index (primary and sub-keys)
        CREATE TABLE key_ids (
            keyring_id TEXT NOT NULL,
            key_id BLOB NOT NULL,             -- 8 bytes
            fingerprint BLOB NOT NULL,
            PRIMARY KEY (keyring_id, key_id)
        );

        -- E-mail address index, lower-cased
        CREATE TABLE key_addresses (
            keyring_id TEXT NOT NULL,
            address TEXT NOT NULL,
            fingerprint BLOB NOT NULL,
            PRIMARY KEY (keyring_id, address, fingerprint)
        );

        -- Named per-keyring attributes (sync state, default key)
        CREATE TABLE keyring_attributes (
            keyring_id TEXT NOT NULL,
            name TEXT NOT NULL,
            value BLOB NOT NULL,
            PRIMARY KEY (keyring_id, name)
        );

        CREATE INDEX idx_key_ids_fingerprint ON key_ids(keyring_id, fingerprint);
        CREATE INDEX idx_key_addresses_fingerprint ON key_addresses(keyring_id, fingerprint);
        "#,
    )?;

    Ok(())
}

/// Current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
