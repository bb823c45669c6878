//! # Sealpost Store
//!
//! Storage abstraction for keyrings. Provides a trait-based interface for
//! key persistence with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! A keyring is a named set of keys plus named attributes. The
//! [`KeyringStore`] trait lets the rest of Sealpost stay storage-agnostic.
//! The primary implementation is [`SqliteStore`], with [`MemoryStore`] for
//! testing.
//!
//! ## Key Types
//!
//! - [`KeyringStore`] - The async trait for all storage operations
//! - [`KeyringStoreExt`] - Typed (CBOR) attribute helpers
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`InsertResult`] - Result of inserting a key
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sealpost_core::KeyringId;
//! use sealpost_store::{KeyringStore, KeyringStoreExt, SqliteStore};
//!
//! async fn example() -> sealpost_store::Result<()> {
//!     let store = SqliteStore::open("keyrings.db")?;
//!     store.ensure_keyring(&KeyringId::main()).await?;
//!     let keys = store.keys(&KeyringId::main()).await?;
//!     println!("{} keys", keys.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Locked at rest**: decrypted secret material never reaches a store
//! - **Merging inserts**: re-inserting a fingerprint merges user ids and secrets

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{merge_keys, InsertResult, KeyringStore, KeyringStoreExt};
