//! # Sealpost Sync
//!
//! Keeps a keyring in step with a remote copy of itself.
//!
//! ## Overview
//!
//! Every local key mutation is recorded in the keyring's change log. A sync
//! cycle downloads the remote payload, merges its change log into ours
//! (later timestamps win), applies the resulting inserts and deletes, and
//! then uploads the merged state if anything changed locally.
//!
//! ## Key Properties
//!
//! - **Serialized**: cycles for one keyring never overlap
//! - **Coalescing**: triggers during a cycle collapse into one follow-up
//! - **Optimistic**: uploads carry the last seen version tag and fail if the
//!   remote moved on
//! - **Quiet**: sub-step errors are logged, never returned
//!
//! ## Usage
//!
//! ```rust,ignore
//! let keyring = Arc::new(Keyring::open_or_create(store, KeyringId::main()).await?);
//! let engine = SyncEngine::new(keyring, crypto, unlock, transport, SyncConfig::default());
//! engine.trigger(SyncOptions::default()).await;
//! ```
//!
//! ## Cycle
//!
//! ```text
//! trigger ──> take `modified`
//!               │
//!               ├── download ──> decrypt + verify ──> merge (unlogged) ──> adopt tag
//!               │
//!               ├── upload (if modified) ──> sign + encrypt ──> adopt tag
//!               │
//!               └── persist sync state ──> pending slot? run again
//! ```

pub mod changelog_store;
pub mod engine;
pub mod error;
pub mod keyring;
pub mod messages;
pub mod transport;

pub use changelog_store::{ChangeLogStore, SYNC_STATE_ATTRIBUTE};
pub use engine::{CycleReport, StepOutcome, SyncConfig, SyncEngine, SyncOptions, SyncOutcome};
pub use error::{Result, SyncError};
pub use keyring::{Keyring, DEFAULT_KEY_ATTRIBUTE};
pub use messages::{
    DownloadReply, DownloadRequest, SyncEventKind, SyncPayload, UploadReply, UploadRequest,
};
pub use transport::{memory::MemoryRemote, with_timeout, RemoteSyncTransport};
