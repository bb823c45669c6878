//! # Sealpost Core
//!
//! Primitives shared by every Sealpost crate: identifiers, channel names,
//! the key model, the crypto engine seam and the change-log data model.
//!
//! This crate performs no I/O. Storage, unlocking, sync and routing build on
//! top of it.
//!
//! ## Key Types
//!
//! - [`Key`] - A primary packet, sub-key packets and user ids
//! - [`KeyId`] / [`Fingerprint`] - Packet and key identifiers
//! - [`ChannelName`] - `"<type>-<id>"` channel addressing
//! - [`CryptoEngine`] - The engine trait, with [`SoftEngine`] as implementation
//! - [`ChangeLog`] / [`SyncState`] - Per-keyring mutation log
//!
//! ## Errors
//!
//! Every error maps to an [`ErrorCode`], the stable code surfaces display.

pub mod armor;
pub mod changelog;
pub mod channel;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod key;
pub mod soft;
pub mod types;

pub use changelog::{ChangeLog, ChangeLogEntry, MutationKind, SyncState};
pub use channel::{new_instance_id, ChannelName};
pub use engine::{CryptoEngine, DecryptedMessage, GenerateKeyOptions, Message};
pub use error::{CoreError, CryptoError, CryptoResult, ErrorCode, Result};
pub use key::{Algorithm, Key, KeyPacket, SecretPacket};
pub use soft::SoftEngine;
pub use types::{Fingerprint, KeyId, KeyringId};
