//! # Sealpost Unlock
//!
//! Password caching and unlock coordination.
//!
//! ## Overview
//!
//! Private keys are stored locked. Before a key can decrypt or sign, the
//! packet in question has to be opened with the user's password. This crate
//! decides where that password comes from:
//!
//! - [`CredentialCache`] keeps passwords and unlocked keys under a TTL and
//!   flushes itself when the cache policy changes
//! - [`UnlockCoordinator`] checks the cache, then falls back to a
//!   [`PromptSurface`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! let coordinator = UnlockCoordinator::new(engine, CredentialCache::default(), prompt);
//! let key = coordinator
//!     .unlock(UnlockRequest::new(key, key_id, keyring_id).reason("decrypt"))
//!     .await?;
//! ```

pub mod cache;
pub mod coordinator;
pub mod error;
pub mod prompt;

pub use cache::{CachePolicy, CachedCredentials, CredentialCache};
pub use coordinator::{BeforePrompt, SyncRequest, UnlockCoordinator, UnlockRequest};
pub use error::{Result, UnlockError};
pub use prompt::{
    PromptFeedback, PromptHandle, PromptReply, PromptRequest, PromptSession, PromptSurface,
};
