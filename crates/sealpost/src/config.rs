//! Configuration.
//!
//! [`SealpostConfig`] is fixed at startup. [`Preferences`] is the part the
//! user can change at runtime; it arrives as JSON from the options page and
//! is applied to the running context.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use sealpost_core::KeyringId;
use sealpost_sync::SyncConfig;
use sealpost_unlock::CachePolicy;

use crate::error::Result;

/// Configuration for a Sealpost instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealpostConfig {
    /// Password cache policy.
    pub cache: CachePolicy,
    /// Sync timing.
    pub sync: SyncConfig,
    /// Keyring used by the dialogs.
    pub keyring: KeyringId,
}

impl Default for SealpostConfig {
    fn default() -> Self {
        Self {
            cache: CachePolicy::default(),
            sync: SyncConfig::default(),
            keyring: KeyringId::main(),
        }
    }
}

impl SealpostConfig {
    /// Take the cache policy from `preferences`.
    pub fn with_preferences(mut self, preferences: &Preferences) -> Self {
        self.cache = preferences.cache_policy();
        self
    }
}

/// Longest password timeout honoured, in minutes (one week).
pub const MAX_PASSWORD_TIMEOUT: u64 = 7 * 24 * 60;

/// User preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    /// Remember passwords after a successful unlock.
    pub password_cache: bool,
    /// Minutes a remembered password is kept. Capped at
    /// [`MAX_PASSWORD_TIMEOUT`].
    pub password_timeout: u64,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            password_cache: true,
            password_timeout: 30,
        }
    }
}

impl Preferences {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            enabled: self.password_cache,
            ttl: Duration::from_secs(self.password_timeout.min(MAX_PASSWORD_TIMEOUT) * 60),
        }
    }
}
