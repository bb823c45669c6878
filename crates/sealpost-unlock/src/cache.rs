//! Credential cache: passwords and unlocked keys under a TTL.
//!
//! Entries are keyed by primary key id. An entry holds the password that
//! opened the key and every sub-key unlocked with it so far. Each entry has
//! one eviction timer, armed when the entry is created; adding sub-keys to an
//! existing entry never re-arms it.
//!
//! [`CredentialCache::apply_policy`] is the single place that flushes the
//! cache: a change of the enabled flag or of the TTL cancels every timer and
//! drops every entry before the new policy takes effect.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use zeroize::Zeroizing;

use sealpost_core::{Key, KeyId};

/// Cache policy: whether passwords are cached at all, and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    pub enabled: bool,
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// Deadline used when `now + ttl` does not fit in an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// A cache hit.
#[derive(Clone)]
pub struct CachedCredentials {
    pub password: Zeroizing<String>,
    /// The unlocked key, when the requested sub-key was cached too.
    pub key: Option<Key>,
}

impl std::fmt::Debug for CachedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedCredentials")
            .field("key", &self.key.as_ref().map(Key::fingerprint))
            .finish_non_exhaustive()
    }
}

struct Entry {
    password: Zeroizing<String>,
    keys: HashMap<KeyId, Key>,
    deadline: Instant,
    generation: u64,
    timer: JoinHandle<()>,
}

struct Inner {
    policy: CachePolicy,
    entries: HashMap<KeyId, Entry>,
    next_generation: u64,
}

/// Password / unlocked-key cache. Cheap to clone; clones share state.
///
/// Must be used from within a tokio runtime: creating an entry spawns its
/// eviction timer.
#[derive(Clone)]
pub struct CredentialCache {
    inner: Arc<Mutex<Inner>>,
}

impl CredentialCache {
    /// Create an empty cache with the given policy.
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                policy,
                entries: HashMap::new(),
                next_generation: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The current policy.
    pub fn policy(&self) -> CachePolicy {
        self.lock().policy
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up the password for `primary`, plus the unlocked key for
    /// `sub_key` if that packet has been cached.
    pub fn get(&self, primary: KeyId, sub_key: Option<KeyId>) -> Option<CachedCredentials> {
        let inner = self.lock();
        let entry = inner.entries.get(&primary)?;
        if Instant::now() >= entry.deadline {
            return None;
        }
        Some(CachedCredentials {
            password: entry.password.clone(),
            key: sub_key.and_then(|id| entry.keys.get(&id).cloned()),
        })
    }

    /// Create or augment the entry for `primary`.
    ///
    /// A new entry is armed with `ttl_override` or the policy TTL. An existing
    /// entry only gains the sub-key; its timer keeps running. While caching is
    /// disabled nothing is stored unless `ttl_override` is given.
    ///
    /// Returns whether anything was stored.
    pub fn set(
        &self,
        primary: KeyId,
        sub_key: Option<KeyId>,
        password: &str,
        key: Option<Key>,
        ttl_override: Option<Duration>,
    ) -> bool {
        let mut inner = self.lock();
        if !inner.policy.enabled && ttl_override.is_none() {
            return false;
        }

        let now = Instant::now();
        if let Some(entry) = inner.entries.get_mut(&primary) {
            if now < entry.deadline {
                if let (Some(id), Some(key)) = (sub_key, key) {
                    entry.keys.insert(id, key);
                    debug!(primary = %primary, sub_key = %id, "cache entry refreshed");
                }
                return true;
            }
        }

        // new entry, or a stale one whose timer has not run yet
        if let Some(stale) = inner.entries.remove(&primary) {
            stale.timer.abort();
        }

        let ttl = ttl_override.unwrap_or(inner.policy.ttl);
        let deadline = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let generation = inner.next_generation;
        inner.next_generation += 1;

        let mut keys = HashMap::new();
        if let (Some(id), Some(key)) = (sub_key, key) {
            keys.insert(id, key);
        }
        let timer = spawn_eviction(Arc::downgrade(&self.inner), primary, generation, deadline);
        inner.entries.insert(
            primary,
            Entry {
                password: Zeroizing::new(password.to_string()),
                keys,
                deadline,
                generation,
                timer,
            },
        );
        debug!(primary = %primary, ttl_secs = ttl.as_secs(), "cache entry created");
        true
    }

    /// Remove the entry for `primary`. Returns whether one existed.
    pub fn evict(&self, primary: KeyId) -> bool {
        match self.lock().entries.remove(&primary) {
            Some(entry) => {
                entry.timer.abort();
                debug!(primary = %primary, "cache entry evicted");
                true
            }
            None => false,
        }
    }

    /// Record a new policy. If the enabled flag or TTL changed, every timer
    /// is cancelled and every entry dropped first. Returns whether the cache
    /// was flushed.
    pub fn apply_policy(&self, policy: CachePolicy) -> bool {
        let mut inner = self.lock();
        if inner.policy == policy {
            return false;
        }
        let flushed = inner.entries.len();
        for (_, entry) in inner.entries.drain() {
            entry.timer.abort();
        }
        inner.policy = policy;
        info!(
            enabled = policy.enabled,
            ttl_secs = policy.ttl.as_secs(),
            flushed,
            "cache policy changed"
        );
        true
    }
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}

fn spawn_eviction(
    inner: Weak<Mutex<Inner>>,
    primary: KeyId,
    generation: u64,
    deadline: Instant,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner
            .entries
            .get(&primary)
            .is_some_and(|e| e.generation == generation)
        {
            inner.entries.remove(&primary);
            debug!(primary = %primary, "cache entry expired");
        }
    })
}
