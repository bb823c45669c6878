//! Unlock coordinator.
//!
//! Resolves "give me this key with packet X decrypted":
//!
//! 1. already decrypted: done
//! 2. cache hit with the unlocked packet: done
//! 3. cache hit with only the password: decrypt with it (a failure is final)
//! 4. otherwise prompt, if allowed, until the user gets it right or cancels
//!
//! A successful interactive unlock schedules a sync of the key's keyring
//! after a short delay, unless the request suppresses it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sealpost_core::{CryptoEngine, CryptoError, Key, KeyId, KeyringId};

use crate::cache::CredentialCache;
use crate::error::{Result, UnlockError};
use crate::prompt::{PromptFeedback, PromptReply, PromptRequest, PromptSurface};

/// Hook run right before a prompt opens.
pub type BeforePrompt = Box<dyn FnOnce() + Send>;

/// A request to unlock one packet of a key.
pub struct UnlockRequest {
    key: Key,
    key_id: KeyId,
    keyring_id: KeyringId,
    user_id: Option<String>,
    reason: String,
    interactive: bool,
    on_before_prompt: Option<BeforePrompt>,
    suppress_sync: bool,
}

impl UnlockRequest {
    /// Unlock `key_id` of `key`, interactively by default.
    pub fn new(key: Key, key_id: KeyId, keyring_id: KeyringId) -> Self {
        let user_id = key.primary_user_id().map(str::to_string);
        Self {
            key,
            key_id,
            keyring_id,
            user_id,
            reason: String::new(),
            interactive: true,
            on_before_prompt: None,
            suppress_sync: false,
        }
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn on_before_prompt(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_before_prompt = Some(Box::new(hook));
        self
    }

    pub fn suppress_sync(mut self, suppress: bool) -> Self {
        self.suppress_sync = suppress;
        self
    }
}

/// Ask for a sync of `keyring_id` using the freshly unlocked `key`.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub keyring_id: KeyringId,
    pub key: Key,
    pub force: bool,
}

/// Mediates between the cache, the prompt surface and the crypto engine.
pub struct UnlockCoordinator {
    engine: Arc<dyn CryptoEngine>,
    cache: CredentialCache,
    prompt: Arc<dyn PromptSurface>,
    sync_tx: Option<mpsc::UnboundedSender<SyncRequest>>,
    sync_delay: Duration,
}

impl UnlockCoordinator {
    pub fn new(
        engine: Arc<dyn CryptoEngine>,
        cache: CredentialCache,
        prompt: Arc<dyn PromptSurface>,
    ) -> Self {
        Self {
            engine,
            cache,
            prompt,
            sync_tx: None,
            sync_delay: Duration::from_millis(500),
        }
    }

    /// Emit delayed [`SyncRequest`]s on `tx` after interactive unlocks.
    pub fn with_sync_requests(
        mut self,
        tx: mpsc::UnboundedSender<SyncRequest>,
        delay: Duration,
    ) -> Self {
        self.sync_tx = Some(tx);
        self.sync_delay = delay;
        self
    }

    pub fn cache(&self) -> &CredentialCache {
        &self.cache
    }

    /// Whether `key_id` can be unlocked without asking the user.
    pub fn is_unlockable_without_prompt(&self, key: &Key, key_id: KeyId) -> bool {
        key.is_packet_decrypted(key_id)
            || self.cache.get(key.primary_key_id(), Some(key_id)).is_some()
    }

    /// Resolve the request to a copy of the key with the packet decrypted.
    pub async fn unlock(&self, mut request: UnlockRequest) -> Result<Key> {
        let primary = request.key.primary_key_id();
        let key_id = request.key_id;

        if request.key.is_packet_decrypted(key_id) {
            return Ok(request.key);
        }

        if let Some(cached) = self.cache.get(primary, Some(key_id)) {
            if let Some(key) = cached.key {
                debug!(key_id = %key_id, "unlocked key from cache");
                return Ok(key);
            }
            let unlocked = self
                .engine
                .decrypt_key_packet(&request.key, key_id, &cached.password)
                .await
                .map_err(|e| {
                    warn!(key_id = %key_id, error = %e, "cached password failed");
                    e
                })?;
            self.cache
                .set(primary, Some(key_id), &cached.password, Some(unlocked.clone()), None);
            debug!(key_id = %key_id, "unlocked with cached password");
            return Ok(unlocked);
        }

        if !request.interactive {
            return Err(UnlockError::Locked(key_id));
        }

        if let Some(hook) = request.on_before_prompt.take() {
            hook();
        }

        let mut session = self
            .prompt
            .open(PromptRequest {
                primary_key_id: primary,
                key_id,
                user_id: request.user_id.clone(),
                keyring_id: request.keyring_id.clone(),
                reason: request.reason.clone(),
                cache_enabled: self.cache.policy().enabled,
            })
            .await?;

        loop {
            let (password, remember) = match session.replies.recv().await {
                Some(PromptReply::Password { password, remember }) => (password, remember),
                Some(PromptReply::Cancel) | None => {
                    info!(key_id = %key_id, "password dialog cancelled");
                    return Err(UnlockError::PasswordDialogCancel);
                }
            };

            match self
                .engine
                .decrypt_key_packet(&request.key, key_id, &password)
                .await
            {
                Ok(unlocked) => {
                    if remember {
                        self.cache
                            .set(primary, Some(key_id), &password, Some(unlocked.clone()), None);
                    }
                    session.notify(PromptFeedback::Unlocked);
                    info!(key_id = %key_id, remember, "key unlocked");
                    if !request.suppress_sync {
                        self.schedule_sync(request.keyring_id.clone(), unlocked.clone());
                    }
                    return Ok(unlocked);
                }
                Err(CryptoError::WrongPassword) => {
                    debug!(key_id = %key_id, "wrong password");
                    session.notify(PromptFeedback::WrongPassword);
                }
                Err(e) => {
                    session.notify(PromptFeedback::Failed(e.code()));
                    return Err(e.into());
                }
            }
        }
    }

    fn schedule_sync(&self, keyring_id: KeyringId, key: Key) {
        let Some(tx) = self.sync_tx.clone() else {
            return;
        };
        let delay = self.sync_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SyncRequest {
                keyring_id,
                key,
                force: false,
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePolicy;
    use crate::prompt::{PromptHandle, PromptSession};
    use async_trait::async_trait;
    use sealpost_core::{GenerateKeyOptions, SoftEngine};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replies from a script; records every feedback and open.
    struct ScriptedPrompt {
        replies: Mutex<Vec<PromptReply>>,
        opens: AtomicUsize,
        feedback: Arc<Mutex<Vec<PromptFeedback>>>,
    }

    impl ScriptedPrompt {
        fn new(replies: Vec<PromptReply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                opens: AtomicUsize::new(0),
                feedback: Arc::new(Mutex::new(Vec::new())),
            })
        }
    }

    #[async_trait]
    impl PromptSurface for ScriptedPrompt {
        async fn open(&self, _request: PromptRequest) -> Result<PromptSession> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let (session, PromptHandle { replies, mut feedback }) = PromptSession::pair();
            for reply in self.replies.lock().unwrap().drain(..) {
                replies.send(reply).unwrap();
            }
            let log = self.feedback.clone();
            tokio::spawn(async move {
                while let Some(f) = feedback.recv().await {
                    log.lock().unwrap().push(f);
                }
            });
            Ok(session)
        }
    }

    async fn locked_key() -> Key {
        SoftEngine::new()
            .generate_key(GenerateKeyOptions {
                user_ids: vec!["Alice <alice@example.org>".into()],
                password: "secret".into(),
            })
            .await
            .unwrap()
    }

    fn coordinator(prompt: Arc<ScriptedPrompt>) -> UnlockCoordinator {
        UnlockCoordinator::new(
            Arc::new(SoftEngine::new()),
            CredentialCache::new(CachePolicy::default()),
            prompt,
        )
    }

    #[tokio::test]
    async fn test_already_decrypted_resolves_immediately() {
        let prompt = ScriptedPrompt::new(vec![]);
        let coord = coordinator(prompt.clone());
        let key = locked_key().await;
        let sub = key.subkeys[0].key_id;
        let unlocked = SoftEngine::new()
            .decrypt_key_packet(&key, sub, "secret")
            .await
            .unwrap();

        let out = coord
            .unlock(UnlockRequest::new(unlocked, sub, KeyringId::main()))
            .await
            .unwrap();
        assert!(out.is_packet_decrypted(sub));
        assert_eq!(prompt.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_prompt_then_cached_subkey_without_reprompt() {
        let prompt = ScriptedPrompt::new(vec![PromptReply::password("secret", true)]);
        let coord = coordinator(prompt.clone());
        let key = locked_key().await;
        let primary = key.primary_key_id();
        let sub = key.subkeys[0].key_id;

        let first = coord
            .unlock(UnlockRequest::new(key.clone(), primary, KeyringId::main()))
            .await
            .unwrap();
        assert!(first.is_packet_decrypted(primary));

        // second unlock needs the sub-key: the cached password is used
        let second = coord
            .unlock(UnlockRequest::new(key.clone(), sub, KeyringId::main()))
            .await
            .unwrap();
        assert!(second.is_packet_decrypted(sub));
        assert_eq!(prompt.opens.load(Ordering::SeqCst), 1);
        assert!(coord.cache().get(primary, Some(sub)).unwrap().key.is_some());
    }

    #[tokio::test]
    async fn test_wrong_password_reprompts() {
        let prompt = ScriptedPrompt::new(vec![
            PromptReply::password("wrong", false),
            PromptReply::password("secret", false),
        ]);
        let coord = coordinator(prompt.clone());
        let key = locked_key().await;
        let primary = key.primary_key_id();

        coord
            .unlock(UnlockRequest::new(key, primary, KeyringId::main()))
            .await
            .unwrap();
        tokio::task::yield_now().await;
        let feedback = prompt.feedback.lock().unwrap().clone();
        assert_eq!(
            feedback,
            vec![PromptFeedback::WrongPassword, PromptFeedback::Unlocked]
        );
        // remember was off
        assert!(coord.cache().get(primary, None).is_none());
    }

    #[tokio::test]
    async fn test_cancel_rejects_without_sync() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let prompt = ScriptedPrompt::new(vec![PromptReply::Cancel]);
        let coord = coordinator(prompt).with_sync_requests(tx, Duration::from_millis(1));
        let key = locked_key().await;
        let primary = key.primary_key_id();

        let err = coord
            .unlock(UnlockRequest::new(key, primary, KeyringId::main()))
            .await
            .unwrap_err();
        assert_eq!(err, UnlockError::PasswordDialogCancel);
        assert_eq!(err.code(), sealpost_core::ErrorCode::PwdDialogCancel);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_success_schedules_sync() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let prompt = ScriptedPrompt::new(vec![PromptReply::password("secret", false)]);
        let coord = coordinator(prompt).with_sync_requests(tx, Duration::from_millis(1));
        let key = locked_key().await;
        let primary = key.primary_key_id();

        coord
            .unlock(UnlockRequest::new(key.clone(), primary, KeyringId::main()))
            .await
            .unwrap();
        let request = rx.recv().await.unwrap();
        assert_eq!(request.keyring_id, KeyringId::main());
        assert_eq!(request.key.fingerprint, key.fingerprint);
        assert!(!request.force);
    }

    #[tokio::test]
    async fn test_suppress_sync() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let prompt = ScriptedPrompt::new(vec![PromptReply::password("secret", false)]);
        let coord = coordinator(prompt).with_sync_requests(tx, Duration::from_millis(1));
        let key = locked_key().await;
        let primary = key.primary_key_id();

        coord
            .unlock(UnlockRequest::new(key, primary, KeyringId::main()).suppress_sync(true))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_non_interactive_miss_rejects() {
        let prompt = ScriptedPrompt::new(vec![]);
        let coord = coordinator(prompt.clone());
        let key = locked_key().await;
        let primary = key.primary_key_id();

        assert!(!coord.is_unlockable_without_prompt(&key, primary));
        let err = coord
            .unlock(UnlockRequest::new(key, primary, KeyringId::main()).interactive(false))
            .await
            .unwrap_err();
        assert_eq!(err, UnlockError::Locked(primary));
        assert_eq!(prompt.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_cached_password_is_fatal() {
        let prompt = ScriptedPrompt::new(vec![PromptReply::password("secret", true)]);
        let coord = coordinator(prompt.clone());
        let key = locked_key().await;
        let primary = key.primary_key_id();
        coord.cache().set(primary, None, "stale", None, None);

        let err = coord
            .unlock(UnlockRequest::new(key, primary, KeyringId::main()))
            .await
            .unwrap_err();
        assert_eq!(err, UnlockError::Crypto(CryptoError::WrongPassword));
        assert_eq!(prompt.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_before_prompt_hook_runs() {
        let prompt = ScriptedPrompt::new(vec![PromptReply::Cancel]);
        let coord = coordinator(prompt);
        let key = locked_key().await;
        let primary = key.primary_key_id();
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();

        let _ = coord
            .unlock(
                UnlockRequest::new(key, primary, KeyringId::main()).on_before_prompt(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
