//! Application context.
//!
//! Owns the long-lived components (credential cache, unlock coordinator,
//! keyrings and their sync engines) and hands them to controllers. The
//! context holds only a weak handle to the router; the router's factories
//! hold the context.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sealpost_core::{CryptoEngine, KeyringId};
use sealpost_store::{KeyringStore, KeyringStoreExt};
use sealpost_sync::{Keyring, RemoteSyncTransport, SyncEngine, SyncOptions, SyncOutcome};
use sealpost_unlock::{CredentialCache, SyncRequest, UnlockCoordinator};

use crate::config::{Preferences, SealpostConfig};
use crate::error::Result;
use crate::prompt::{PendingPrompts, RouterPromptSurface, SurfaceOpener};
use crate::router::WeakRouter;
use crate::transport::ChannelSyncTransport;

pub struct Context {
    config: SealpostConfig,
    crypto: Arc<dyn CryptoEngine>,
    store: Arc<dyn KeyringStore>,
    cache: CredentialCache,
    unlock: Arc<UnlockCoordinator>,
    remote: Arc<dyn RemoteSyncTransport>,
    channel_transport: Arc<ChannelSyncTransport>,
    prompts: Arc<PendingPrompts>,
    engines: Mutex<HashMap<KeyringId, Arc<SyncEngine>>>,
    router: WeakRouter,
}

impl Context {
    /// Wire the components and make sure the configured keyring exists.
    ///
    /// Without an explicit `remote`, sync goes through the `syncHandler`
    /// channel.
    pub async fn new(
        config: SealpostConfig,
        crypto: Arc<dyn CryptoEngine>,
        store: Arc<dyn KeyringStore>,
        opener: Arc<dyn SurfaceOpener>,
        remote: Option<Arc<dyn RemoteSyncTransport>>,
        router: WeakRouter,
    ) -> Result<Arc<Self>> {
        let cache = CredentialCache::new(config.cache);
        let prompts = Arc::new(PendingPrompts::new());
        let surface = Arc::new(RouterPromptSurface::new(
            router.clone(),
            prompts.clone(),
            opener,
        ));
        let (sync_tx, sync_rx) = mpsc::unbounded_channel();
        let unlock = Arc::new(
            UnlockCoordinator::new(crypto.clone(), cache.clone(), surface)
                .with_sync_requests(sync_tx, config.sync.trigger_delay),
        );
        let channel_transport = Arc::new(ChannelSyncTransport::new(router.clone()));
        let remote =
            remote.unwrap_or_else(|| channel_transport.clone() as Arc<dyn RemoteSyncTransport>);

        store.ensure_keyring(&config.keyring).await?;

        let context = Arc::new(Self {
            config,
            crypto,
            store,
            cache,
            unlock,
            remote,
            channel_transport,
            prompts,
            engines: Mutex::new(HashMap::new()),
            router,
        });
        tokio::spawn(forward_sync_requests(Arc::downgrade(&context), sync_rx));
        Ok(context)
    }

    pub fn config(&self) -> &SealpostConfig {
        &self.config
    }

    pub fn crypto(&self) -> &Arc<dyn CryptoEngine> {
        &self.crypto
    }

    pub fn store(&self) -> &Arc<dyn KeyringStore> {
        &self.store
    }

    pub fn cache(&self) -> &CredentialCache {
        &self.cache
    }

    pub fn unlock(&self) -> &Arc<UnlockCoordinator> {
        &self.unlock
    }

    pub fn prompts(&self) -> &Arc<PendingPrompts> {
        &self.prompts
    }

    pub fn channel_transport(&self) -> &Arc<ChannelSyncTransport> {
        &self.channel_transport
    }

    pub fn router(&self) -> &WeakRouter {
        &self.router
    }

    /// Apply new user preferences. Returns true if the cache was flushed.
    pub fn apply_preferences(&self, preferences: &Preferences) -> bool {
        let flushed = self.cache.apply_policy(preferences.cache_policy());
        info!(
            enabled = preferences.password_cache,
            timeout_minutes = preferences.password_timeout,
            flushed,
            "preferences applied"
        );
        flushed
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Keyrings
    // ─────────────────────────────────────────────────────────────────────────

    fn engines(&self) -> MutexGuard<'_, HashMap<KeyringId, Arc<SyncEngine>>> {
        self.engines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn adopt(&self, keyring: Keyring) -> Arc<SyncEngine> {
        let id = keyring.id().clone();
        let engine = Arc::new(SyncEngine::new(
            Arc::new(keyring),
            self.crypto.clone(),
            self.unlock.clone(),
            self.remote.clone(),
            self.config.sync.clone(),
        ));
        self.engines().entry(id).or_insert(engine).clone()
    }

    /// The sync engine of keyring `id`, opening the keyring on first use.
    pub async fn sync_engine(&self, id: &KeyringId) -> Result<Arc<SyncEngine>> {
        if let Some(engine) = self.engines().get(id) {
            return Ok(engine.clone());
        }
        let keyring = Keyring::open(self.store.clone(), id.clone()).await?;
        debug!(keyring = %id, "keyring opened");
        Ok(self.adopt(keyring))
    }

    pub async fn keyring(&self, id: &KeyringId) -> Result<Arc<Keyring>> {
        Ok(self.sync_engine(id).await?.keyring().clone())
    }

    /// The keyring the dialogs work on.
    pub async fn default_keyring(&self) -> Result<Arc<Keyring>> {
        self.keyring(&self.config.keyring).await
    }

    /// Create keyring `id`. Fails if it exists.
    pub async fn create_keyring(&self, id: &KeyringId) -> Result<Arc<Keyring>> {
        let keyring = Keyring::create(self.store.clone(), id.clone()).await?;
        Ok(self.adopt(keyring).keyring().clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync
    // ─────────────────────────────────────────────────────────────────────────

    /// Trigger a sync of keyring `id` and wait for it.
    pub async fn trigger_sync(&self, id: &KeyringId, options: SyncOptions) -> Result<SyncOutcome> {
        let engine = self.sync_engine(id).await?;
        Ok(engine.trigger(options).await)
    }

    /// Trigger a sync of keyring `id` in the background.
    pub fn request_sync(self: &Arc<Self>, id: KeyringId, options: SyncOptions) {
        let context = self.clone();
        tokio::spawn(async move {
            if let Err(e) = context.trigger_sync(&id, options).await {
                warn!(keyring = %id, error = %e, "sync request failed");
            }
        });
    }
}

async fn forward_sync_requests(
    context: Weak<Context>,
    mut requests: mpsc::UnboundedReceiver<SyncRequest>,
) {
    while let Some(request) = requests.recv().await {
        let Some(context) = context.upgrade() else {
            break;
        };
        debug!(keyring = %request.keyring_id, "sync requested after unlock");
        context.request_sync(
            request.keyring_id,
            SyncOptions::with_key(request.key, request.force),
        );
    }
}
