//! Per-keyring sync engine.
//!
//! A cycle downloads the remote payload, merges it into the keyring and then
//! uploads local changes if there are any. Cycles for one keyring never
//! overlap: a trigger that arrives while a cycle runs parks its options in a
//! single pending slot (the latest trigger wins) and the running cycle picks
//! them up when it is done.
//!
//! Sub-step failures are logged and recorded in the [`CycleReport`]; they
//! never propagate to the caller of [`SyncEngine::trigger`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use sealpost_core::{CryptoEngine, Key, MutationKind};
use sealpost_unlock::{UnlockCoordinator, UnlockRequest};

use crate::error::{Result, SyncError};
use crate::keyring::Keyring;
use crate::messages::{DownloadRequest, SyncPayload, UploadRequest};
use crate::transport::{with_timeout, RemoteSyncTransport};

/// Timing knobs for sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Upper bound for a single transport round trip.
    pub request_timeout: Duration,
    /// Delay between an interactive unlock and the sync it schedules.
    pub trigger_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            trigger_delay: Duration::from_millis(500),
        }
    }
}

/// Options of one trigger.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Key to sync with. Defaults to the keyring's default private key.
    pub key: Option<Key>,
    /// Allow prompting and accept payloads signed by other keys.
    pub force: bool,
}

impl SyncOptions {
    pub fn forced() -> Self {
        Self {
            key: None,
            force: true,
        }
    }

    pub fn with_key(key: Key, force: bool) -> Self {
        Self {
            key: Some(key),
            force,
        }
    }
}

/// How a download or upload sub-step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing to do (remote unchanged, or no local changes).
    NotNeeded,
    Applied,
    /// Payload signed by a key we may not verify without prompting.
    Abandoned,
    /// Key could not be unlocked without prompting.
    Skipped,
    Failed(String),
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub force: bool,
    /// No private key to sync with.
    pub skipped: bool,
    pub download: StepOutcome,
    pub upload: StepOutcome,
}

impl CycleReport {
    fn skipped(force: bool) -> Self {
        Self {
            force,
            skipped: true,
            download: StepOutcome::NotNeeded,
            upload: StepOutcome::NotNeeded,
        }
    }
}

/// Result of [`SyncEngine::trigger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A cycle was already running; the options wait in the pending slot.
    Coalesced,
    /// Cycles run by this call, the first one for its own options.
    Completed(Vec<CycleReport>),
}

#[derive(Default)]
struct Slot {
    running: bool,
    pending: Option<SyncOptions>,
}

/// Resets the slot if the triggering future is dropped mid-cycle.
struct RunningGuard<'a> {
    slot: &'a Mutex<Slot>,
    armed: bool,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            slot.running = false;
            slot.pending = None;
        }
    }
}

pub struct SyncEngine {
    keyring: Arc<Keyring>,
    crypto: Arc<dyn CryptoEngine>,
    unlock: Arc<UnlockCoordinator>,
    transport: Arc<dyn RemoteSyncTransport>,
    config: SyncConfig,
    slot: Mutex<Slot>,
}

impl SyncEngine {
    pub fn new(
        keyring: Arc<Keyring>,
        crypto: Arc<dyn CryptoEngine>,
        unlock: Arc<UnlockCoordinator>,
        transport: Arc<dyn RemoteSyncTransport>,
        config: SyncConfig,
    ) -> Self {
        Self {
            keyring,
            crypto,
            unlock,
            transport,
            config,
            slot: Mutex::new(Slot::default()),
        }
    }

    pub fn keyring(&self) -> &Arc<Keyring> {
        &self.keyring
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a cycle is in progress.
    pub fn is_running(&self) -> bool {
        self.slot().running
    }

    /// Run a sync cycle, or park `options` if one is already running.
    pub async fn trigger(&self, options: SyncOptions) -> SyncOutcome {
        {
            let mut slot = self.slot();
            if slot.running {
                debug!(keyring = %self.keyring.id(), force = options.force, "sync coalesced");
                slot.pending = Some(options);
                return SyncOutcome::Coalesced;
            }
            slot.running = true;
        }
        let mut guard = RunningGuard {
            slot: &self.slot,
            armed: true,
        };

        let mut reports = Vec::new();
        let mut next = Some(options);
        while let Some(options) = next {
            reports.push(self.run_cycle(options).await);
            let mut slot = self.slot();
            next = slot.pending.take();
            if next.is_none() {
                slot.running = false;
                guard.armed = false;
            }
        }
        SyncOutcome::Completed(reports)
    }

    async fn run_cycle(&self, options: SyncOptions) -> CycleReport {
        let log = self.keyring.change_log();
        let modified = log.take_modified();
        let force = options.force;
        info!(keyring = %self.keyring.id(), force, modified, "sync cycle started");

        let key = match options.key {
            Some(key) => Some(key),
            None => self.keyring.default_key().await.unwrap_or_else(|e| {
                warn!(keyring = %self.keyring.id(), error = %e, "default key lookup failed");
                None
            }),
        };

        let report = match key {
            None => {
                debug!(keyring = %self.keyring.id(), "no private key, sync skipped");
                if modified {
                    log.mark_modified();
                }
                CycleReport::skipped(force)
            }
            Some(key) => {
                let download = self.settle("download", self.download(&key, force).await);
                let upload = if modified {
                    let upload = self.settle("upload", self.upload(&key, force).await);
                    if upload != StepOutcome::Applied {
                        log.mark_modified();
                    }
                    upload
                } else {
                    StepOutcome::NotNeeded
                };
                CycleReport {
                    force,
                    skipped: false,
                    download,
                    upload,
                }
            }
        };

        if let Err(e) = log.persist().await {
            warn!(keyring = %self.keyring.id(), error = %e, "failed to persist sync state");
        }
        info!(
            keyring = %self.keyring.id(),
            download = ?report.download,
            upload = ?report.upload,
            "sync cycle finished"
        );
        report
    }

    fn settle(&self, step: &str, result: Result<StepOutcome>) -> StepOutcome {
        result.unwrap_or_else(|e| {
            warn!(keyring = %self.keyring.id(), step, code = %e.code(), error = %e, "sync step failed");
            StepOutcome::Failed(e.to_string())
        })
    }

    async fn download(&self, key: &Key, force: bool) -> Result<StepOutcome> {
        let log = self.keyring.change_log();
        let local = log.remote_version();
        let reply = with_timeout(
            self.config.request_timeout,
            self.transport.download(DownloadRequest {
                version: local.clone(),
            }),
        )
        .await?;
        let armored = match reply.payload {
            Some(payload) if reply.version != local => payload,
            _ => return Ok(StepOutcome::NotNeeded),
        };

        let message = self.crypto.read_message(&armored).await?;
        let packet = key
            .encryption_packet()
            .ok_or_else(|| SyncError::NoKey(key.fingerprint.to_hex()))?
            .key_id;
        if !force && !self.unlock.is_unlockable_without_prompt(key, packet) {
            debug!(keyring = %self.keyring.id(), "sync key locked, download skipped");
            return Ok(StepOutcome::Skipped);
        }
        let unlocked = self
            .unlock
            .unlock(
                UnlockRequest::new(key.clone(), packet, self.keyring.id().clone())
                    .reason("sync")
                    .interactive(force)
                    .suppress_sync(true),
            )
            .await?;

        let mut decrypted = self
            .crypto
            .decrypt_message(&message, &unlocked, &[key.to_public()])
            .await?;
        if !decrypted.verified {
            let signer = decrypted
                .signer
                .ok_or_else(|| SyncError::InvalidPayload("payload is not signed".into()))?;
            let signer_key = self
                .keyring
                .key_by_key_id(&signer)
                .await?
                .ok_or(SyncError::UntrustedSigner(signer))?;
            let trusted = force
                || self
                    .unlock
                    .is_unlockable_without_prompt(&signer_key, signer_key.primary_key_id());
            if !trusted {
                info!(keyring = %self.keyring.id(), signer = %signer, "payload signed by another key, download abandoned");
                return Ok(StepOutcome::Abandoned);
            }
            decrypted = self
                .crypto
                .decrypt_message(&message, &unlocked, &[signer_key.to_public()])
                .await?;
            if !decrypted.verified {
                return Err(SyncError::UntrustedSigner(signer));
            }
        }

        let payload = SyncPayload::from_bytes(&decrypted.data)?;
        self.apply(&payload).await?;

        log.set_remote_version(reply.version);
        Ok(StepOutcome::Applied)
    }

    /// Merge the remote log and replay it on the keyring. The writes go
    /// around the change log; local mutations made meanwhile are still
    /// recorded.
    async fn apply(&self, payload: &SyncPayload) -> Result<()> {
        let log = self.keyring.change_log();
        log.merge(&payload.change_log);
        let merged = log.change_log();

        let mut imported = 0usize;
        for key in &payload.keys {
            let inserted = merged
                .get(&key.fingerprint)
                .is_some_and(|entry| entry.kind == MutationKind::Insert);
            if inserted {
                self.keyring.apply_remote_key(key).await?;
                imported += 1;
            }
        }
        let mut removed = 0usize;
        for fingerprint in log.deleted_fingerprints() {
            if self.keyring.apply_remote_delete(&fingerprint).await? {
                removed += 1;
            }
        }
        debug!(keyring = %self.keyring.id(), imported, removed, "remote changes applied");
        Ok(())
    }

    async fn upload(&self, key: &Key, force: bool) -> Result<StepOutcome> {
        let primary = key.primary_key_id();
        if !force && !self.unlock.is_unlockable_without_prompt(key, primary) {
            debug!(keyring = %self.keyring.id(), "signing key locked, upload skipped");
            return Ok(StepOutcome::Skipped);
        }
        let signing = self
            .unlock
            .unlock(
                UnlockRequest::new(key.clone(), primary, self.keyring.id().clone())
                    .reason("sync")
                    .interactive(force)
                    .suppress_sync(true),
            )
            .await?;

        let log = self.keyring.change_log();
        let payload = SyncPayload {
            change_log: log.change_log(),
            keys: self
                .keyring
                .keys()
                .await?
                .iter()
                .map(Key::to_public)
                .collect(),
        };
        let armored = self
            .crypto
            .encrypt_message(&payload.to_bytes()?, &[key.to_public()], Some(&signing))
            .await?;

        let reply = with_timeout(
            self.config.request_timeout,
            self.transport.upload(UploadRequest {
                version: log.remote_version(),
                payload: armored,
            }),
        )
        .await?;
        log.set_remote_version(Some(reply.version));
        Ok(StepOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryRemote;
    use async_trait::async_trait;
    use sealpost_core::{ChangeLog, Fingerprint, GenerateKeyOptions, KeyId, KeyringId, SoftEngine};
    use sealpost_store::{InsertResult, KeyringStore, MemoryStore};
    use tokio::sync::Notify;
    use sealpost_unlock::{
        CachePolicy, CredentialCache, PromptRequest, PromptSession, PromptSurface, UnlockError,
    };

    struct NoPrompt;

    #[async_trait]
    impl PromptSurface for NoPrompt {
        async fn open(&self, _request: PromptRequest) -> sealpost_unlock::Result<PromptSession> {
            Err(UnlockError::PromptUnavailable("no surface in tests".into()))
        }
    }

    async fn generate(name: &str) -> Key {
        SoftEngine::new()
            .generate_key(GenerateKeyOptions {
                user_ids: vec![format!("{name} <{name}@example.org>")],
                password: "pw".into(),
            })
            .await
            .unwrap()
    }

    struct Device {
        engine: Arc<SyncEngine>,
        keyring: Arc<Keyring>,
        cache: CredentialCache,
    }

    async fn device(remote: Arc<MemoryRemote>, keys: &[Key], config: SyncConfig) -> Device {
        device_on(Arc::new(MemoryStore::new()), remote, keys, config).await
    }

    async fn device_on(
        store: Arc<dyn KeyringStore>,
        remote: Arc<MemoryRemote>,
        keys: &[Key],
        config: SyncConfig,
    ) -> Device {
        let keyring = Arc::new(
            Keyring::open_or_create(store, KeyringId::main())
                .await
                .unwrap(),
        );
        for key in keys {
            keyring.import_key(key).await.unwrap();
        }
        let crypto: Arc<dyn CryptoEngine> = Arc::new(SoftEngine::new());
        let cache = CredentialCache::new(CachePolicy::default());
        let unlock = Arc::new(UnlockCoordinator::new(
            crypto.clone(),
            cache.clone(),
            Arc::new(NoPrompt),
        ));
        let engine = Arc::new(SyncEngine::new(
            keyring.clone(),
            crypto,
            unlock,
            remote,
            config,
        ));
        Device {
            engine,
            keyring,
            cache,
        }
    }

    fn remember(cache: &CredentialCache, key: &Key) {
        cache.set(key.primary_key_id(), None, "pw", None, None);
    }

    fn single(outcome: SyncOutcome) -> CycleReport {
        match outcome {
            SyncOutcome::Completed(mut reports) => {
                assert_eq!(reports.len(), 1);
                reports.remove(0)
            }
            SyncOutcome::Coalesced => panic!("unexpected coalesce"),
        }
    }

    #[tokio::test]
    async fn test_first_sync_uploads() {
        let remote = Arc::new(MemoryRemote::new());
        let alice = generate("alice").await;
        let dev = device(remote.clone(), &[alice.clone()], SyncConfig::default()).await;
        remember(&dev.cache, &alice);

        let report = single(dev.engine.trigger(SyncOptions::default()).await);
        assert_eq!(report.download, StepOutcome::NotNeeded);
        assert_eq!(report.upload, StepOutcome::Applied);
        assert_eq!(remote.version().as_deref(), Some("v1"));
        assert_eq!(
            dev.keyring.change_log().remote_version().as_deref(),
            Some("v1")
        );
        assert!(!dev.keyring.change_log().is_modified());

        // nothing changed since
        let again = single(dev.engine.trigger(SyncOptions::default()).await);
        assert_eq!(again.download, StepOutcome::NotNeeded);
        assert_eq!(again.upload, StepOutcome::NotNeeded);
        assert_eq!(remote.upload_count(), 1);
    }

    #[tokio::test]
    async fn test_second_device_converges() {
        let remote = Arc::new(MemoryRemote::new());
        let alice = generate("alice").await;
        let bob = generate("bob").await.to_public();
        let carol = generate("carol").await.to_public();

        let a = device(
            remote.clone(),
            &[alice.clone(), bob.clone(), carol.clone()],
            SyncConfig::default(),
        )
        .await;
        remember(&a.cache, &alice);
        single(a.engine.trigger(SyncOptions::default()).await);

        let b = device(remote.clone(), &[alice.clone()], SyncConfig::default()).await;
        remember(&b.cache, &alice);
        b.keyring.change_log().take_modified();
        let report = single(b.engine.trigger(SyncOptions::default()).await);
        assert_eq!(report.download, StepOutcome::Applied);
        assert!(b.keyring.key_by_fingerprint(&bob.fingerprint).await.unwrap().is_some());
        // remote imports are not local changes
        assert!(!b.keyring.change_log().is_modified());
        assert_eq!(b.keyring.change_log().remote_version(), remote.version());

        assert_eq!(remote.download_count(), 2);
    }

    #[tokio::test]
    async fn test_remote_delete_removes_key() {
        let remote = Arc::new(MemoryRemote::new());
        let alice = generate("alice").await;
        let carol = generate("carol").await.to_public();
        let dev = device(
            remote.clone(),
            &[alice.clone(), carol.clone()],
            SyncConfig::default(),
        )
        .await;
        remember(&dev.cache, &alice);
        dev.keyring.change_log().take_modified();

        let mut log = ChangeLog::new();
        log.record(carol.fingerprint, MutationKind::Delete, u64::MAX);
        remote.overwrite(payload(&alice, &alice, log, vec![]).await);

        let report = single(dev.engine.trigger(SyncOptions::default()).await);
        assert_eq!(report.download, StepOutcome::Applied);
        assert!(dev
            .keyring
            .key_by_fingerprint(&carol.fingerprint)
            .await
            .unwrap()
            .is_none());
        assert!(!dev.keyring.change_log().is_modified());
        // the secret of the local key is untouched
        let local = dev
            .keyring
            .key_by_fingerprint(&alice.fingerprint)
            .await
            .unwrap()
            .unwrap();
        assert!(local.is_private());
    }

    #[tokio::test]
    async fn test_locked_key_skips_upload_and_keeps_modified() {
        let remote = Arc::new(MemoryRemote::new());
        let alice = generate("alice").await;
        let dev = device(remote.clone(), &[alice], SyncConfig::default()).await;

        let report = single(dev.engine.trigger(SyncOptions::default()).await);
        assert_eq!(report.upload, StepOutcome::Skipped);
        assert!(dev.keyring.change_log().is_modified());
        assert_eq!(remote.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_forced_upload_without_surface_fails() {
        let remote = Arc::new(MemoryRemote::new());
        let alice = generate("alice").await;
        let dev = device(remote.clone(), &[alice], SyncConfig::default()).await;

        let report = single(dev.engine.trigger(SyncOptions::forced()).await);
        assert!(matches!(report.upload, StepOutcome::Failed(_)));
        assert!(dev.keyring.change_log().is_modified());
    }

    #[tokio::test]
    async fn test_stale_version_conflict_keeps_modified() {
        let remote = Arc::new(MemoryRemote::new());
        let alice = generate("alice").await;
        let dev = device(remote.clone(), &[alice.clone()], SyncConfig::default()).await;
        remember(&dev.cache, &alice);
        remote.overwrite("not a sealpost message".into());

        let report = single(dev.engine.trigger(SyncOptions::default()).await);
        assert!(matches!(report.download, StepOutcome::Failed(_)));
        assert!(matches!(report.upload, StepOutcome::Failed(_)));
        assert!(dev.keyring.change_log().is_modified());
        assert_eq!(dev.keyring.change_log().remote_version(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_failed_step() {
        let remote = Arc::new(MemoryRemote::new());
        remote.set_latency(Some(Duration::from_secs(60)));
        let alice = generate("alice").await;
        let dev = device(remote.clone(), &[alice.clone()], SyncConfig::default()).await;
        remember(&dev.cache, &alice);

        let report = single(dev.engine.trigger(SyncOptions::default()).await);
        assert!(matches!(report.download, StepOutcome::Failed(_)));
        assert!(matches!(report.upload, StepOutcome::Failed(_)));
        assert!(dev.keyring.change_log().is_modified());
        assert!(!dev.engine.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalesced_triggers_run_once_with_last_options() {
        let remote = Arc::new(MemoryRemote::new());
        remote.set_latency(Some(Duration::from_secs(1)));
        let alice = generate("alice").await;
        let dev = device(remote.clone(), &[alice.clone()], SyncConfig::default()).await;
        remember(&dev.cache, &alice);

        let engine = dev.engine.clone();
        let first = tokio::spawn(async move { engine.trigger(SyncOptions::default()).await });
        while !dev.engine.is_running() {
            tokio::task::yield_now().await;
        }

        for force in [false, true, false, true] {
            let outcome = dev
                .engine
                .trigger(SyncOptions {
                    key: None,
                    force,
                })
                .await;
            assert_eq!(outcome, SyncOutcome::Coalesced);
        }

        let SyncOutcome::Completed(reports) = first.await.unwrap() else {
            panic!("first trigger must run the cycles");
        };
        assert_eq!(reports.len(), 2);
        assert!(!reports[0].force);
        assert!(reports[1].force);
        assert!(!dev.engine.is_running());
    }

    #[tokio::test]
    async fn test_no_private_key_skips_cycle() {
        let remote = Arc::new(MemoryRemote::new());
        let bob = generate("bob").await.to_public();
        let dev = device(remote.clone(), &[bob], SyncConfig::default()).await;

        let report = single(dev.engine.trigger(SyncOptions::default()).await);
        assert!(report.skipped);
        assert!(dev.keyring.change_log().is_modified());
        assert_eq!(remote.download_count(), 0);
    }

    async fn payload(recipient: &Key, signer: &Key, log: ChangeLog, keys: Vec<Key>) -> String {
        let engine = SoftEngine::new();
        let signing = engine
            .decrypt_key_packet(signer, signer.primary_key_id(), "pw")
            .await
            .unwrap();
        let payload = SyncPayload {
            change_log: log,
            keys,
        };
        engine
            .encrypt_message(
                &payload.to_bytes().unwrap(),
                &[recipient.to_public()],
                Some(&signing),
            )
            .await
            .unwrap()
    }

    async fn foreign_payload(alice: &Key, bob: &Key, carol: &Key) -> String {
        let mut log = ChangeLog::new();
        log.record(carol.fingerprint, MutationKind::Insert, 100);
        payload(alice, bob, log, vec![carol.to_public()]).await
    }

    #[tokio::test]
    async fn test_foreign_signed_payload_needs_force() {
        let remote = Arc::new(MemoryRemote::new());
        let alice = generate("alice").await;
        let bob = generate("bob").await;
        let carol = generate("carol").await;
        remote.overwrite(foreign_payload(&alice, &bob, &carol).await);

        let dev = device(
            remote.clone(),
            &[alice.clone(), bob.to_public()],
            SyncConfig::default(),
        )
        .await;
        remember(&dev.cache, &alice);
        dev.keyring.change_log().take_modified();

        let report = single(dev.engine.trigger(SyncOptions::default()).await);
        assert_eq!(report.download, StepOutcome::Abandoned);
        assert!(dev
            .keyring
            .key_by_fingerprint(&carol.fingerprint)
            .await
            .unwrap()
            .is_none());

        let report = single(dev.engine.trigger(SyncOptions::forced()).await);
        assert_eq!(report.download, StepOutcome::Applied);
        assert!(dev
            .keyring
            .key_by_fingerprint(&carol.fingerprint)
            .await
            .unwrap()
            .is_some());
    }

    /// Memory store that parks the insert of one fingerprint until released.
    struct GatedStore {
        inner: MemoryStore,
        gate: Fingerprint,
        reached: Notify,
        release: Notify,
    }

    #[async_trait]
    impl KeyringStore for GatedStore {
        async fn create_keyring(&self, id: &KeyringId) -> sealpost_store::Result<()> {
            self.inner.create_keyring(id).await
        }

        async fn delete_keyring(&self, id: &KeyringId) -> sealpost_store::Result<()> {
            self.inner.delete_keyring(id).await
        }

        async fn has_keyring(&self, id: &KeyringId) -> sealpost_store::Result<bool> {
            self.inner.has_keyring(id).await
        }

        async fn list_keyrings(&self) -> sealpost_store::Result<Vec<KeyringId>> {
            self.inner.list_keyrings().await
        }

        async fn insert_key(
            &self,
            id: &KeyringId,
            key: &Key,
        ) -> sealpost_store::Result<InsertResult> {
            if key.fingerprint == self.gate {
                self.reached.notify_one();
                self.release.notified().await;
            }
            self.inner.insert_key(id, key).await
        }

        async fn remove_key(
            &self,
            id: &KeyringId,
            fingerprint: &Fingerprint,
        ) -> sealpost_store::Result<bool> {
            self.inner.remove_key(id, fingerprint).await
        }

        async fn keys(&self, id: &KeyringId) -> sealpost_store::Result<Vec<Key>> {
            self.inner.keys(id).await
        }

        async fn key_by_fingerprint(
            &self,
            id: &KeyringId,
            fingerprint: &Fingerprint,
        ) -> sealpost_store::Result<Option<Key>> {
            self.inner.key_by_fingerprint(id, fingerprint).await
        }

        async fn key_by_key_id(
            &self,
            id: &KeyringId,
            key_id: &KeyId,
        ) -> sealpost_store::Result<Option<Key>> {
            self.inner.key_by_key_id(id, key_id).await
        }

        async fn keys_by_address(
            &self,
            id: &KeyringId,
            address: &str,
        ) -> sealpost_store::Result<Vec<Key>> {
            self.inner.keys_by_address(id, address).await
        }

        async fn attribute(
            &self,
            id: &KeyringId,
            name: &str,
        ) -> sealpost_store::Result<Option<Vec<u8>>> {
            self.inner.attribute(id, name).await
        }

        async fn set_attribute(
            &self,
            id: &KeyringId,
            name: &str,
            value: &[u8],
        ) -> sealpost_store::Result<()> {
            self.inner.set_attribute(id, name, value).await
        }
    }

    #[tokio::test]
    async fn test_local_import_during_merge_is_recorded() {
        let remote = Arc::new(MemoryRemote::new());
        let alice = generate("alice").await;
        let bob = generate("bob").await.to_public();
        let carol = generate("carol").await.to_public();

        let mut log = ChangeLog::new();
        log.record(bob.fingerprint, MutationKind::Insert, 100);
        remote.overwrite(payload(&alice, &alice, log, vec![bob.clone()]).await);

        let store = Arc::new(GatedStore {
            inner: MemoryStore::new(),
            gate: bob.fingerprint,
            reached: Notify::new(),
            release: Notify::new(),
        });
        let dev = device_on(
            store.clone(),
            remote.clone(),
            &[alice.clone()],
            SyncConfig::default(),
        )
        .await;
        remember(&dev.cache, &alice);
        dev.keyring.change_log().take_modified();

        let engine = dev.engine.clone();
        let cycle = tokio::spawn(async move { engine.trigger(SyncOptions::default()).await });

        // the merge is parked on bob's insert; a local import runs meanwhile
        store.reached.notified().await;
        dev.keyring.import_key(&carol).await.unwrap();
        store.release.notify_one();

        let report = single(cycle.await.unwrap());
        assert_eq!(report.download, StepOutcome::Applied);

        let log = dev.keyring.change_log();
        assert!(dev.keyring.key_by_fingerprint(&bob.fingerprint).await.unwrap().is_some());
        assert_eq!(
            log.change_log().get(&carol.fingerprint).unwrap().kind,
            MutationKind::Insert
        );
        assert!(log.is_modified());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trigger_discards_pending() {
        let remote = Arc::new(MemoryRemote::new());
        remote.set_latency(Some(Duration::from_secs(1)));
        let alice = generate("alice").await;
        let dev = device(remote.clone(), &[alice.clone()], SyncConfig::default()).await;
        remember(&dev.cache, &alice);

        let engine = dev.engine.clone();
        let first = tokio::spawn(async move { engine.trigger(SyncOptions::default()).await });
        while !dev.engine.is_running() {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            dev.engine.trigger(SyncOptions::forced()).await,
            SyncOutcome::Coalesced
        );

        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());
        assert!(!dev.engine.is_running());

        let report = single(dev.engine.trigger(SyncOptions::default()).await);
        assert!(!report.force);
    }

    #[tokio::test]
    async fn test_unknown_signer_fails_download() {
        let remote = Arc::new(MemoryRemote::new());
        let alice = generate("alice").await;
        let bob = generate("bob").await;
        let carol = generate("carol").await;
        remote.overwrite(foreign_payload(&alice, &bob, &carol).await);

        let dev = device(remote.clone(), &[alice.clone()], SyncConfig::default()).await;
        remember(&dev.cache, &alice);

        let report = single(dev.engine.trigger(SyncOptions::forced()).await);
        assert!(matches!(report.download, StepOutcome::Failed(_)));
    }
}
