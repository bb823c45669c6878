//! Per-keyring change-log store.
//!
//! Wraps a keyring's [`SyncState`]: the change log, the remote version tag
//! and the `modified` flag. Mutations are recorded here as they happen and
//! the whole state is persisted as the `sync_state` attribute of the
//! keyring.
//!
//! Muting stops all recording on the keyring. Remote changes applied by
//! the sync engine bypass the log instead (see
//! [`Keyring::apply_remote_key`](crate::Keyring::apply_remote_key)), so
//! local mutations made during a merge are never lost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use sealpost_core::{ChangeLog, Fingerprint, KeyringId, MutationKind, SyncState};
use sealpost_store::{KeyringStore, KeyringStoreExt};

use crate::error::Result;

/// Attribute name of the persisted sync state.
pub const SYNC_STATE_ATTRIBUTE: &str = "sync_state";

fn now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

pub struct ChangeLogStore {
    keyring_id: KeyringId,
    store: Arc<dyn KeyringStore>,
    state: Mutex<SyncState>,
    muted: AtomicBool,
}

impl ChangeLogStore {
    /// Load the persisted state of `keyring_id`, or start empty.
    pub async fn load(store: Arc<dyn KeyringStore>, keyring_id: KeyringId) -> Result<Self> {
        let state: SyncState = store
            .attribute_cbor(&keyring_id, SYNC_STATE_ATTRIBUTE)
            .await?
            .unwrap_or_default();
        Ok(Self {
            keyring_id,
            store,
            state: Mutex::new(state),
            muted: AtomicBool::new(false),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn keyring_id(&self) -> &KeyringId {
        &self.keyring_id
    }

    /// Record a local mutation. Ignored while muted.
    pub fn record(&self, fingerprint: Fingerprint, kind: MutationKind) {
        if self.is_muted() {
            return;
        }
        let mut state = self.lock();
        state.modified = true;
        state.change_log.record(fingerprint, kind, now_seconds());
        debug!(keyring = %self.keyring_id, fingerprint = %fingerprint, ?kind, "mutation recorded");
    }

    /// Merge a remote log into ours.
    pub fn merge(&self, remote: &ChangeLog) {
        self.lock().change_log.merge(remote);
    }

    /// Stop or resume recording for every writer of this keyring.
    pub fn mute(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    pub fn deleted_fingerprints(&self) -> Vec<Fingerprint> {
        self.lock().change_log.deleted_fingerprints()
    }

    /// A copy of the current log.
    pub fn change_log(&self) -> ChangeLog {
        self.lock().change_log.clone()
    }

    pub fn is_modified(&self) -> bool {
        self.lock().modified
    }

    /// Read and clear the `modified` flag.
    pub fn take_modified(&self) -> bool {
        std::mem::take(&mut self.lock().modified)
    }

    pub fn mark_modified(&self) {
        self.lock().modified = true;
    }

    pub fn remote_version(&self) -> Option<String> {
        self.lock().remote_version.clone()
    }

    pub fn set_remote_version(&self, version: Option<String>) {
        self.lock().remote_version = version;
    }

    /// A copy of the whole state.
    pub fn snapshot(&self) -> SyncState {
        self.lock().clone()
    }

    /// Write the state to the keyring store.
    pub async fn persist(&self) -> Result<()> {
        let state = self.snapshot();
        self.store
            .set_attribute_cbor(&self.keyring_id, SYNC_STATE_ATTRIBUTE, &state)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealpost_store::MemoryStore;

    async fn open() -> (Arc<dyn KeyringStore>, ChangeLogStore) {
        let store: Arc<dyn KeyringStore> = Arc::new(MemoryStore::new());
        store.create_keyring(&KeyringId::main()).await.unwrap();
        let log = ChangeLogStore::load(store.clone(), KeyringId::main())
            .await
            .unwrap();
        (store, log)
    }

    fn fpr(byte: u8) -> Fingerprint {
        Fingerprint::from_bytes([byte; 20])
    }

    #[tokio::test]
    async fn test_record_sets_modified() {
        let (_, log) = open().await;
        assert!(!log.is_modified());
        log.record(fpr(1), MutationKind::Insert);
        assert!(log.is_modified());
        assert_eq!(log.change_log().len(), 1);
    }

    #[tokio::test]
    async fn test_update_only_sets_modified() {
        let (_, log) = open().await;
        log.record(fpr(1), MutationKind::Update);
        assert!(log.is_modified());
        assert!(log.change_log().is_empty());
    }

    #[tokio::test]
    async fn test_muted_records_nothing() {
        let (_, log) = open().await;
        log.mute(true);
        log.record(fpr(1), MutationKind::Delete);
        assert!(!log.is_modified());
        assert!(log.change_log().is_empty());
        log.mute(false);
        log.record(fpr(1), MutationKind::Delete);
        assert_eq!(log.deleted_fingerprints(), vec![fpr(1)]);
    }

    #[tokio::test]
    async fn test_take_and_mark_modified() {
        let (_, log) = open().await;
        log.record(fpr(1), MutationKind::Insert);
        assert!(log.take_modified());
        assert!(!log.take_modified());
        log.mark_modified();
        assert!(log.is_modified());
    }

    #[tokio::test]
    async fn test_persist_and_reload() {
        let (store, log) = open().await;
        log.record(fpr(2), MutationKind::Insert);
        log.set_remote_version(Some("v7".into()));
        log.persist().await.unwrap();

        let reloaded = ChangeLogStore::load(store, KeyringId::main()).await.unwrap();
        assert_eq!(reloaded.snapshot(), log.snapshot());
        assert_eq!(reloaded.remote_version().as_deref(), Some("v7"));
    }

    #[tokio::test]
    async fn test_unknown_keyring_is_an_error() {
        let store: Arc<dyn KeyringStore> = Arc::new(MemoryStore::new());
        assert!(ChangeLogStore::load(store, KeyringId::new("missing"))
            .await
            .is_err());
    }
}
