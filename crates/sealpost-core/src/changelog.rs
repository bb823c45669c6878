//! Change-log data model.
//!
//! A change log maps key fingerprints to the last mutation seen for that
//! key. Two logs merge by keeping, per fingerprint, the entry with the later
//! timestamp. On equal timestamps the receiving (local) entry is kept.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::Fingerprint;

/// Kind of keyring mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MutationKind {
    Insert,
    /// Raises the keyring's `modified` flag but is never logged.
    Update,
    Delete,
}

/// A logged mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub kind: MutationKind,
    /// Seconds since the epoch.
    pub timestamp: u64,
}

/// Per-keyring map of fingerprint to last logged mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLog {
    entries: BTreeMap<Fingerprint, ChangeLogEntry>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&ChangeLogEntry> {
        self.entries.get(fingerprint)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Fingerprint, &ChangeLogEntry)> {
        self.entries.iter()
    }

    /// Record a mutation at `timestamp`. `Update` is ignored.
    pub fn record(&mut self, fingerprint: Fingerprint, kind: MutationKind, timestamp: u64) {
        if kind == MutationKind::Update {
            return;
        }
        self.entries
            .insert(fingerprint, ChangeLogEntry { kind, timestamp });
    }

    /// Merge `remote` into this log. Later timestamps win.
    pub fn merge(&mut self, remote: &ChangeLog) {
        for (fingerprint, theirs) in &remote.entries {
            match self.entries.get(fingerprint) {
                Some(ours) if ours.timestamp >= theirs.timestamp => {}
                _ => {
                    self.entries.insert(*fingerprint, *theirs);
                }
            }
        }
    }

    /// Fingerprints whose last mutation is a delete.
    pub fn deleted_fingerprints(&self) -> Vec<Fingerprint> {
        self.fingerprints_with(MutationKind::Delete)
    }

    /// Fingerprints whose last mutation is an insert.
    pub fn inserted_fingerprints(&self) -> Vec<Fingerprint> {
        self.fingerprints_with(MutationKind::Insert)
    }

    fn fingerprints_with(&self, kind: MutationKind) -> Vec<Fingerprint> {
        self.entries
            .iter()
            .filter(|(_, e)| e.kind == kind)
            .map(|(f, _)| *f)
            .collect()
    }
}

/// Persisted sync state of a keyring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// Version tag of the remote copy last seen.
    pub remote_version: Option<String>,
    pub change_log: ChangeLog,
    /// A local mutation happened since the last successful upload.
    pub modified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fpr(byte: u8) -> Fingerprint {
        Fingerprint::from_bytes([byte; 20])
    }

    #[test]
    fn test_update_is_not_logged() {
        let mut log = ChangeLog::new();
        log.record(fpr(1), MutationKind::Update, 10);
        assert!(log.is_empty());
    }

    #[test]
    fn test_record_overwrites() {
        let mut log = ChangeLog::new();
        log.record(fpr(1), MutationKind::Insert, 10);
        log.record(fpr(1), MutationKind::Delete, 20);
        assert_eq!(log.len(), 1);
        assert_eq!(log.deleted_fingerprints(), vec![fpr(1)]);
        assert!(log.inserted_fingerprints().is_empty());
    }

    #[test]
    fn test_merge_later_wins() {
        let mut local = ChangeLog::new();
        local.record(fpr(1), MutationKind::Insert, 10);
        local.record(fpr(2), MutationKind::Insert, 30);

        let mut remote = ChangeLog::new();
        remote.record(fpr(1), MutationKind::Delete, 20);
        remote.record(fpr(2), MutationKind::Delete, 25);
        remote.record(fpr(3), MutationKind::Insert, 5);

        local.merge(&remote);
        assert_eq!(local.get(&fpr(1)).unwrap().kind, MutationKind::Delete);
        assert_eq!(local.get(&fpr(2)).unwrap().kind, MutationKind::Insert);
        assert_eq!(local.get(&fpr(3)).unwrap().kind, MutationKind::Insert);
    }

    #[test]
    fn test_merge_tie_keeps_local() {
        let mut local = ChangeLog::new();
        local.record(fpr(1), MutationKind::Insert, 10);
        let mut remote = ChangeLog::new();
        remote.record(fpr(1), MutationKind::Delete, 10);
        local.merge(&remote);
        assert_eq!(local.get(&fpr(1)).unwrap().kind, MutationKind::Insert);
    }

    #[test]
    fn test_sync_state_cbor() {
        let mut state = SyncState {
            remote_version: Some("v3".into()),
            modified: true,
            ..Default::default()
        };
        state.change_log.record(fpr(7), MutationKind::Delete, 99);

        let mut buf = Vec::new();
        ciborium::into_writer(&state, &mut buf).unwrap();
        let back: SyncState = ciborium::from_reader(buf.as_slice()).unwrap();
        assert_eq!(back, state);
    }

    // Distinct timestamps per fingerprint, so ties never arise and the
    // merge is a pure max.
    fn arb_log() -> impl Strategy<Value = ChangeLog> {
        prop::collection::vec((0u8..8, any::<bool>(), 0u64..1000), 0..12).prop_map(|items| {
            let mut log = ChangeLog::new();
            for (f, delete, ts) in items {
                let kind = if delete {
                    MutationKind::Delete
                } else {
                    MutationKind::Insert
                };
                log.record(fpr(f), kind, ts * 8 + u64::from(f) * 2 + u64::from(delete));
            }
            log
        })
    }

    proptest! {
        #[test]
        fn prop_merge_commutative(a in arb_log(), b in arb_log()) {
            let mut ab = a.clone();
            ab.merge(&b);
            let mut ba = b.clone();
            ba.merge(&a);
            prop_assert_eq!(ab, ba);
        }

        #[test]
        fn prop_merge_idempotent(a in arb_log(), b in arb_log()) {
            let mut once = a.clone();
            once.merge(&b);
            let mut twice = once.clone();
            twice.merge(&b);
            prop_assert_eq!(&once, &twice);

            let mut self_merge = a.clone();
            self_merge.merge(&a);
            prop_assert_eq!(self_merge, a);
        }
    }
}
