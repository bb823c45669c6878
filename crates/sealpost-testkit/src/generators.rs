//! Proptest generators for property-based testing.

use proptest::prelude::*;

use sealpost_core::{ChangeLog, Fingerprint, MutationKind};

/// A channel type: non-empty ASCII, no hyphen.
pub fn channel_kind() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9]{0,15}".prop_map(String::from)
}

/// An instance id. May itself contain hyphens.
pub fn instance_id() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9-]{0,31}".prop_map(String::from)
}

/// A well-formed `"<type>-<id>"` channel name and its parts.
pub fn channel_name() -> impl Strategy<Value = (String, String, String)> {
    (channel_kind(), instance_id()).prop_map(|(kind, id)| (format!("{kind}-{id}"), kind, id))
}

pub fn fingerprint() -> impl Strategy<Value = Fingerprint> {
    any::<[u8; 20]>().prop_map(Fingerprint::from_bytes)
}

/// Insert or delete; updates are never logged.
pub fn mutation_kind() -> impl Strategy<Value = MutationKind> {
    prop_oneof![Just(MutationKind::Insert), Just(MutationKind::Delete)]
}

/// A change log over a small fingerprint pool so logs overlap.
pub fn change_log(pool: Vec<Fingerprint>, max_len: usize) -> impl Strategy<Value = ChangeLog> {
    let pool_len = pool.len();
    prop::collection::vec((0..pool_len, mutation_kind(), 0u64..1_000), 0..=max_len).prop_map(
        move |records| {
            let mut log = ChangeLog::new();
            for (i, kind, timestamp) in records {
                log.record(pool[i], kind, timestamp);
            }
            log
        },
    )
}

/// Two change logs over a shared pool.
pub fn change_log_pair() -> impl Strategy<Value = (ChangeLog, ChangeLog)> {
    prop::collection::vec(fingerprint(), 1..6).prop_flat_map(|pool| {
        (
            change_log(pool.clone(), 12),
            change_log(pool, 12),
        )
    })
}
