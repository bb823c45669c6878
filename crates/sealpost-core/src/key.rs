//! The key model: a primary packet, sub-key packets and user ids.
//!
//! Secret material is either *locked* (sealed under a password) or
//! *decrypted*. Decrypted material lives only in memory, in a zeroizing
//! buffer, and is never serialized.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

use crate::types::{Fingerprint, KeyId};

/// Public-key algorithm of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Signing (primary packets).
    Ed25519,
    /// Key agreement (encryption sub-keys).
    X25519,
}

/// Secret part of a packet.
#[derive(Clone, Serialize, Deserialize)]
pub struct SecretPacket {
    /// Secret material sealed under the password.
    pub sealed: Vec<u8>,
    /// Salt for the password key derivation.
    pub salt: [u8; 16],
    /// AEAD nonce.
    pub nonce: [u8; 12],
    #[serde(skip)]
    decrypted: Option<Zeroizing<Vec<u8>>>,
}

impl SecretPacket {
    /// Create a locked secret packet.
    pub fn locked(sealed: Vec<u8>, salt: [u8; 16], nonce: [u8; 12]) -> Self {
        Self {
            sealed,
            salt,
            nonce,
            decrypted: None,
        }
    }

    /// Whether the secret material is available in memory.
    pub fn is_decrypted(&self) -> bool {
        self.decrypted.is_some()
    }

    /// The decrypted material, if any.
    pub fn material(&self) -> Option<&[u8]> {
        self.decrypted.as_ref().map(|m| m.as_slice())
    }

    /// Attach decrypted material.
    pub fn set_material(&mut self, material: Vec<u8>) {
        self.decrypted = Some(Zeroizing::new(material));
    }

    /// Drop decrypted material.
    pub fn lock(&mut self) {
        self.decrypted = None;
    }
}

impl fmt::Debug for SecretPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretPacket")
            .field("decrypted", &self.is_decrypted())
            .finish_non_exhaustive()
    }
}

/// One packet of a key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPacket {
    pub key_id: KeyId,
    pub algorithm: Algorithm,
    pub public: Vec<u8>,
    pub secret: Option<SecretPacket>,
}

impl KeyPacket {
    pub fn is_private(&self) -> bool {
        self.secret.is_some()
    }

    pub fn is_decrypted(&self) -> bool {
        self.secret.as_ref().is_some_and(SecretPacket::is_decrypted)
    }
}

/// A key with its primary packet, sub-keys and user ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Key {
    pub fingerprint: Fingerprint,
    pub primary: KeyPacket,
    pub subkeys: Vec<KeyPacket>,
    pub user_ids: Vec<String>,
    /// Creation time in seconds since the epoch.
    pub created: u64,
}

impl Key {
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// The id of the primary packet, which is the key's cache identity.
    pub fn primary_key_id(&self) -> KeyId {
        self.primary.key_id
    }

    /// Every packet id, primary first.
    pub fn key_ids(&self) -> Vec<KeyId> {
        std::iter::once(self.primary.key_id)
            .chain(self.subkeys.iter().map(|p| p.key_id))
            .collect()
    }

    pub fn packet(&self, key_id: KeyId) -> Option<&KeyPacket> {
        if self.primary.key_id == key_id {
            return Some(&self.primary);
        }
        self.subkeys.iter().find(|p| p.key_id == key_id)
    }

    pub fn packet_mut(&mut self, key_id: KeyId) -> Option<&mut KeyPacket> {
        if self.primary.key_id == key_id {
            return Some(&mut self.primary);
        }
        self.subkeys.iter_mut().find(|p| p.key_id == key_id)
    }

    /// The packet used for encryption: the first X25519 sub-key.
    pub fn encryption_packet(&self) -> Option<&KeyPacket> {
        self.subkeys
            .iter()
            .find(|p| p.algorithm == Algorithm::X25519)
    }

    /// Whether the key carries secret material.
    pub fn is_private(&self) -> bool {
        self.primary.is_private()
    }

    /// Whether the given packet's secret is decrypted.
    pub fn is_packet_decrypted(&self, key_id: KeyId) -> bool {
        self.packet(key_id).is_some_and(KeyPacket::is_decrypted)
    }

    /// Copy decrypted material for `key_id` from another copy of this key.
    pub fn adopt_decrypted(&mut self, other: &Key, key_id: KeyId) -> bool {
        let material = other
            .packet(key_id)
            .and_then(|p| p.secret.as_ref())
            .and_then(|s| s.material())
            .map(<[u8]>::to_vec);
        match (material, self.packet_mut(key_id).and_then(|p| p.secret.as_mut())) {
            (Some(material), Some(secret)) => {
                secret.set_material(material);
                true
            }
            _ => false,
        }
    }

    /// A copy without any secret parts.
    pub fn to_public(&self) -> Key {
        let mut key = self.clone();
        key.primary.secret = None;
        for packet in &mut key.subkeys {
            packet.secret = None;
        }
        key
    }

    /// A copy whose secret parts are all locked again.
    pub fn to_locked(&self) -> Key {
        let mut key = self.clone();
        for packet in std::iter::once(&mut key.primary).chain(key.subkeys.iter_mut()) {
            if let Some(secret) = packet.secret.as_mut() {
                secret.lock();
            }
        }
        key
    }

    /// The e-mail addresses found in the user ids (`Name <addr>` or bare).
    pub fn addresses(&self) -> Vec<String> {
        self.user_ids
            .iter()
            .filter_map(|uid| {
                let addr = match (uid.rfind('<'), uid.rfind('>')) {
                    (Some(start), Some(end)) if start < end => &uid[start + 1..end],
                    _ => uid.as_str(),
                };
                addr.contains('@').then(|| addr.trim().to_lowercase())
            })
            .collect()
    }

    /// The first user id, used for prompts.
    pub fn primary_user_id(&self) -> Option<&str> {
        self.user_ids.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key() -> Key {
        let packet = |byte: u8, algorithm| KeyPacket {
            key_id: KeyId::from_bytes([byte; 8]),
            algorithm,
            public: vec![byte; 32],
            secret: Some(SecretPacket::locked(vec![0; 48], [byte; 16], [byte; 12])),
        };
        Key {
            fingerprint: Fingerprint::from_bytes([9; 20]),
            primary: packet(1, Algorithm::Ed25519),
            subkeys: vec![packet(2, Algorithm::X25519)],
            user_ids: vec!["Alice <Alice@Example.org>".to_string()],
            created: 0,
        }
    }

    #[test]
    fn test_packet_lookup() {
        let key = sample_key();
        assert_eq!(key.key_ids().len(), 2);
        assert!(key.packet(KeyId::from_bytes([2; 8])).is_some());
        assert!(key.packet(KeyId::from_bytes([3; 8])).is_none());
        assert_eq!(
            key.encryption_packet().unwrap().key_id,
            KeyId::from_bytes([2; 8])
        );
    }

    #[test]
    fn test_decrypted_state() {
        let mut key = sample_key();
        let sub = KeyId::from_bytes([2; 8]);
        assert!(!key.is_packet_decrypted(sub));

        key.packet_mut(sub)
            .unwrap()
            .secret
            .as_mut()
            .unwrap()
            .set_material(vec![7; 32]);
        assert!(key.is_packet_decrypted(sub));
        assert!(!key.to_locked().is_packet_decrypted(sub));
        assert!(!key.to_public().is_private());
    }

    #[test]
    fn test_adopt_decrypted() {
        let mut unlocked = sample_key();
        let sub = KeyId::from_bytes([2; 8]);
        unlocked
            .packet_mut(sub)
            .unwrap()
            .secret
            .as_mut()
            .unwrap()
            .set_material(vec![7; 32]);

        let mut target = sample_key();
        assert!(target.adopt_decrypted(&unlocked, sub));
        assert!(target.is_packet_decrypted(sub));
        assert!(!target.adopt_decrypted(&unlocked, KeyId::from_bytes([1; 8])));
    }

    #[test]
    fn test_decrypted_material_not_serialized() {
        let mut key = sample_key();
        key.primary.secret.as_mut().unwrap().set_material(vec![5; 32]);

        let mut buf = Vec::new();
        ciborium::into_writer(&key, &mut buf).unwrap();
        let back: Key = ciborium::from_reader(buf.as_slice()).unwrap();
        assert!(back.is_private());
        assert!(!back.is_packet_decrypted(back.primary_key_id()));
    }

    #[test]
    fn test_addresses() {
        let key = sample_key();
        assert_eq!(key.addresses(), vec!["alice@example.org".to_string()]);
    }
}
