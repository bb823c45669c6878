//! `SoftEngine`: a software crypto engine.
//!
//! Keys carry an Ed25519 primary packet for signing and an X25519 sub-key
//! for encryption. Secret packets are sealed with ChaCha20-Poly1305 under a
//! BLAKE3-derived password key. Messages wrap a random content key for each
//! recipient via ephemeral X25519, and carry a signed body
//! (sign, then encrypt).

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::armor;
use crate::crypto::{self, SealingKey, WrappedKey};
use crate::engine::{CryptoEngine, DecryptedMessage, GenerateKeyOptions, Message};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{Algorithm, Key, KeyPacket, SecretPacket};
use crate::types::{Fingerprint, KeyId};

#[derive(Serialize, Deserialize)]
struct Recipient {
    key_id: KeyId,
    ephemeral_public: [u8; 32],
    nonce: [u8; 12],
    wrapped: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct SignedContent {
    data: Vec<u8>,
    signer: Option<KeyId>,
    signature: Option<Vec<u8>>,
}

#[derive(Serialize, Deserialize)]
enum Body {
    Encrypted {
        recipients: Vec<Recipient>,
        nonce: [u8; 12],
        ciphertext: Vec<u8>,
    },
    Signed(SignedContent),
}

fn to_cbor<T: Serialize>(value: &T) -> CryptoResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CryptoError::Encryption(e.to_string()))?;
    Ok(buf)
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CryptoResult<T> {
    ciborium::from_reader(bytes).map_err(|e| CryptoError::ArmorParse(e.to_string()))
}

fn seal_secret(material: &[u8], password: &str) -> CryptoResult<SecretPacket> {
    let salt = crypto::random_bytes();
    let nonce = crypto::random_bytes();
    let sealed = SealingKey::from_password(password, &salt).seal(material, &nonce)?;
    Ok(SecretPacket::locked(sealed, salt, nonce))
}

fn now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Software implementation of [`CryptoEngine`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftEngine;

impl SoftEngine {
    pub fn new() -> Self {
        Self
    }

    /// Armor keys for export. Secret parts stay sealed.
    pub fn armor_keys(&self, keys: &[Key]) -> CryptoResult<String> {
        let locked: Vec<Key> = keys.iter().map(Key::to_locked).collect();
        Ok(armor::encode(armor::KEY_BLOCK, &to_cbor(&locked)?))
    }

    fn sign_content(data: &[u8], signing_key: &Key) -> CryptoResult<SignedContent> {
        let primary = &signing_key.primary;
        let seed = primary
            .secret
            .as_ref()
            .ok_or(CryptoError::NotPrivate(primary.key_id))?
            .material()
            .ok_or(CryptoError::KeyLocked(primary.key_id))?;
        Ok(SignedContent {
            data: data.to_vec(),
            signer: Some(primary.key_id),
            signature: Some(crypto::ed25519_sign(seed, data)?),
        })
    }

    fn verify_content(
        content: &SignedContent,
        verification_keys: &[Key],
    ) -> CryptoResult<bool> {
        let (Some(signer), Some(signature)) = (content.signer, content.signature.as_ref()) else {
            return Ok(false);
        };
        let Some(packet) = verification_keys.iter().find_map(|k| k.packet(signer)) else {
            return Ok(false);
        };
        if crypto::ed25519_verify(&packet.public, &content.data, signature) {
            Ok(true)
        } else {
            Err(CryptoError::InvalidSignature(signer))
        }
    }
}

#[async_trait]
impl CryptoEngine for SoftEngine {
    async fn read_message(&self, armored: &str) -> CryptoResult<Message> {
        let raw = armor::decode(armor::MESSAGE, armored)?;
        let body: Body = from_cbor(&raw)?;
        let encryption_key_ids = match &body {
            Body::Encrypted { recipients, .. } => recipients.iter().map(|r| r.key_id).collect(),
            Body::Signed(_) => Vec::new(),
        };
        Ok(Message {
            encryption_key_ids,
            body: Bytes::from(raw),
        })
    }

    async fn read_keys(&self, armored: &str) -> CryptoResult<Vec<Key>> {
        let raw = armor::decode(armor::KEY_BLOCK, armored)?;
        let keys: Vec<Key> =
            ciborium::from_reader(raw.as_slice()).map_err(|e| CryptoError::Import(e.to_string()))?;
        if keys.is_empty() {
            return Err(CryptoError::Import("key block contains no keys".into()));
        }
        for key in &keys {
            if Fingerprint::derive(&key.primary.public) != key.fingerprint {
                return Err(CryptoError::Import(format!(
                    "fingerprint mismatch for {}",
                    key.fingerprint
                )));
            }
        }
        Ok(keys)
    }

    async fn decrypt_key_packet(
        &self,
        key: &Key,
        key_id: KeyId,
        password: &str,
    ) -> CryptoResult<Key> {
        if key.is_packet_decrypted(key_id) {
            return Ok(key.clone());
        }
        let mut unlocked = key.clone();
        let packet = unlocked
            .packet_mut(key_id)
            .ok_or_else(|| CryptoError::NoKeyFound(key_id.to_hex()))?;
        let secret = packet
            .secret
            .as_mut()
            .ok_or(CryptoError::NotPrivate(key_id))?;
        let material = SealingKey::from_password(password, &secret.salt)
            .open(&secret.sealed, &secret.nonce)
            .map_err(|_| CryptoError::WrongPassword)?;
        secret.set_material(material);
        debug!(key_id = %key_id, "key packet decrypted");
        Ok(unlocked)
    }

    async fn decrypt_message(
        &self,
        message: &Message,
        key: &Key,
        verification_keys: &[Key],
    ) -> CryptoResult<DecryptedMessage> {
        let content = match from_cbor::<Body>(&message.body)? {
            Body::Signed(content) => content,
            Body::Encrypted {
                recipients,
                nonce,
                ciphertext,
            } => {
                let (recipient, packet) = recipients
                    .iter()
                    .find_map(|r| key.packet(r.key_id).map(|p| (r, p)))
                    .ok_or_else(|| CryptoError::NoKeyFound(key.fingerprint.to_hex()))?;
                let secret = packet
                    .secret
                    .as_ref()
                    .ok_or(CryptoError::NotPrivate(packet.key_id))?
                    .material()
                    .ok_or(CryptoError::KeyLocked(packet.key_id))?;
                let wrapped = WrappedKey {
                    ephemeral_public: recipient.ephemeral_public,
                    nonce: recipient.nonce,
                    ciphertext: recipient.wrapped.clone(),
                };
                let content_key =
                    crypto::unwrap_for_recipient(&wrapped, secret, recipient.key_id.as_bytes())?;
                let plaintext = content_key.open(&ciphertext, &nonce)?;
                from_cbor(&plaintext)?
            }
        };

        let verified = Self::verify_content(&content, verification_keys)?;
        Ok(DecryptedMessage {
            signer: content.signer,
            verified,
            data: Bytes::from(content.data),
        })
    }

    async fn encrypt_message(
        &self,
        data: &[u8],
        recipients: &[Key],
        signing_key: Option<&Key>,
    ) -> CryptoResult<String> {
        if recipients.is_empty() {
            return Err(CryptoError::NoKeyFound("no recipients".into()));
        }
        let content = match signing_key {
            Some(key) => Self::sign_content(data, key)?,
            None => SignedContent {
                data: data.to_vec(),
                signer: None,
                signature: None,
            },
        };

        let content_key = SealingKey::generate();
        let mut blocks = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let packet = recipient
                .encryption_packet()
                .ok_or_else(|| CryptoError::NoKeyFound(recipient.fingerprint.to_hex()))?;
            let public: [u8; 32] = packet
                .public
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::Encryption("invalid X25519 public key".into()))?;
            let wrapped =
                crypto::wrap_for_recipient(&content_key, &public, packet.key_id.as_bytes())?;
            blocks.push(Recipient {
                key_id: packet.key_id,
                ephemeral_public: wrapped.ephemeral_public,
                nonce: wrapped.nonce,
                wrapped: wrapped.ciphertext,
            });
        }

        let nonce = crypto::random_bytes();
        let ciphertext = content_key.seal(&to_cbor(&content)?, &nonce)?;
        let body = Body::Encrypted {
            recipients: blocks,
            nonce,
            ciphertext,
        };
        Ok(armor::encode(armor::MESSAGE, &to_cbor(&body)?))
    }

    async fn sign_message(&self, data: &[u8], signing_key: &Key) -> CryptoResult<String> {
        let body = Body::Signed(Self::sign_content(data, signing_key)?);
        Ok(armor::encode(armor::MESSAGE, &to_cbor(&body)?))
    }

    async fn generate_key(&self, options: GenerateKeyOptions) -> CryptoResult<Key> {
        let (seed, signing_public) = crypto::ed25519_generate();
        let (secret, encryption_public) = crypto::x25519_generate();

        let primary = KeyPacket {
            key_id: KeyId::derive(&signing_public),
            algorithm: Algorithm::Ed25519,
            public: signing_public.to_vec(),
            secret: Some(seal_secret(seed.as_slice(), &options.password)?),
        };
        let subkey = KeyPacket {
            key_id: KeyId::derive(&encryption_public),
            algorithm: Algorithm::X25519,
            public: encryption_public.to_vec(),
            secret: Some(seal_secret(secret.as_slice(), &options.password)?),
        };
        let key = Key {
            fingerprint: Fingerprint::derive(&signing_public),
            primary,
            subkeys: vec![subkey],
            user_ids: options.user_ids,
            created: now_seconds(),
        };
        debug!(fingerprint = %key.fingerprint, "key generated");
        Ok(key)
    }
}
