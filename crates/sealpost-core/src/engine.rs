//! The crypto engine seam.
//!
//! Orchestration never touches cryptographic primitives directly. It asks a
//! [`CryptoEngine`] to parse, unlock, encrypt, decrypt and generate.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::CryptoResult;
use crate::key::Key;
use crate::types::KeyId;

/// A parsed, still encrypted (or signed-only) message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Packet ids the message is encrypted to. Empty for signed-only text.
    pub encryption_key_ids: Vec<KeyId>,
    /// Engine-specific body.
    pub body: Bytes,
}

/// Result of decrypting a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMessage {
    pub data: Bytes,
    /// Id of the signing packet, if the message was signed.
    pub signer: Option<KeyId>,
    /// Whether the signature checked out against one of the verification keys.
    pub verified: bool,
}

/// Parameters for key generation.
#[derive(Debug, Clone, Default)]
pub struct GenerateKeyOptions {
    pub user_ids: Vec<String>,
    pub password: String,
}

/// Crypto engine operations consumed by the orchestration layer.
#[async_trait]
pub trait CryptoEngine: Send + Sync {
    /// Parse an armored message.
    async fn read_message(&self, armored: &str) -> CryptoResult<Message>;

    /// Parse an armored key block (one or more keys).
    async fn read_keys(&self, armored: &str) -> CryptoResult<Vec<Key>>;

    /// Decrypt the secret of one packet, returning a copy of `key` with that
    /// packet decrypted. A bad password is [`CryptoError::WrongPassword`].
    ///
    /// [`CryptoError::WrongPassword`]: crate::error::CryptoError::WrongPassword
    async fn decrypt_key_packet(&self, key: &Key, key_id: KeyId, password: &str)
        -> CryptoResult<Key>;

    /// Decrypt (and verify) a message with a key whose decryption packet is
    /// already decrypted.
    async fn decrypt_message(
        &self,
        message: &Message,
        key: &Key,
        verification_keys: &[Key],
    ) -> CryptoResult<DecryptedMessage>;

    /// Encrypt to `recipients`, optionally signing with a decrypted key.
    /// Returns armored text.
    async fn encrypt_message(
        &self,
        data: &[u8],
        recipients: &[Key],
        signing_key: Option<&Key>,
    ) -> CryptoResult<String>;

    /// Produce an armored signed-only message.
    async fn sign_message(&self, data: &[u8], signing_key: &Key) -> CryptoResult<String>;

    /// Generate a new private key, locked under the given password.
    async fn generate_key(&self, options: GenerateKeyOptions) -> CryptoResult<Key>;
}
