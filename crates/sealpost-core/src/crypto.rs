//! Cryptographic building blocks for the software engine.
//!
//! Ed25519 signing, X25519 key agreement, ChaCha20-Poly1305 sealing and
//! BLAKE3 key derivation. Nothing here knows about keys or keyrings.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// Fill an array with random bytes.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// A 256-bit symmetric key for ChaCha20-Poly1305.
pub struct SealingKey(Zeroizing<[u8; 32]>);

impl SealingKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        Self(Zeroizing::new(random_bytes()))
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Derive the key that seals a secret packet.
    pub fn from_password(password: &str, salt: &[u8; 16]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key("sealpost-soft-v0 secret-packet");
        hasher.update(salt);
        hasher.update(password.as_bytes());
        Self::from_bytes(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encrypt data with this key.
    pub fn seal(&self, plaintext: &[u8], nonce: &[u8; 12]) -> CryptoResult<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(self.0.as_slice())
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;
        cipher
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    /// Decrypt data with this key.
    pub fn open(&self, ciphertext: &[u8], nonce: &[u8; 12]) -> CryptoResult<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(self.0.as_slice())
            .map_err(|e| CryptoError::Decryption(e.to_string()))?;
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| CryptoError::Decryption(e.to_string()))
    }
}

/// Derive a wrapping key from an X25519 shared secret.
fn wrap_key(shared: &[u8; 32], context: &[u8]) -> SealingKey {
    let mut hasher = blake3::Hasher::new_derive_key("sealpost-soft-v0 recipient-wrap");
    hasher.update(shared);
    hasher.update(context);
    SealingKey::from_bytes(*hasher.finalize().as_bytes())
}

/// Generate a new X25519 secret, returning `(secret, public)`.
pub fn x25519_generate() -> (Zeroizing<[u8; 32]>, [u8; 32]) {
    let secret = Zeroizing::new(random_bytes::<32>());
    let public = PublicKey::from(&StaticSecret::from(*secret));
    (secret, *public.as_bytes())
}

/// Generate a new Ed25519 seed, returning `(seed, public)`.
pub fn ed25519_generate() -> (Zeroizing<[u8; 32]>, [u8; 32]) {
    let seed = Zeroizing::new(random_bytes::<32>());
    let public = SigningKey::from_bytes(&seed).verifying_key().to_bytes();
    (seed, public)
}

/// A content key wrapped for one recipient.
pub struct WrappedKey {
    pub ephemeral_public: [u8; 32],
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
}

/// Wrap a content key for a recipient's X25519 public key.
pub fn wrap_for_recipient(
    content_key: &SealingKey,
    recipient_public: &[u8; 32],
    context: &[u8],
) -> CryptoResult<WrappedKey> {
    let ephemeral = EphemeralSecret::random_from_rng(rand::thread_rng());
    let ephemeral_public = *PublicKey::from(&ephemeral).as_bytes();
    let shared = ephemeral.diffie_hellman(&PublicKey::from(*recipient_public));
    let nonce = random_bytes();
    let ciphertext = wrap_key(shared.as_bytes(), context).seal(content_key.as_bytes(), &nonce)?;
    Ok(WrappedKey {
        ephemeral_public,
        nonce,
        ciphertext,
    })
}

/// Unwrap a content key with the recipient's X25519 secret.
pub fn unwrap_for_recipient(
    wrapped: &WrappedKey,
    recipient_secret: &[u8],
    context: &[u8],
) -> CryptoResult<SealingKey> {
    let secret: [u8; 32] = recipient_secret
        .try_into()
        .map_err(|_| CryptoError::Decryption("invalid X25519 secret length".into()))?;
    let shared = StaticSecret::from(secret).diffie_hellman(&PublicKey::from(wrapped.ephemeral_public));
    let bytes = Zeroizing::new(
        wrap_key(shared.as_bytes(), context).open(&wrapped.ciphertext, &wrapped.nonce)?,
    );
    let arr: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::Decryption(format!("invalid content key length: {}", bytes.len())))?;
    Ok(SealingKey::from_bytes(arr))
}

/// Sign with an Ed25519 seed.
pub fn ed25519_sign(seed: &[u8], message: &[u8]) -> CryptoResult<Vec<u8>> {
    let seed: [u8; 32] = seed
        .try_into()
        .map_err(|_| CryptoError::Encryption("invalid Ed25519 seed length".into()))?;
    let signing_key = SigningKey::from_bytes(&seed);
    Ok(signing_key.sign(message).to_bytes().to_vec())
}

/// Verify an Ed25519 signature. Returns `false` on any malformed input.
pub fn ed25519_verify(public: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(public): Result<[u8; 32], _> = public.try_into() else {
        return false;
    };
    let Ok(signature): Result<[u8; 64], _> = signature.try_into() else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&public) else {
        return false;
    };
    verifying_key
        .verify(message, &Signature::from_bytes(&signature))
        .is_ok()
}
