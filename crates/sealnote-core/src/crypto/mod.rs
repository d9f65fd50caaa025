//! Cryptographic primitives for the sealnote vault.
//!
//! Wraps audited RustCrypto crates (argon2, chacha20poly1305, hkdf, sha2)
//! behind a small explicit context value. This module never implements a
//! primitive itself, and no other module touches the underlying crates
//! directly.

pub mod aead;
pub mod hash;
pub mod kdf;
pub mod keys;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Wrong key or tampered ciphertext. Deliberately a single signal:
    /// a wrong password and a corrupted file are indistinguishable, so the
    /// error cannot be used as a password oracle.
    #[error("authentication failed: cannot decrypt")]
    Authentication,

    #[error("encryption failed")]
    Encrypt,

    #[error("ciphertext too short: {0} bytes")]
    TruncatedEnvelope(usize),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// Explicit crypto context, passed by reference into every component that
/// encrypts, decrypts, or derives keys.
///
/// A value rather than a process-wide singleton: tests can run several
/// independent contexts side by side, and the dependency stays visible in
/// every signature that needs it.
#[derive(Debug, Clone, Default)]
pub struct CryptoContext;

impl CryptoContext {
    pub fn new() -> Self {
        Self
    }

    /// Fill a fixed-size buffer from the thread-local CSPRNG.
    pub fn random_bytes<const N: usize>(&self) -> [u8; N] {
        use rand::RngCore;
        let mut bytes = [0u8; N];
        rand::rng().fill_bytes(&mut bytes);
        bytes
    }

    /// Encrypt `plaintext` under `key`, producing the standard envelope
    /// `nonce(24) || ciphertext || tag(16)` with a fresh random nonce.
    pub fn encrypt(&self, key: &[u8; keys::KEY_LEN], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        aead::seal(key, plaintext, aad)
    }

    /// Decrypt an envelope produced by [`CryptoContext::encrypt`].
    ///
    /// Fails closed: no partial plaintext is ever returned.
    pub fn decrypt(&self, key: &[u8; keys::KEY_LEN], envelope: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        aead::open(key, envelope, aad)
    }

    /// Derive the session-only master unlock key from a password.
    ///
    /// Deterministic for a fixed (password, salt, params) triple. This is
    /// CPU- and memory-heavy by design; async callers should run it on a
    /// blocking thread (see `Workspace::unlock`).
    pub fn derive_unlock_key(
        &self,
        password: &[u8],
        salt: &[u8],
        params: &kdf::KdfParams,
    ) -> Result<keys::MasterUnlockKey> {
        kdf::derive_unlock_key(password, salt, params)
    }

    /// Derive a 32-byte entity key from a vault key and a domain-separating
    /// context string.
    pub fn derive_subkey(&self, vault_key: &keys::VaultKey, context: &keys::KeyContext) -> keys::EntityKey {
        keys::derive_subkey(vault_key, context)
    }

    /// Generate a fresh random vault key.
    pub fn generate_vault_key(&self) -> keys::VaultKey {
        keys::VaultKey::from_bytes(self.random_bytes())
    }

    /// SHA-256 content hash, hex-encoded.
    pub fn content_hash(&self, bytes: &[u8]) -> hash::ContentHash {
        hash::ContentHash::from_bytes(bytes)
    }
}
