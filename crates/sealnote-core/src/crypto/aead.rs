//! Authenticated encryption with the fixed sealnote envelope layout.
//!
//! Every encrypted artifact in a workspace (keyring, index files, note
//! bodies, sync cursor, pending operations) uses the same byte layout:
//!
//! ```text
//! nonce (24 bytes) || ciphertext || authentication tag (16 bytes)
//! ```
//!
//! XChaCha20-Poly1305 with a random per-message nonce. The 192-bit nonce
//! space makes random nonces safe without coordination between writers.

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};

use super::keys::KEY_LEN;
use super::{CryptoError, Result};

/// XChaCha20-Poly1305 nonce length.
pub const NONCE_LEN: usize = 24;
/// Poly1305 authentication tag length.
pub const TAG_LEN: usize = 16;

/// Encrypt `plaintext` under `key` with associated data `aad`.
///
/// Returns the full envelope. A fresh random nonce is generated for every
/// call, so encrypting the same plaintext twice yields different bytes.
pub fn seal(key: &[u8; KEY_LEN], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::Encrypt)?;

    let mut envelope = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

/// Decrypt an envelope produced by [`seal`].
///
/// Fails closed with [`CryptoError::Authentication`] on a wrong key, a
/// flipped bit anywhere in the envelope, or mismatched associated data.
pub fn open(key: &[u8; KEY_LEN], envelope: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if envelope.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::TruncatedEnvelope(envelope.len()));
    }

    let (nonce, ciphertext) = envelope.split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new(key.into());

    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; KEY_LEN] {
        [0x42; KEY_LEN]
    }

    #[test]
    fn test_roundtrip() {
        let key = test_key();
        let envelope = seal(&key, b"hello world", b"aad").unwrap();
        let plaintext = open(&key, &envelope, b"aad").unwrap();
        assert_eq!(plaintext, b"hello world");
    }

    #[test]
    fn test_roundtrip_empty_aad() {
        let key = test_key();
        let envelope = seal(&key, b"payload", b"").unwrap();
        assert_eq!(open(&key, &envelope, b"").unwrap(), b"payload");
    }

    #[test]
    fn test_envelope_layout() {
        let key = test_key();
        let envelope = seal(&key, b"abc", b"").unwrap();
        // nonce + plaintext + tag
        assert_eq!(envelope.len(), NONCE_LEN + 3 + TAG_LEN);
    }

    #[test]
    fn test_nonce_uniqueness() {
        // Same key, same plaintext: the random nonce must make the full
        // envelope differ between calls.
        let key = test_key();
        let a = seal(&key, b"same plaintext", b"").unwrap();
        let b = seal(&key, b"same plaintext", b"").unwrap();
        assert_ne!(a, b);
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
    }

    #[test]
    fn test_wrong_key_fails() {
        let envelope = seal(&test_key(), b"secret", b"").unwrap();
        let wrong = [0x43; KEY_LEN];
        assert!(matches!(
            open(&wrong, &envelope, b""),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn test_wrong_aad_fails() {
        let key = test_key();
        let envelope = seal(&key, b"secret", b"context-a").unwrap();
        assert!(matches!(
            open(&key, &envelope, b"context-b"),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn test_tamper_detection_every_byte() {
        // Flipping a single bit anywhere in the envelope (nonce, ciphertext,
        // or tag) must cause decryption to fail.
        let key = test_key();
        let envelope = seal(&key, b"tamper target", b"").unwrap();

        for i in 0..envelope.len() {
            let mut corrupted = envelope.clone();
            corrupted[i] ^= 0x01;
            assert!(
                open(&key, &corrupted, b"").is_err(),
                "bit flip at byte {} was not detected",
                i
            );
        }
    }

    #[test]
    fn test_truncated_envelope_rejected() {
        let key = test_key();
        assert!(matches!(
            open(&key, &[0u8; NONCE_LEN + TAG_LEN - 1], b""),
            Err(CryptoError::TruncatedEnvelope(_))
        ));
        assert!(open(&key, &[], b"").is_err());
    }
}
