//! Content hashing for deduplication and change detection.
//!
//! The file watcher hashes ciphertext to suppress spurious change events,
//! and the sync log uses the same primitive to content-address operations.

use sha2::{Digest, Sha256};

/// A SHA-256 content hash, hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Compute the hash of raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(
            ContentHash::from_bytes(b"hello"),
            ContentHash::from_bytes(b"hello")
        );
    }

    #[test]
    fn test_different_content_different_hash() {
        assert_ne!(
            ContentHash::from_bytes(b"hello"),
            ContentHash::from_bytes(b"world")
        );
    }

    #[test]
    fn test_hex_length() {
        // SHA-256 hex is 64 characters
        assert_eq!(ContentHash::from_bytes(b"x").as_str().len(), 64);
    }
}
