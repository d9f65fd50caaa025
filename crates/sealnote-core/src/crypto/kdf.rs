//! Password key derivation with Argon2id.
//!
//! Turns a password and a per-workspace random salt into the master unlock
//! key. Cost parameters are chosen once at workspace creation and persisted
//! in the plaintext workspace config, so an old workspace keeps unlocking
//! after the defaults change.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::keys::{MasterUnlockKey, KEY_LEN};
use super::{CryptoError, Result};

/// Length of the per-workspace KDF salt.
pub const SALT_LEN: usize = 16;

/// Argon2id cost parameters.
///
/// Persisted next to the salt in `.workspace.json`; changing the defaults
/// here only affects newly created workspaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Time cost (iterations).
    pub iterations: u32,
    /// Lanes.
    pub parallelism: u32,
}

impl Default for KdfParams {
    /// Interactive-unlock profile: 64 MiB, 3 iterations, 1 lane.
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 3,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Deliberately weak parameters for tests. Never use outside tests.
    pub fn fast_insecure() -> Self {
        Self {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Derive the 32-byte master unlock key from a password.
///
/// Deterministic: the same (password, salt, params) triple always yields the
/// same key bits.
pub fn derive_unlock_key(password: &[u8], salt: &[u8], params: &KdfParams) -> Result<MasterUnlockKey> {
    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password, salt, &mut key[..])
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok(MasterUnlockKey::from_bytes(*key))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT_A: &[u8] = b"0123456789abcdef";
    const SALT_B: &[u8] = b"fedcba9876543210";

    #[test]
    fn test_derivation_is_deterministic() {
        let params = KdfParams::fast_insecure();
        let a = derive_unlock_key(b"correct-horse", SALT_A, &params).unwrap();
        let b = derive_unlock_key(b"correct-horse", SALT_A, &params).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_eq!(a.as_bytes().len(), KEY_LEN);
    }

    #[test]
    fn test_different_salts_different_keys() {
        let params = KdfParams::fast_insecure();
        let a = derive_unlock_key(b"correct-horse", SALT_A, &params).unwrap();
        let b = derive_unlock_key(b"correct-horse", SALT_B, &params).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_different_passwords_different_keys() {
        let params = KdfParams::fast_insecure();
        let a = derive_unlock_key(b"correct-horse", SALT_A, &params).unwrap();
        let b = derive_unlock_key(b"battery-staple", SALT_A, &params).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_different_params_different_keys() {
        let weak = KdfParams::fast_insecure();
        let weaker = KdfParams {
            iterations: 2,
            ..KdfParams::fast_insecure()
        };
        let a = derive_unlock_key(b"correct-horse", SALT_A, &weak).unwrap();
        let b = derive_unlock_key(b"correct-horse", SALT_A, &weaker).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_params_serde_roundtrip() {
        let params = KdfParams::default();
        let json = serde_json::to_string(&params).unwrap();
        let parsed: KdfParams = serde_json::from_str(&json).unwrap();
        assert_eq!(params, parsed);
    }
}
