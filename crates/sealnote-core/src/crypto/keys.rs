//! Key types and sub-key derivation.
//!
//! The hierarchy has three tiers:
//!
//! ```text
//! password ──Argon2id──▶ MasterUnlockKey (session only, never persisted)
//!                              │ decrypts
//!                              ▼
//!                      workspace keyring ──▶ VaultKey (random, per vault)
//!                                                │ HKDF-SHA256
//!                                                ▼
//!                          EntityKey (content / notebook / group / share / …)
//! ```
//!
//! All key types zeroize their memory on drop. Raw bytes are exposed only
//! through `as_bytes()` for immediate use; nothing stores the returned slice.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{CryptoError, Result};

/// Length of every key in the hierarchy (256-bit).
pub const KEY_LEN: usize = 32;

/// Version tag appended to every derivation context string, so a future
/// scheme change can coexist with keys derived under the old scheme.
const SUBKEY_SCHEME_VERSION: &str = "v1";

/// Session-only key derived from the user's password.
///
/// Decrypts the workspace keyring and nothing else. Never written to disk;
/// zeroized when the workspace is locked or the value is otherwise dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterUnlockKey {
    bytes: [u8; KEY_LEN],
}

impl MasterUnlockKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for MasterUnlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterUnlockKey([REDACTED])")
    }
}

/// Random per-vault root key.
///
/// Generated once when the vault is created, never derived from a password.
/// Owned by the keyring; copied into memory only while the vault is unlocked.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey {
    bytes: [u8; KEY_LEN],
}

impl VaultKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Decode from the base64 representation stored in the keyring.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let raw = BASE64
            .decode(encoded)
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: 0,
            })?;
        let bytes: [u8; KEY_LEN] = raw.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: raw.len(),
            }
        })?;
        Ok(Self { bytes })
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VaultKey([REDACTED])")
    }
}

/// A key derived from a vault key for one specific entity.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EntityKey {
    bytes: [u8; KEY_LEN],
}

impl EntityKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityKey([REDACTED])")
    }
}

/// Domain-separating context for sub-key derivation.
///
/// Rendered as `<namespace>.<entity-id>.<version>`. Two different entity ids
/// can never produce the same info string, and therefore never the same
/// derived key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyContext {
    namespace: &'static str,
    entity_id: String,
}

impl KeyContext {
    /// Key for one note's body.
    pub fn content(note_id: &str) -> Self {
        Self::new("content", note_id)
    }

    /// Key for one notebook's encrypted attributes.
    pub fn notebook(notebook_id: &str) -> Self {
        Self::new("notebook", notebook_id)
    }

    /// Key for a note group.
    pub fn group(group_id: &str) -> Self {
        Self::new("group", group_id)
    }

    /// Key wrapping a single shared note.
    pub fn note_share(note_id: &str) -> Self {
        Self::new("share", note_id)
    }

    /// Key for the vault's encrypted index files.
    pub fn index(vault_id: &str) -> Self {
        Self::new("index", vault_id)
    }

    /// Key for the vault's sync cursor and pending operations.
    pub fn sync(vault_id: &str) -> Self {
        Self::new("sync", vault_id)
    }

    fn new(namespace: &'static str, entity_id: &str) -> Self {
        Self {
            namespace,
            entity_id: entity_id.to_string(),
        }
    }

    /// The HKDF info string: `<namespace>.<entity-id>.<version>`.
    pub fn info(&self) -> String {
        format!("{}.{}.{}", self.namespace, self.entity_id, SUBKEY_SCHEME_VERSION)
    }
}

/// Derive an entity key from a vault key.
///
/// HKDF-SHA256, extract-then-expand. The extract phase uses an empty salt
/// (treated by HKDF as a zero-filled salt of hash length); the expand phase
/// binds the context's info string. Infallible for 32-byte output.
pub fn derive_subkey(vault_key: &VaultKey, context: &KeyContext) -> EntityKey {
    let hk = Hkdf::<Sha256>::new(None, vault_key.as_bytes());
    let mut bytes = [0u8; KEY_LEN];
    hk.expand(context.info().as_bytes(), &mut bytes)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    EntityKey { bytes }
}
