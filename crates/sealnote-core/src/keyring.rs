//! Workspace keyring: the encrypted vault-id → vault-key mapping.
//!
//! The keyring is serialized as JSON and encrypted whole with the master
//! unlock key. It is the only artifact the MUK ever decrypts; everything
//! else hangs off the per-vault keys it contains.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::keys::{MasterUnlockKey, VaultKey};
use crate::crypto::{CryptoContext, CryptoError};
use crate::layout::AAD_KEYRING;

/// Current keyring serialization version.
pub const KEYRING_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum KeyringError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("malformed keyring: {0}")]
    Malformed(String),

    #[error("unsupported keyring version {found} (supported <= {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("unknown vault: {0}")]
    UnknownVault(String),
}

pub type Result<T> = std::result::Result<T, KeyringError>;

/// One vault's entry in the keyring.
#[derive(Clone, Serialize, Deserialize)]
pub struct KeyringEntry {
    /// Base64 of the raw 32-byte vault key.
    key: String,
    /// When the vault was created.
    pub created_at: DateTime<Utc>,
    /// Whether the vault participates in sync.
    pub sync_enabled: bool,
}

impl KeyringEntry {
    fn new(key: &VaultKey, sync_enabled: bool) -> Self {
        Self {
            key: key.to_base64(),
            created_at: Utc::now(),
            sync_enabled,
        }
    }

    /// Decode this entry's vault key.
    pub fn vault_key(&self) -> Result<VaultKey> {
        Ok(VaultKey::from_base64(&self.key)?)
    }
}

impl fmt::Debug for KeyringEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyringEntry")
            .field("key", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("sync_enabled", &self.sync_enabled)
            .finish()
    }
}

/// The decrypted keyring. Lives in memory only while the workspace is
/// unlocked; the owning `Workspace` drops it on lock.
#[derive(Debug, Serialize, Deserialize)]
pub struct Keyring {
    version: u32,
    vaults: BTreeMap<String, KeyringEntry>,
}

impl Default for Keyring {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyring {
    pub fn new() -> Self {
        Self {
            version: KEYRING_VERSION,
            vaults: BTreeMap::new(),
        }
    }

    /// Add (or replace) a vault entry.
    pub fn insert_vault(&mut self, vault_id: &str, key: &VaultKey, sync_enabled: bool) {
        self.vaults
            .insert(vault_id.to_string(), KeyringEntry::new(key, sync_enabled));
    }

    /// Remove a vault entry. Returns true if it existed.
    pub fn remove_vault(&mut self, vault_id: &str) -> bool {
        self.vaults.remove(vault_id).is_some()
    }

    /// Decode the vault key for `vault_id`.
    pub fn vault_key(&self, vault_id: &str) -> Result<VaultKey> {
        self.vaults
            .get(vault_id)
            .ok_or_else(|| KeyringError::UnknownVault(vault_id.to_string()))?
            .vault_key()
    }

    pub fn entry(&self, vault_id: &str) -> Option<&KeyringEntry> {
        self.vaults.get(vault_id)
    }

    pub fn vault_ids(&self) -> impl Iterator<Item = &str> {
        self.vaults.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vaults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vaults.is_empty()
    }

    /// Serialize and encrypt with the MUK.
    pub fn seal(&self, ctx: &CryptoContext, muk: &MasterUnlockKey) -> Result<Vec<u8>> {
        let plaintext = Zeroizing::new(
            serde_json::to_vec(self).map_err(|e| KeyringError::Malformed(e.to_string()))?,
        );
        Ok(ctx.encrypt(muk.as_bytes(), &plaintext, AAD_KEYRING)?)
    }

    /// Decrypt and parse.
    ///
    /// A wrong MUK surfaces only `CryptoError::Authentication`; this is the
    /// sole signal used to reject a wrong password.
    pub fn unseal(ctx: &CryptoContext, muk: &MasterUnlockKey, envelope: &[u8]) -> Result<Self> {
        let plaintext = Zeroizing::new(ctx.decrypt(muk.as_bytes(), envelope, AAD_KEYRING)?);
        let keyring: Keyring = serde_json::from_slice(&plaintext)
            .map_err(|e| KeyringError::Malformed(e.to_string()))?;

        if keyring.version > KEYRING_VERSION {
            return Err(KeyringError::UnsupportedVersion {
                found: keyring.version,
                supported: KEYRING_VERSION,
            });
        }

        Ok(keyring)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KEY_LEN;

    fn test_muk(byte: u8) -> MasterUnlockKey {
        MasterUnlockKey::from_bytes([byte; KEY_LEN])
    }

    fn test_vault_key() -> VaultKey {
        VaultKey::from_bytes([0x5a; KEY_LEN])
    }

    #[test]
    fn test_seal_unseal_roundtrip() {
        let ctx = CryptoContext::new();
        let muk = test_muk(1);

        let mut keyring = Keyring::new();
        keyring.insert_vault("vault-a", &test_vault_key(), true);

        let envelope = keyring.seal(&ctx, &muk).unwrap();
        let restored = Keyring::unseal(&ctx, &muk, &envelope).unwrap();

        assert_eq!(restored.len(), 1);
        assert_eq!(
            restored.vault_key("vault-a").unwrap().as_bytes(),
            test_vault_key().as_bytes()
        );
        assert!(restored.entry("vault-a").unwrap().sync_enabled);
    }

    #[test]
    fn test_wrong_muk_fails_authentication() {
        let ctx = CryptoContext::new();
        let keyring = Keyring::new();

        let envelope = keyring.seal(&ctx, &test_muk(1)).unwrap();
        let result = Keyring::unseal(&ctx, &test_muk(2), &envelope);

        assert!(matches!(
            result,
            Err(KeyringError::Crypto(CryptoError::Authentication))
        ));
    }

    #[test]
    fn test_reencrypt_under_new_muk() {
        // The password-change flow: decrypt with the old MUK, re-encrypt
        // with the new one. The old MUK must stop working.
        let ctx = CryptoContext::new();
        let old_muk = test_muk(1);
        let new_muk = test_muk(2);

        let mut keyring = Keyring::new();
        keyring.insert_vault("vault-a", &test_vault_key(), false);
        let envelope = keyring.seal(&ctx, &old_muk).unwrap();

        let decrypted = Keyring::unseal(&ctx, &old_muk, &envelope).unwrap();
        let reencrypted = decrypted.seal(&ctx, &new_muk).unwrap();

        assert!(Keyring::unseal(&ctx, &old_muk, &reencrypted).is_err());
        let recovered = Keyring::unseal(&ctx, &new_muk, &reencrypted).unwrap();
        assert_eq!(
            recovered.vault_key("vault-a").unwrap().as_bytes(),
            test_vault_key().as_bytes()
        );
    }

    #[test]
    fn test_unknown_vault() {
        let keyring = Keyring::new();
        assert!(matches!(
            keyring.vault_key("nope"),
            Err(KeyringError::UnknownVault(_))
        ));
    }

    #[test]
    fn test_remove_vault() {
        let mut keyring = Keyring::new();
        keyring.insert_vault("vault-a", &test_vault_key(), false);

        assert!(keyring.remove_vault("vault-a"));
        assert!(!keyring.remove_vault("vault-a"));
        assert!(keyring.is_empty());
    }

    #[test]
    fn test_future_version_rejected() {
        let ctx = CryptoContext::new();
        let muk = test_muk(1);

        let mut keyring = Keyring::new();
        keyring.version = KEYRING_VERSION + 1;
        let envelope = keyring.seal(&ctx, &muk).unwrap();

        assert!(matches!(
            Keyring::unseal(&ctx, &muk, &envelope),
            Err(KeyringError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let mut keyring = Keyring::new();
        keyring.insert_vault("vault-a", &test_vault_key(), false);
        let debug = format!("{:?}", keyring);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains(&test_vault_key().to_base64()));
    }
}
