//! Workspace lifecycle: creation, unlock, vault management, password change.
//!
//! A workspace is the unit a password protects. Unlock derives the master
//! unlock key on a blocking thread (Argon2id is deliberately slow), decrypts
//! the keyring, and keeps both in memory until `lock`; dropping them
//! zeroizes the secrets.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::crypto::kdf::{KdfParams, SALT_LEN};
use crate::crypto::keys::{MasterUnlockKey, VaultKey};
use crate::crypto::{CryptoContext, CryptoError};
use crate::fs::{FileSystem, FsError};
use crate::keyring::{Keyring, KeyringError};
use crate::layout;
use crate::vault::{UnlockedVault, Vault, VaultError, VaultMetadata};

/// Current workspace config version.
pub const WORKSPACE_VERSION: u32 = 1;

const MARKER_CONTENT: &[u8] = b"sealnote workspace\n";

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Keyring(#[from] KeyringError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("not a workspace (missing {0})")]
    NotAWorkspace(String),

    #[error("workspace already exists")]
    AlreadyExists,

    #[error("workspace is locked")]
    Locked,

    #[error("malformed workspace config: {0}")]
    MalformedConfig(String),

    #[error("background task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, WorkspaceError>;

/// Plaintext workspace configuration: everything needed to re-derive the
/// MUK from a password, and nothing secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    pub version: u32,
    /// Base64 of the random per-workspace KDF salt.
    pub salt: String,
    pub kdf: KdfParams,
}

impl WorkspaceConfig {
    fn new(ctx: &CryptoContext, kdf: KdfParams) -> Self {
        let salt: [u8; SALT_LEN] = ctx.random_bytes();
        Self {
            version: WORKSPACE_VERSION,
            salt: BASE64.encode(salt),
            kdf,
        }
    }

    pub fn salt_bytes(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(&self.salt)
            .map_err(|e| WorkspaceError::MalformedConfig(format!("bad salt: {}", e)))
    }
}

/// Session-only unlocked state. Dropped (and zeroized) on lock.
struct Unlocked {
    muk: MasterUnlockKey,
    keyring: Keyring,
}

/// A workspace rooted at a `FileSystem`.
pub struct Workspace<F: FileSystem> {
    fs: F,
    config: WorkspaceConfig,
    unlocked: Option<Unlocked>,
}

impl<F: FileSystem> Workspace<F> {
    /// Create a new workspace: marker, config, and an empty keyring
    /// encrypted under the given password. Returns the workspace unlocked.
    pub async fn create(
        fs: F,
        ctx: &CryptoContext,
        password: &str,
        kdf: KdfParams,
    ) -> Result<Self> {
        if fs.exists(layout::WORKSPACE_MARKER).await? {
            return Err(WorkspaceError::AlreadyExists);
        }

        let config = WorkspaceConfig::new(ctx, kdf);
        let salt = config.salt_bytes()?;
        let muk = derive_muk(ctx, password, salt, config.kdf.clone()).await?;

        fs.write(layout::WORKSPACE_MARKER, MARKER_CONTENT).await?;
        let config_json = serde_json::to_vec_pretty(&config)
            .map_err(|e| WorkspaceError::MalformedConfig(e.to_string()))?;
        fs.write_atomic(layout::WORKSPACE_CONFIG, &config_json).await?;

        let keyring = Keyring::new();
        let envelope = keyring.seal(ctx, &muk)?;
        fs.write_atomic(layout::KEYRING_FILE, &envelope).await?;

        tracing::info!("Created workspace");

        Ok(Self {
            fs,
            config,
            unlocked: Some(Unlocked { muk, keyring }),
        })
    }

    /// Open an existing workspace in the locked state.
    pub async fn open(fs: F) -> Result<Self> {
        if !fs.exists(layout::WORKSPACE_MARKER).await? {
            return Err(WorkspaceError::NotAWorkspace(
                layout::WORKSPACE_MARKER.to_string(),
            ));
        }

        let config_bytes = fs
            .read_if_exists(layout::WORKSPACE_CONFIG)
            .await?
            .ok_or_else(|| WorkspaceError::NotAWorkspace(layout::WORKSPACE_CONFIG.to_string()))?;
        let config: WorkspaceConfig = serde_json::from_slice(&config_bytes)
            .map_err(|e| WorkspaceError::MalformedConfig(e.to_string()))?;

        Ok(Self {
            fs,
            config,
            unlocked: None,
        })
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked.is_some()
    }

    /// Unlock with a password.
    ///
    /// The KDF runs on a blocking thread so the event loop stays free for
    /// file-change handling. A wrong password surfaces as
    /// `CryptoError::Authentication` from the keyring, deliberately the
    /// same error a corrupted keyring file produces.
    pub async fn unlock(&mut self, ctx: &CryptoContext, password: &str) -> Result<()> {
        let salt = self.config.salt_bytes()?;
        let muk = derive_muk(ctx, password, salt, self.config.kdf.clone()).await?;

        let envelope = self.fs.read(layout::KEYRING_FILE).await?;
        let keyring = Keyring::unseal(ctx, &muk, &envelope)?;

        self.unlocked = Some(Unlocked { muk, keyring });
        tracing::info!("Workspace unlocked ({} vaults)", self.keyring()?.len());
        Ok(())
    }

    /// Drop the MUK and decrypted keyring. Secrets zeroize on drop.
    pub fn lock(&mut self) {
        self.unlocked = None;
    }

    /// The decrypted keyring. Fails while locked.
    pub fn keyring(&self) -> Result<&Keyring> {
        self.unlocked
            .as_ref()
            .map(|u| &u.keyring)
            .ok_or(WorkspaceError::Locked)
    }

    /// Decode the vault key for `vault_id` from the keyring.
    pub fn vault_key(&self, vault_id: &str) -> Result<VaultKey> {
        Ok(self.keyring()?.vault_key(vault_id)?)
    }

    /// List vault metadata without unlocking anything: the metadata files
    /// are plaintext by design. Unreadable entries are skipped with a
    /// warning.
    pub async fn discover_vaults(&self) -> Result<Vec<VaultMetadata>> {
        if !self.fs.exists(layout::VAULTS_DIR).await? {
            return Ok(Vec::new());
        }

        let mut vaults = Vec::new();
        for entry in self.fs.list(layout::VAULTS_DIR).await? {
            if !entry.is_dir {
                continue;
            }
            let meta_path = layout::vault_meta_path(&entry.name);
            match self.fs.read_if_exists(&meta_path).await? {
                Some(bytes) => match serde_json::from_slice::<VaultMetadata>(&bytes) {
                    Ok(meta) => vaults.push(meta),
                    Err(e) => {
                        tracing::warn!("Skipping vault {} with bad metadata: {}", entry.name, e);
                    }
                },
                None => {
                    tracing::warn!("Skipping vault directory {} without metadata", entry.name);
                }
            }
        }

        vaults.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(vaults)
    }
}

impl<F: FileSystem + Clone> Workspace<F> {
    /// Create a vault: generate its random key, record it in the keyring
    /// (persisted atomically before any vault file exists), then write the
    /// vault's plaintext structure.
    pub async fn create_vault(
        &mut self,
        ctx: &CryptoContext,
        name: &str,
        sync_enabled: bool,
    ) -> Result<VaultMetadata> {
        if self.unlocked.is_none() {
            return Err(WorkspaceError::Locked);
        }

        let vault_id = uuid::Uuid::new_v4().to_string();
        let key = ctx.generate_vault_key();

        if let Some(unlocked) = self.unlocked.as_mut() {
            unlocked.keyring.insert_vault(&vault_id, &key, sync_enabled);
        }
        self.persist_keyring(ctx).await?;

        let meta = VaultMetadata::new(&vault_id, name);
        Vault::create(self.fs.clone(), meta.clone()).await?;

        Ok(meta)
    }

    /// Remove a vault's key from the keyring.
    ///
    /// The vault's files stay on disk; without the key they are inert
    /// ciphertext, and a cloud-synced copy on another device may still hold
    /// the key.
    pub async fn remove_vault(&mut self, ctx: &CryptoContext, vault_id: &str) -> Result<()> {
        let Some(unlocked) = self.unlocked.as_mut() else {
            return Err(WorkspaceError::Locked);
        };

        if !unlocked.keyring.remove_vault(vault_id) {
            return Err(WorkspaceError::Keyring(KeyringError::UnknownVault(
                vault_id.to_string(),
            )));
        }
        self.persist_keyring(ctx).await?;

        tracing::info!("Removed vault {} from keyring", vault_id);
        Ok(())
    }

    /// Open and unlock a vault with its key from the keyring.
    pub async fn unlock_vault(
        &self,
        ctx: &CryptoContext,
        vault_id: &str,
    ) -> Result<UnlockedVault<F>> {
        let key = self.vault_key(vault_id)?;
        let vault = Vault::open(self.fs.clone(), vault_id).await?;
        Ok(vault.unlock(ctx, key)?)
    }

    /// Change the master password.
    ///
    /// All-or-nothing: the re-encrypted keyring is written to a temp file
    /// and atomically renamed over the old one. Any failure before the
    /// rename (including a wrong old password) leaves the old ciphertext
    /// on disk untouched.
    pub async fn change_password(
        &mut self,
        ctx: &CryptoContext,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let salt = self.config.salt_bytes()?;

        let old_muk = derive_muk(ctx, old_password, salt.clone(), self.config.kdf.clone()).await?;
        let envelope = self.fs.read(layout::KEYRING_FILE).await?;
        let keyring = Keyring::unseal(ctx, &old_muk, &envelope)?;

        let new_muk = derive_muk(ctx, new_password, salt, self.config.kdf.clone()).await?;
        let new_envelope = keyring.seal(ctx, &new_muk)?;
        self.fs
            .write_atomic(layout::KEYRING_FILE, &new_envelope)
            .await?;

        self.unlocked = Some(Unlocked {
            muk: new_muk,
            keyring,
        });

        tracing::info!("Master password changed");
        Ok(())
    }

    async fn persist_keyring(&self, ctx: &CryptoContext) -> Result<()> {
        let unlocked = self.unlocked.as_ref().ok_or(WorkspaceError::Locked)?;
        let envelope = unlocked.keyring.seal(ctx, &unlocked.muk)?;
        self.fs
            .write_atomic(layout::KEYRING_FILE, &envelope)
            .await?;
        Ok(())
    }
}

/// Run the memory-hard KDF on a blocking thread.
async fn derive_muk(
    ctx: &CryptoContext,
    password: &str,
    salt: Vec<u8>,
    params: KdfParams,
) -> Result<MasterUnlockKey> {
    let ctx = ctx.clone();
    let password = Zeroizing::new(password.as_bytes().to_vec());

    tokio::task::spawn_blocking(move || ctx.derive_unlock_key(&password, &salt, &params))
        .await
        .map_err(|e| WorkspaceError::Task(e.to_string()))?
        .map_err(WorkspaceError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFs;
    use std::sync::Arc;

    async fn create_test_workspace(
        fs: Arc<InMemoryFs>,
        password: &str,
    ) -> Workspace<Arc<InMemoryFs>> {
        let ctx = CryptoContext::new();
        Workspace::create(fs, &ctx, password, KdfParams::fast_insecure())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_writes_layout() {
        let fs = Arc::new(InMemoryFs::new());
        let workspace = create_test_workspace(Arc::clone(&fs), "correct-horse").await;

        assert!(workspace.is_unlocked());
        assert!(fs.exists(".workspace-marker").await.unwrap());
        assert!(fs.exists(".workspace.json").await.unwrap());
        assert!(fs.exists(".keyring.enc").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let fs = Arc::new(InMemoryFs::new());
        create_test_workspace(Arc::clone(&fs), "pw").await;

        let ctx = CryptoContext::new();
        let result = Workspace::create(fs, &ctx, "pw", KdfParams::fast_insecure()).await;
        assert!(matches!(result, Err(WorkspaceError::AlreadyExists)));
    }

    #[tokio::test]
    async fn test_open_requires_marker() {
        let fs = Arc::new(InMemoryFs::new());
        assert!(matches!(
            Workspace::open(fs).await,
            Err(WorkspaceError::NotAWorkspace(_))
        ));
    }

    #[tokio::test]
    async fn test_unlock_with_correct_password() {
        let fs = Arc::new(InMemoryFs::new());
        create_test_workspace(Arc::clone(&fs), "correct-horse").await;

        let ctx = CryptoContext::new();
        let mut workspace = Workspace::open(fs).await.unwrap();
        assert!(!workspace.is_unlocked());

        workspace.unlock(&ctx, "correct-horse").await.unwrap();
        assert!(workspace.is_unlocked());
        assert!(workspace.keyring().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unlock_with_wrong_password_fails_closed() {
        let fs = Arc::new(InMemoryFs::new());
        create_test_workspace(Arc::clone(&fs), "correct-horse").await;

        let ctx = CryptoContext::new();
        let mut workspace = Workspace::open(fs).await.unwrap();
        let result = workspace.unlock(&ctx, "wrong-password").await;

        // A wrong password is indistinguishable from a corrupted keyring
        assert!(matches!(
            result,
            Err(WorkspaceError::Keyring(KeyringError::Crypto(
                CryptoError::Authentication
            )))
        ));
        assert!(!workspace.is_unlocked());
    }

    #[tokio::test]
    async fn test_lock_discards_state() {
        let fs = Arc::new(InMemoryFs::new());
        let mut workspace = create_test_workspace(fs, "pw").await;

        workspace.lock();
        assert!(!workspace.is_unlocked());
        assert!(matches!(workspace.keyring(), Err(WorkspaceError::Locked)));
    }

    #[tokio::test]
    async fn test_create_vault_and_unlock_it() {
        let fs = Arc::new(InMemoryFs::new());
        let mut workspace = create_test_workspace(Arc::clone(&fs), "pw").await;

        let ctx = CryptoContext::new();
        let meta = workspace.create_vault(&ctx, "Personal", true).await.unwrap();

        // Keyring knows the vault
        assert_eq!(workspace.keyring().unwrap().len(), 1);
        assert!(
            workspace
                .keyring()
                .unwrap()
                .entry(&meta.vault_id)
                .unwrap()
                .sync_enabled
        );

        // The vault unlocks with its keyring key
        let unlocked = workspace.unlock_vault(&ctx, &meta.vault_id).await.unwrap();
        assert_eq!(unlocked.vault_id(), meta.vault_id);
        assert_eq!(unlocked.metadata().name, "Personal");
    }

    #[tokio::test]
    async fn test_create_vault_while_locked_fails() {
        let fs = Arc::new(InMemoryFs::new());
        let mut workspace = create_test_workspace(fs, "pw").await;
        workspace.lock();

        let ctx = CryptoContext::new();
        assert!(matches!(
            workspace.create_vault(&ctx, "Nope", false).await,
            Err(WorkspaceError::Locked)
        ));
    }

    #[tokio::test]
    async fn test_discover_vaults_without_unlock() {
        let fs = Arc::new(InMemoryFs::new());
        let mut workspace = create_test_workspace(Arc::clone(&fs), "pw").await;

        let ctx = CryptoContext::new();
        workspace.create_vault(&ctx, "Beta", false).await.unwrap();
        workspace.create_vault(&ctx, "Alpha", false).await.unwrap();

        // Fresh locked workspace can still list vaults
        let locked = Workspace::open(fs).await.unwrap();
        let vaults = locked.discover_vaults().await.unwrap();
        let names: Vec<&str> = vaults.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);
    }

    #[tokio::test]
    async fn test_remove_vault() {
        let fs = Arc::new(InMemoryFs::new());
        let mut workspace = create_test_workspace(fs, "pw").await;

        let ctx = CryptoContext::new();
        let meta = workspace.create_vault(&ctx, "Doomed", false).await.unwrap();
        workspace.remove_vault(&ctx, &meta.vault_id).await.unwrap();

        assert!(workspace.keyring().unwrap().is_empty());
        assert!(workspace.unlock_vault(&ctx, &meta.vault_id).await.is_err());
    }

    #[tokio::test]
    async fn test_change_password() {
        let fs = Arc::new(InMemoryFs::new());
        let mut workspace = create_test_workspace(Arc::clone(&fs), "old-password").await;

        let ctx = CryptoContext::new();
        let meta = workspace.create_vault(&ctx, "Personal", false).await.unwrap();
        let original_key = workspace.vault_key(&meta.vault_id).unwrap();

        workspace
            .change_password(&ctx, "old-password", "new-password")
            .await
            .unwrap();

        // Old password no longer unlocks
        let mut reopened = Workspace::open(Arc::clone(&fs)).await.unwrap();
        assert!(reopened.unlock(&ctx, "old-password").await.is_err());

        // New password recovers the original vault key
        reopened.unlock(&ctx, "new-password").await.unwrap();
        assert_eq!(
            reopened.vault_key(&meta.vault_id).unwrap().as_bytes(),
            original_key.as_bytes()
        );
    }

    #[tokio::test]
    async fn test_failed_password_change_leaves_keyring_intact() {
        let fs = Arc::new(InMemoryFs::new());
        let mut workspace = create_test_workspace(Arc::clone(&fs), "right").await;

        let ctx = CryptoContext::new();
        let before = fs.read(".keyring.enc").await.unwrap();

        // Wrong old password: fails before any write
        let result = workspace.change_password(&ctx, "wrong", "new").await;
        assert!(result.is_err());

        let after = fs.read(".keyring.enc").await.unwrap();
        assert_eq!(before, after);

        // Original password still works
        let mut reopened = Workspace::open(fs).await.unwrap();
        reopened.unlock(&ctx, "right").await.unwrap();
    }

    #[tokio::test]
    async fn test_kdf_params_persisted_in_config() {
        let fs = Arc::new(InMemoryFs::new());
        create_test_workspace(Arc::clone(&fs), "pw").await;

        let config_bytes = fs.read(".workspace.json").await.unwrap();
        let config: WorkspaceConfig = serde_json::from_slice(&config_bytes).unwrap();
        assert_eq!(config.kdf, KdfParams::fast_insecure());
        assert_eq!(config.salt_bytes().unwrap().len(), SALT_LEN);
    }
}
