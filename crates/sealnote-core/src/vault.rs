//! Vault lifecycle: creation, discovery, unlock, and per-entity keys.
//!
//! A vault never derives or stores its own root key: the `VaultKey` arrives
//! pre-generated from the workspace keyring. Creation only writes the
//! plaintext structure (directories, header, metadata); unlock verifies
//! header compatibility and hands back a handle that caches the hot derived
//! keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::keys::{EntityKey, KeyContext, VaultKey};
use crate::crypto::{CryptoContext, CryptoError};
use crate::fs::{FileSystem, FsError};
use crate::index::{self, IndexError, NoteRecord, NotebookRecord};
use crate::layout;

/// Highest vault format version this build can open.
pub const VAULT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("vault not found: {0}")]
    NotFound(String),

    #[error("vault already exists: {0}")]
    AlreadyExists(String),

    #[error("corrupt vault header: {0}")]
    CorruptHeader(String),

    #[error("corrupt vault metadata: {0}")]
    CorruptMetadata(String),

    #[error("unsupported vault version {found} (supported <= {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

pub type Result<T> = std::result::Result<T, VaultError>;

/// Plaintext vault header, written once at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultHeader {
    pub version: u32,
    pub vault_id: String,
    pub created_at: DateTime<Utc>,
}

/// Plaintext vault metadata. Intentionally unencrypted so vaults can be
/// listed and displayed before unlock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultMetadata {
    pub version: u32,
    pub vault_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl VaultMetadata {
    pub fn new(vault_id: &str, name: &str) -> Self {
        let now = Utc::now();
        Self {
            version: VAULT_FORMAT_VERSION,
            vault_id: vault_id.to_string(),
            name: name.to_string(),
            description: None,
            icon: None,
            color: None,
            created_at: now,
            modified_at: now,
        }
    }
}

/// A discovered (but locked) vault.
pub struct Vault<F: FileSystem> {
    fs: F,
    header: VaultHeader,
    meta: VaultMetadata,
}

impl<F: FileSystem> Vault<F> {
    /// Create the on-disk structure for a new vault.
    ///
    /// Writes, in order: directory structure, plaintext header, plaintext
    /// metadata. No key material is involved.
    pub async fn create(fs: F, meta: VaultMetadata) -> Result<Self> {
        let vault_id = meta.vault_id.clone();

        if fs.exists(&layout::vault_header_path(&vault_id)).await? {
            return Err(VaultError::AlreadyExists(vault_id));
        }

        fs.mkdir(&layout::vault_dir(&vault_id)).await?;
        fs.mkdir(&layout::notes_dir(&vault_id)).await?;
        fs.mkdir(&layout::refs_dir(&vault_id)).await?;
        fs.mkdir(&layout::sync_dir(&vault_id)).await?;
        fs.mkdir(&layout::pending_dir(&vault_id)).await?;

        let header = VaultHeader {
            version: VAULT_FORMAT_VERSION,
            vault_id: vault_id.clone(),
            created_at: meta.created_at,
        };
        let header_json = serde_json::to_vec_pretty(&header)
            .map_err(|e| VaultError::CorruptHeader(e.to_string()))?;
        fs.write_atomic(&layout::vault_header_path(&vault_id), &header_json)
            .await?;

        let meta_json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| VaultError::CorruptMetadata(e.to_string()))?;
        fs.write_atomic(&layout::vault_meta_path(&vault_id), &meta_json)
            .await?;

        tracing::info!("Created vault {} ({})", meta.name, vault_id);

        Ok(Self { fs, header, meta })
    }

    /// Open an existing vault by reading its plaintext header and metadata.
    pub async fn open(fs: F, vault_id: &str) -> Result<Self> {
        let header_bytes = fs
            .read_if_exists(&layout::vault_header_path(vault_id))
            .await?
            .ok_or_else(|| VaultError::NotFound(vault_id.to_string()))?;
        let header: VaultHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| VaultError::CorruptHeader(e.to_string()))?;

        if header.vault_id != vault_id {
            return Err(VaultError::CorruptHeader(format!(
                "header vault id {} does not match directory {}",
                header.vault_id, vault_id
            )));
        }

        let meta_bytes = fs.read(&layout::vault_meta_path(vault_id)).await?;
        let meta: VaultMetadata = serde_json::from_slice(&meta_bytes)
            .map_err(|e| VaultError::CorruptMetadata(e.to_string()))?;

        Ok(Self { fs, header, meta })
    }

    pub fn vault_id(&self) -> &str {
        &self.header.vault_id
    }

    pub fn header(&self) -> &VaultHeader {
        &self.header
    }

    pub fn metadata(&self) -> &VaultMetadata {
        &self.meta
    }

    /// Unlock the vault with its root key.
    ///
    /// Verifies header compatibility (a newer on-disk format is fatal, never
    /// silently downgraded) and eagerly derives the hot keys so later index
    /// and sync operations reuse them instead of re-deriving.
    pub fn unlock(self, ctx: &CryptoContext, key: VaultKey) -> Result<UnlockedVault<F>> {
        if self.header.version > VAULT_FORMAT_VERSION {
            return Err(VaultError::UnsupportedVersion {
                found: self.header.version,
                supported: VAULT_FORMAT_VERSION,
            });
        }

        let index_key = ctx.derive_subkey(&key, &KeyContext::index(self.vault_id()));
        let sync_key = ctx.derive_subkey(&key, &KeyContext::sync(self.vault_id()));

        Ok(UnlockedVault {
            vault: self,
            key,
            index_key,
            sync_key,
        })
    }
}

/// An unlocked vault: the root key plus cached hot derived keys.
///
/// Exactly one unlocked handle per vault is assumed. Dropping the handle
/// zeroizes the root key and all cached derived keys.
pub struct UnlockedVault<F: FileSystem> {
    vault: Vault<F>,
    key: VaultKey,
    /// Cached: derived once at unlock, reused for every index read/write.
    index_key: EntityKey,
    /// Cached: derived once at unlock, reused for the cursor and op log.
    sync_key: EntityKey,
}

impl<F: FileSystem> UnlockedVault<F> {
    pub fn vault_id(&self) -> &str {
        self.vault.vault_id()
    }

    pub fn metadata(&self) -> &VaultMetadata {
        self.vault.metadata()
    }

    pub fn fs(&self) -> &F {
        &self.vault.fs
    }

    /// The cached search-index key.
    pub fn index_key(&self) -> &EntityKey {
        &self.index_key
    }

    /// The cached sync-log key.
    pub fn sync_key(&self) -> &EntityKey {
        &self.sync_key
    }

    /// Derive the content key for one note.
    pub fn content_key(&self, ctx: &CryptoContext, note_id: &str) -> EntityKey {
        ctx.derive_subkey(&self.key, &KeyContext::content(note_id))
    }

    /// Derive the key for one notebook.
    pub fn notebook_key(&self, ctx: &CryptoContext, notebook_id: &str) -> EntityKey {
        ctx.derive_subkey(&self.key, &KeyContext::notebook(notebook_id))
    }

    /// Derive the key for a note group.
    pub fn group_key(&self, ctx: &CryptoContext, group_id: &str) -> EntityKey {
        ctx.derive_subkey(&self.key, &KeyContext::group(group_id))
    }

    /// Derive the wrapping key for sharing a single note.
    pub fn note_share_key(&self, ctx: &CryptoContext, note_id: &str) -> EntityKey {
        ctx.derive_subkey(&self.key, &KeyContext::note_share(note_id))
    }

    // ========== Encrypted indexes ==========

    /// Load the note index. A missing file is an empty index.
    pub async fn load_note_index(&self, ctx: &CryptoContext) -> Result<Vec<NoteRecord>> {
        self.load_index(ctx, &layout::notes_index_path(self.vault_id()), layout::AAD_NOTES_INDEX, "note")
            .await
    }

    pub async fn save_note_index(&self, ctx: &CryptoContext, records: &[NoteRecord]) -> Result<()> {
        self.save_index(ctx, &layout::notes_index_path(self.vault_id()), layout::AAD_NOTES_INDEX, records)
            .await
    }

    /// Load the notebook index. A missing file is an empty index.
    pub async fn load_notebook_index(&self, ctx: &CryptoContext) -> Result<Vec<NotebookRecord>> {
        self.load_index(
            ctx,
            &layout::notebooks_index_path(self.vault_id()),
            layout::AAD_NOTEBOOKS_INDEX,
            "notebook",
        )
        .await
    }

    pub async fn save_notebook_index(
        &self,
        ctx: &CryptoContext,
        records: &[NotebookRecord],
    ) -> Result<()> {
        self.save_index(
            ctx,
            &layout::notebooks_index_path(self.vault_id()),
            layout::AAD_NOTEBOOKS_INDEX,
            records,
        )
        .await
    }

    /// Load the tag list. A missing file is an empty list.
    pub async fn load_tags(&self, ctx: &CryptoContext) -> Result<Vec<String>> {
        let path = layout::tags_path(self.vault_id());
        let Some(envelope) = self.vault.fs.read_if_exists(&path).await? else {
            return Ok(Vec::new());
        };
        let plaintext = ctx.decrypt(self.index_key.as_bytes(), &envelope, layout::AAD_TAGS)?;
        let tags: Vec<String> = serde_json::from_slice(&plaintext)
            .map_err(|e| IndexError::Malformed(e.to_string()))?;
        Ok(tags)
    }

    pub async fn save_tags(&self, ctx: &CryptoContext, tags: &[String]) -> Result<()> {
        let plaintext =
            serde_json::to_vec(tags).map_err(|e| IndexError::Malformed(e.to_string()))?;
        let envelope = ctx.encrypt(self.index_key.as_bytes(), &plaintext, layout::AAD_TAGS)?;
        self.vault
            .fs
            .write_atomic(&layout::tags_path(self.vault_id()), &envelope)
            .await?;
        Ok(())
    }

    async fn load_index<T: serde::de::DeserializeOwned>(
        &self,
        ctx: &CryptoContext,
        path: &str,
        aad: &[u8],
        label: &str,
    ) -> Result<Vec<T>> {
        let Some(envelope) = self.vault.fs.read_if_exists(path).await? else {
            return Ok(Vec::new());
        };
        let plaintext = ctx.decrypt(self.index_key.as_bytes(), &envelope, aad)?;
        Ok(index::decode_records(&plaintext, label))
    }

    async fn save_index<T: serde::Serialize>(
        &self,
        ctx: &CryptoContext,
        path: &str,
        aad: &[u8],
        records: &[T],
    ) -> Result<()> {
        let plaintext = index::encode_records(records)?;
        let envelope = ctx.encrypt(self.index_key.as_bytes(), &plaintext, aad)?;
        self.vault.fs.write_atomic(path, &envelope).await?;
        Ok(())
    }

    // ========== Note bodies ==========

    /// Encrypt and write a note body under its content key.
    pub async fn write_note_body(
        &self,
        ctx: &CryptoContext,
        note_id: &str,
        body: &[u8],
    ) -> Result<()> {
        let key = self.content_key(ctx, note_id);
        let envelope = ctx.encrypt(key.as_bytes(), body, layout::AAD_NOTE_BODY)?;
        self.vault
            .fs
            .write_atomic(&layout::note_body_path(self.vault_id(), note_id), &envelope)
            .await?;
        Ok(())
    }

    /// Read and decrypt a note body. `None` if the body was never written.
    pub async fn read_note_body(
        &self,
        ctx: &CryptoContext,
        note_id: &str,
    ) -> Result<Option<Vec<u8>>> {
        let path = layout::note_body_path(self.vault_id(), note_id);
        let Some(envelope) = self.vault.fs.read_if_exists(&path).await? else {
            return Ok(None);
        };
        let key = self.content_key(ctx, note_id);
        Ok(Some(ctx.decrypt(key.as_bytes(), &envelope, layout::AAD_NOTE_BODY)?))
    }

    /// Delete a note body file if present.
    pub async fn delete_note_body(&self, note_id: &str) -> Result<()> {
        let path = layout::note_body_path(self.vault_id(), note_id);
        if self.vault.fs.exists(&path).await? {
            self.vault.fs.delete(&path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KEY_LEN;
    use crate::fs::InMemoryFs;
    use std::sync::Arc;

    fn test_key() -> VaultKey {
        VaultKey::from_bytes([0x77; KEY_LEN])
    }

    async fn create_test_vault(fs: Arc<InMemoryFs>) -> Vault<Arc<InMemoryFs>> {
        let meta = VaultMetadata::new("vault-1", "Personal");
        Vault::create(fs, meta).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_writes_plaintext_structure() {
        let fs = Arc::new(InMemoryFs::new());
        create_test_vault(Arc::clone(&fs)).await;

        assert!(fs.exists("vaults/vault-1/vault.header").await.unwrap());
        assert!(fs.exists("vaults/vault-1/.vault-meta.json").await.unwrap());
        assert!(fs.exists("vaults/vault-1/refs").await.unwrap());
        assert!(fs.exists("vaults/vault-1/sync/pending").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let fs = Arc::new(InMemoryFs::new());
        create_test_vault(Arc::clone(&fs)).await;

        let meta = VaultMetadata::new("vault-1", "Duplicate");
        assert!(matches!(
            Vault::create(fs, meta).await,
            Err(VaultError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_open_before_unlock_reads_metadata() {
        let fs = Arc::new(InMemoryFs::new());
        create_test_vault(Arc::clone(&fs)).await;

        // Discovery works without any key
        let vault = Vault::open(fs, "vault-1").await.unwrap();
        assert_eq!(vault.metadata().name, "Personal");
        assert_eq!(vault.header().version, VAULT_FORMAT_VERSION);
    }

    #[tokio::test]
    async fn test_open_missing_vault() {
        let fs = Arc::new(InMemoryFs::new());
        assert!(matches!(
            Vault::open(fs, "nope").await,
            Err(VaultError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unlock_rejects_future_version() {
        let fs = Arc::new(InMemoryFs::new());
        create_test_vault(Arc::clone(&fs)).await;

        // Rewrite the header with a future version
        let header = VaultHeader {
            version: VAULT_FORMAT_VERSION + 1,
            vault_id: "vault-1".into(),
            created_at: Utc::now(),
        };
        fs.write(
            "vaults/vault-1/vault.header",
            &serde_json::to_vec(&header).unwrap(),
        )
        .await
        .unwrap();

        let vault = Vault::open(fs, "vault-1").await.unwrap();
        let ctx = CryptoContext::new();
        assert!(matches!(
            vault.unlock(&ctx, test_key()),
            Err(VaultError::UnsupportedVersion { .. })
        ));
    }

    #[tokio::test]
    async fn test_unlock_caches_distinct_hot_keys() {
        let fs = Arc::new(InMemoryFs::new());
        create_test_vault(Arc::clone(&fs)).await;

        let ctx = CryptoContext::new();
        let vault = Vault::open(fs, "vault-1").await.unwrap();
        let unlocked = vault.unlock(&ctx, test_key()).unwrap();

        assert_ne!(
            unlocked.index_key().as_bytes(),
            unlocked.sync_key().as_bytes()
        );

        // Per-entity keys are domain separated from each other
        let a = unlocked.content_key(&ctx, "note-1");
        let b = unlocked.content_key(&ctx, "note-2");
        let c = unlocked.note_share_key(&ctx, "note-1");
        assert_ne!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), c.as_bytes());
    }

    #[tokio::test]
    async fn test_note_body_roundtrip() {
        let fs = Arc::new(InMemoryFs::new());
        create_test_vault(Arc::clone(&fs)).await;

        let ctx = CryptoContext::new();
        let vault = Vault::open(Arc::clone(&fs), "vault-1").await.unwrap();
        let unlocked = vault.unlock(&ctx, test_key()).unwrap();

        assert_eq!(unlocked.read_note_body(&ctx, "note-1").await.unwrap(), None);

        unlocked
            .write_note_body(&ctx, "note-1", b"# Groceries\n- milk")
            .await
            .unwrap();

        // Ciphertext on disk, plaintext back through the API
        let on_disk = fs.read("vaults/vault-1/notes/note-1.note.enc").await.unwrap();
        assert!(!on_disk.windows(9).any(|w| w == b"Groceries"));

        let body = unlocked.read_note_body(&ctx, "note-1").await.unwrap();
        assert_eq!(body.as_deref(), Some(b"# Groceries\n- milk".as_slice()));

        unlocked.delete_note_body("note-1").await.unwrap();
        assert_eq!(unlocked.read_note_body(&ctx, "note-1").await.unwrap(), None);
    }
}
