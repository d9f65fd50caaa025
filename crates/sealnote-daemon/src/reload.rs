//! Reload service: keeps decrypted in-memory index caches consistent with
//! externally modified ciphertext.
//!
//! On a qualifying [`FileChange`] for one of a vault's index files, the
//! service decrypts with the vault's cached index key, reparses, and
//! replaces the affected cache wholesale. A failed reload (file locked,
//! mid-write, or undecryptable) keeps the previous cache and waits for the
//! next change notification; malformed individual records are skipped
//! inside the index decoder.

use std::sync::Arc;

use sealnote_core::vault::{Result as VaultResult, UnlockedVault};
use sealnote_core::{layout, CryptoContext, FileSystem, NoteRecord, NotebookRecord};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::watcher::{ChangeKind, FileChange};

/// The decrypted index caches observed by the UI layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexCache {
    pub notes: Vec<NoteRecord>,
    pub notebooks: Vec<NotebookRecord>,
    pub tags: Vec<String>,
}

/// Which index file a change touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexFile {
    Notes,
    Notebooks,
    Tags,
}

/// Watches for index-file changes on one unlocked vault.
pub struct ReloadService<F: FileSystem> {
    ctx: CryptoContext,
    vault: UnlockedVault<F>,
    cache: Arc<RwLock<IndexCache>>,
}

impl<F: FileSystem> ReloadService<F> {
    pub fn new(ctx: CryptoContext, vault: UnlockedVault<F>) -> Self {
        Self {
            ctx,
            vault,
            cache: Arc::new(RwLock::new(IndexCache::default())),
        }
    }

    /// Shared handle to the cache.
    pub fn cache(&self) -> Arc<RwLock<IndexCache>> {
        Arc::clone(&self.cache)
    }

    /// Load all three indexes. Missing files are empty caches, not errors.
    pub async fn prime(&self) -> VaultResult<()> {
        let notes = self.vault.load_note_index(&self.ctx).await?;
        let notebooks = self.vault.load_notebook_index(&self.ctx).await?;
        let tags = self.vault.load_tags(&self.ctx).await?;

        let mut cache = self.cache.write().await;
        cache.notes = notes;
        cache.notebooks = notebooks;
        cache.tags = tags;

        info!(
            "Primed index cache: {} notes, {} notebooks, {} tags",
            cache.notes.len(),
            cache.notebooks.len(),
            cache.tags.len()
        );
        Ok(())
    }

    /// React to one file change. Returns true if a cache was replaced.
    pub async fn handle_change(&self, change: &FileChange) -> bool {
        let Some(index) = self.classify(&change.path) else {
            return false;
        };

        // A deleted index is a vault that has not written it yet: empty cache.
        if change.kind == ChangeKind::Deleted {
            let mut cache = self.cache.write().await;
            match index {
                IndexFile::Notes => cache.notes.clear(),
                IndexFile::Notebooks => cache.notebooks.clear(),
                IndexFile::Tags => cache.tags.clear(),
            }
            debug!("Cleared {:?} cache after delete of {}", index, change.path);
            return true;
        }

        match self.reload(index).await {
            Ok(()) => {
                debug!("Reloaded {:?} cache from {}", index, change.path);
                true
            }
            Err(e) => {
                // Likely mid-write by an external sync agent; the next
                // change notification retries.
                warn!("Failed to reload {} (keeping old cache): {}", change.path, e);
                false
            }
        }
    }

    /// Drain change events until the sender (the watcher) goes away.
    pub async fn run(&self, rx: &mut mpsc::UnboundedReceiver<FileChange>) {
        while let Some(change) = rx.recv().await {
            self.handle_change(&change).await;
        }
    }

    fn classify(&self, path: &str) -> Option<IndexFile> {
        let vault_id = self.vault.vault_id();
        if path == layout::notes_index_path(vault_id) {
            Some(IndexFile::Notes)
        } else if path == layout::notebooks_index_path(vault_id) {
            Some(IndexFile::Notebooks)
        } else if path == layout::tags_path(vault_id) {
            Some(IndexFile::Tags)
        } else {
            None
        }
    }

    async fn reload(&self, index: IndexFile) -> VaultResult<()> {
        match index {
            IndexFile::Notes => {
                let notes = self.vault.load_note_index(&self.ctx).await?;
                self.cache.write().await.notes = notes;
            }
            IndexFile::Notebooks => {
                let notebooks = self.vault.load_notebook_index(&self.ctx).await?;
                self.cache.write().await.notebooks = notebooks;
            }
            IndexFile::Tags => {
                let tags = self.vault.load_tags(&self.ctx).await?;
                self.cache.write().await.tags = tags;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sealnote_core::{InMemoryFs, KdfParams, Workspace};

    fn test_note(id: &str, title: &str) -> NoteRecord {
        let now = Utc::now();
        NoteRecord {
            note_id: id.to_string(),
            title: title.to_string(),
            notebook_id: None,
            tags: vec![],
            is_pinned: false,
            is_archived: false,
            created_at: now,
            modified_at: now,
        }
    }

    async fn setup() -> (
        CryptoContext,
        Arc<InMemoryFs>,
        String,
        ReloadService<Arc<InMemoryFs>>,
    ) {
        let ctx = CryptoContext::new();
        let fs = Arc::new(InMemoryFs::new());
        let mut workspace =
            Workspace::create(Arc::clone(&fs), &ctx, "pw", KdfParams::fast_insecure())
                .await
                .unwrap();
        let meta = workspace.create_vault(&ctx, "Test", false).await.unwrap();
        let vault = workspace.unlock_vault(&ctx, &meta.vault_id).await.unwrap();
        let service = ReloadService::new(ctx.clone(), vault);
        (ctx, fs, meta.vault_id, service)
    }

    fn notes_change(vault_id: &str, kind: ChangeKind) -> FileChange {
        FileChange {
            path: layout::notes_index_path(vault_id),
            kind,
            timestamp_ms: 0,
            content_hash: None,
        }
    }

    #[tokio::test]
    async fn test_prime_with_missing_files_is_empty() {
        let (_ctx, _fs, _vault_id, service) = setup().await;

        service.prime().await.unwrap();
        let cache = service.cache();
        assert_eq!(*cache.read().await, IndexCache::default());
    }

    #[tokio::test]
    async fn test_reload_on_index_change() {
        let (ctx, fs, vault_id, service) = setup().await;
        service.prime().await.unwrap();

        // Another handle to the same vault writes the index (simulating a
        // cloud-synced write landing on disk)
        let mut workspace = Workspace::open(Arc::clone(&fs)).await.unwrap();
        workspace.unlock(&ctx, "pw").await.unwrap();
        let writer = workspace.unlock_vault(&ctx, &vault_id).await.unwrap();
        writer
            .save_note_index(&ctx, &[test_note("n1", "Hello")])
            .await
            .unwrap();

        let reloaded = service
            .handle_change(&notes_change(&vault_id, ChangeKind::Modified))
            .await;
        assert!(reloaded);

        let cache = service.cache();
        let cache = cache.read().await;
        assert_eq!(cache.notes.len(), 1);
        assert_eq!(cache.notes[0].title, "Hello");
    }

    #[tokio::test]
    async fn test_unrelated_path_ignored() {
        let (_ctx, _fs, vault_id, service) = setup().await;

        let change = FileChange {
            path: format!("vaults/{}/notes/n1.note.enc", vault_id),
            kind: ChangeKind::Modified,
            timestamp_ms: 0,
            content_hash: None,
        };
        assert!(!service.handle_change(&change).await);
    }

    #[tokio::test]
    async fn test_delete_clears_cache() {
        let (ctx, fs, vault_id, service) = setup().await;

        let mut workspace = Workspace::open(Arc::clone(&fs)).await.unwrap();
        workspace.unlock(&ctx, "pw").await.unwrap();
        let writer = workspace.unlock_vault(&ctx, &vault_id).await.unwrap();
        writer
            .save_note_index(&ctx, &[test_note("n1", "Hello")])
            .await
            .unwrap();
        service.prime().await.unwrap();
        assert_eq!(service.cache().read().await.notes.len(), 1);

        let reloaded = service
            .handle_change(&notes_change(&vault_id, ChangeKind::Deleted))
            .await;
        assert!(reloaded);
        assert!(service.cache().read().await.notes.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_index_keeps_old_cache() {
        let (ctx, fs, vault_id, service) = setup().await;

        let mut workspace = Workspace::open(Arc::clone(&fs)).await.unwrap();
        workspace.unlock(&ctx, "pw").await.unwrap();
        let writer = workspace.unlock_vault(&ctx, &vault_id).await.unwrap();
        writer
            .save_note_index(&ctx, &[test_note("n1", "Hello")])
            .await
            .unwrap();
        service.prime().await.unwrap();

        // Clobber the index with garbage that fails authentication
        fs.write(&layout::notes_index_path(&vault_id), b"not an envelope")
            .await
            .unwrap();

        let reloaded = service
            .handle_change(&notes_change(&vault_id, ChangeKind::Modified))
            .await;
        assert!(!reloaded);

        // Old cache survives
        assert_eq!(service.cache().read().await.notes.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_line_skipped_on_reload() {
        let (ctx, fs, vault_id, service) = setup().await;

        // Hand-craft an index with one good line and one broken line,
        // encrypted under the vault's real index key.
        let mut workspace = Workspace::open(Arc::clone(&fs)).await.unwrap();
        workspace.unlock(&ctx, "pw").await.unwrap();
        let writer = workspace.unlock_vault(&ctx, &vault_id).await.unwrap();

        let good = serde_json::to_string(&test_note("good", "Survivor")).unwrap();
        let plaintext = format!("{}\n{{\"bad json\n", good);
        let envelope = ctx
            .encrypt(
                writer.index_key().as_bytes(),
                plaintext.as_bytes(),
                layout::AAD_NOTES_INDEX,
            )
            .unwrap();
        fs.write(&layout::notes_index_path(&vault_id), &envelope)
            .await
            .unwrap();

        let reloaded = service
            .handle_change(&notes_change(&vault_id, ChangeKind::Modified))
            .await;
        assert!(reloaded);

        let cache = service.cache();
        let cache = cache.read().await;
        assert_eq!(cache.notes.len(), 1);
        assert_eq!(cache.notes[0].note_id, "good");
    }
}
