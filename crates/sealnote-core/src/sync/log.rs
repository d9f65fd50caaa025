//! The append-only pending-operations log.
//!
//! Each operation is one encrypted file under `sync/pending/`, named by its
//! content-addressed op id. A transport layer relays these files verbatim;
//! nothing here ever edits a file in place. Appending an operation that is
//! already present is a no-op: the content address guarantees it is the
//! same operation.

use tracing::{debug, warn};

use crate::crypto::CryptoContext;
use crate::crypto::keys::EntityKey;
use crate::fs::FileSystem;
use crate::layout::{self, AAD_OPERATION, OP_FILE_SUFFIX};

use super::clock::LamportClock;
use super::merge::compare;
use super::op::SyncOperation;
use super::{Result, SyncError};

/// Persistent log of pending sync operations for one vault.
pub struct OperationLog<F: FileSystem> {
    fs: F,
    vault_id: String,
    /// The vault's cached sync key; the log owns its copy.
    key: EntityKey,
}

impl<F: FileSystem> OperationLog<F> {
    pub fn new(fs: F, vault_id: &str, key: EntityKey) -> Self {
        Self {
            fs,
            vault_id: vault_id.to_string(),
            key,
        }
    }

    /// Append an operation to the log.
    ///
    /// Atomic write; re-appending an existing op id is a silent no-op.
    pub async fn append(&self, ctx: &CryptoContext, op: &SyncOperation) -> Result<()> {
        let path = layout::pending_op_path(&self.vault_id, &op.op_id);

        if self.fs.exists(&path).await? {
            debug!("Operation {} already pending, skipping append", op.op_id);
            return Ok(());
        }

        let plaintext = serde_json::to_vec(op).map_err(|e| SyncError::Malformed(e.to_string()))?;
        let envelope = ctx.encrypt(self.key.as_bytes(), &plaintext, AAD_OPERATION)?;
        self.fs.write_atomic(&path, &envelope).await?;

        debug!(
            "Appended {} op {} for {} (t={})",
            op.op_type().tag(),
            op.op_id,
            op.target_id,
            op.timestamp
        );
        Ok(())
    }

    /// Load and decrypt every pending operation.
    ///
    /// Undecryptable or unparsable entries are logged and skipped; one
    /// damaged file must not stall sync for the rest of the log.
    pub async fn load_pending(&self, ctx: &CryptoContext) -> Result<Vec<SyncOperation>> {
        let dir = layout::pending_dir(&self.vault_id);
        if !self.fs.exists(&dir).await? {
            return Ok(Vec::new());
        }

        let mut ops = Vec::new();
        for entry in self.fs.list(&dir).await? {
            if entry.is_dir || !entry.name.ends_with(OP_FILE_SUFFIX) {
                continue;
            }
            let path = format!("{}/{}", dir, entry.name);

            let envelope = match self.fs.read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    // Possibly mid-write by a cloud-sync agent; the next
                    // change notification retries.
                    warn!("Skipping unreadable pending op {}: {}", entry.name, e);
                    continue;
                }
            };

            let plaintext = match ctx.decrypt(self.key.as_bytes(), &envelope, AAD_OPERATION) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Skipping undecryptable pending op {}: {}", entry.name, e);
                    continue;
                }
            };

            match serde_json::from_slice::<SyncOperation>(&plaintext) {
                Ok(op) => ops.push(op),
                Err(e) => {
                    warn!("Skipping malformed pending op {}: {}", entry.name, e);
                }
            }
        }

        Ok(ops)
    }

    /// Seed a Lamport clock from the highest pending timestamp.
    pub async fn seed_clock(&self, ctx: &CryptoContext) -> Result<LamportClock> {
        let ops = self.load_pending(ctx).await?;
        let highest = ops.iter().map(|op| op.timestamp).max().unwrap_or(0);
        Ok(LamportClock::seeded(highest))
    }

    /// Remove operations at or before the given `(timestamp, op_id)`
    /// position, typically a cursor already acknowledged by the transport.
    pub async fn prune_through(
        &self,
        ctx: &CryptoContext,
        timestamp: u64,
        op_id: &str,
    ) -> Result<usize> {
        let ops = self.load_pending(ctx).await?;
        let mut pruned = 0;

        for op in ops {
            let at_or_before = match op.timestamp.cmp(&timestamp) {
                std::cmp::Ordering::Less => true,
                std::cmp::Ordering::Equal => op.op_id.as_str() <= op_id,
                std::cmp::Ordering::Greater => false,
            };
            if at_or_before {
                let path = layout::pending_op_path(&self.vault_id, &op.op_id);
                self.fs.delete(&path).await?;
                pruned += 1;
            }
        }

        if pruned > 0 {
            debug!("Pruned {} acknowledged operations", pruned);
        }
        Ok(pruned)
    }

    /// Pending operations in merge order.
    pub async fn load_ordered(&self, ctx: &CryptoContext) -> Result<Vec<SyncOperation>> {
        let mut ops = self.load_pending(ctx).await?;
        ops.sort_by(compare);
        Ok(ops)
    }
}
