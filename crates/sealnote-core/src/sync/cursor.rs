//! The sync cursor: a vault's watermark into the operation stream.
//!
//! Advanced monotonically as operations are acknowledged; persisted
//! encrypted under the vault's sync key so even sync progress leaks nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::CryptoContext;
use crate::crypto::keys::EntityKey;
use crate::fs::FileSystem;
use crate::layout::{self, AAD_CURSOR};

use super::op::SyncOperation;
use super::{Result, SyncError};

/// Watermark into the ordered operation stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCursor {
    pub last_timestamp: u64,
    pub last_op_id: String,
    pub synced_count: u64,
    pub updated_at: DateTime<Utc>,
}

impl Default for SyncCursor {
    fn default() -> Self {
        Self {
            last_timestamp: 0,
            last_op_id: String::new(),
            synced_count: 0,
            updated_at: Utc::now(),
        }
    }
}

impl SyncCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if no operation has ever been acknowledged.
    pub fn is_initial(&self) -> bool {
        self.synced_count == 0
    }

    /// Advance past an acknowledged operation.
    ///
    /// The cursor only moves forward in `(timestamp, op_id)` order; an
    /// attempt to move backwards (or re-acknowledge the current position)
    /// is a `CursorRegression` error.
    pub fn advance(&mut self, op: &SyncOperation) -> Result<()> {
        let forward = match op.timestamp.cmp(&self.last_timestamp) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Equal => op.op_id > self.last_op_id,
            std::cmp::Ordering::Less => false,
        };

        if !forward && !self.is_initial() {
            return Err(SyncError::CursorRegression {
                current_ts: self.last_timestamp,
                current_op: self.last_op_id.clone(),
                proposed_ts: op.timestamp,
                proposed_op: op.op_id.clone(),
            });
        }

        self.last_timestamp = op.timestamp;
        self.last_op_id = op.op_id.clone();
        self.synced_count += 1;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Encrypted persistence for a vault's cursor.
pub struct CursorStore<F: FileSystem> {
    fs: F,
    vault_id: String,
    key: EntityKey,
}

impl<F: FileSystem> CursorStore<F> {
    pub fn new(fs: F, vault_id: &str, key: EntityKey) -> Self {
        Self {
            fs,
            vault_id: vault_id.to_string(),
            key,
        }
    }

    /// Load the cursor. A missing file is the initial cursor.
    pub async fn load(&self, ctx: &CryptoContext) -> Result<SyncCursor> {
        let path = layout::cursor_path(&self.vault_id);
        let Some(envelope) = self.fs.read_if_exists(&path).await? else {
            return Ok(SyncCursor::new());
        };
        let plaintext = ctx.decrypt(self.key.as_bytes(), &envelope, AAD_CURSOR)?;
        serde_json::from_slice(&plaintext).map_err(|e| SyncError::Malformed(e.to_string()))
    }

    /// Persist the cursor atomically.
    pub async fn save(&self, ctx: &CryptoContext, cursor: &SyncCursor) -> Result<()> {
        let plaintext =
            serde_json::to_vec(cursor).map_err(|e| SyncError::Malformed(e.to_string()))?;
        let envelope = ctx.encrypt(self.key.as_bytes(), &plaintext, AAD_CURSOR)?;
        self.fs
            .write_atomic(&layout::cursor_path(&self.vault_id), &envelope)
            .await?;
        Ok(())
    }
}
