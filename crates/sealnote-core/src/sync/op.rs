//! Sync operations: the immutable unit of replication.
//!
//! Wire shape (JSON):
//!
//! ```json
//! {
//!   "opId": "…",
//!   "type": "updateNote",
//!   "payload": { "title": "New title" },
//!   "targetId": "note-1",
//!   "timestamp": 42,
//!   "deviceId": "a1b2c3d4e5f67890",
//!   "createdAt": "2025-11-02T09:30:00Z"
//! }
//! ```
//!
//! `type`/`payload` form an adjacently tagged enum, so every operation kind
//! decodes into its own payload struct through the explicit discriminator.
//! Unknown payload fields from newer versions are tolerated and ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identifies the device that created an operation.
///
/// 16 hex chars, generated once per device from non-secret randomness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random device id.
    pub fn generate() -> Self {
        use rand::Rng;
        let id: u64 = rand::rng().random();
        Self(format!("{:016x}", id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Discriminator for the six operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationType {
    CreateNote,
    UpdateNote,
    DeleteNote,
    CreateNotebook,
    UpdateNotebook,
    DeleteNotebook,
}

impl OperationType {
    /// The wire discriminator string.
    pub fn tag(&self) -> &'static str {
        match self {
            OperationType::CreateNote => "createNote",
            OperationType::UpdateNote => "updateNote",
            OperationType::DeleteNote => "deleteNote",
            OperationType::CreateNotebook => "createNotebook",
            OperationType::UpdateNotebook => "updateNotebook",
            OperationType::DeleteNotebook => "deleteNotebook",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotePayload {
    pub note_id: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Partial note update. Absent fields are unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNotePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_pinned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteNotePayload {
    pub deleted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotebookPayload {
    pub notebook_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Partial notebook update. Absent fields are unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNotebookPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteNotebookPayload {
    pub deleted_at: DateTime<Utc>,
}

/// Operation kind with its type-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum OperationKind {
    CreateNote(CreateNotePayload),
    UpdateNote(UpdateNotePayload),
    DeleteNote(DeleteNotePayload),
    CreateNotebook(CreateNotebookPayload),
    UpdateNotebook(UpdateNotebookPayload),
    DeleteNotebook(DeleteNotebookPayload),
}

impl OperationKind {
    pub fn op_type(&self) -> OperationType {
        match self {
            OperationKind::CreateNote(_) => OperationType::CreateNote,
            OperationKind::UpdateNote(_) => OperationType::UpdateNote,
            OperationKind::DeleteNote(_) => OperationType::DeleteNote,
            OperationKind::CreateNotebook(_) => OperationType::CreateNotebook,
            OperationKind::UpdateNotebook(_) => OperationType::UpdateNotebook,
            OperationKind::DeleteNotebook(_) => OperationType::DeleteNotebook,
        }
    }
}

/// An immutable sync operation.
///
/// `op_id` is computed at construction from the identifying fields. Under
/// the Lamport rule `(device_id, timestamp)` is unique per device, which
/// makes the id globally unique by construction; no runtime dedup table is
/// needed to guarantee it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    pub op_id: String,
    #[serde(flatten)]
    pub kind: OperationKind,
    pub target_id: String,
    pub timestamp: u64,
    pub device_id: DeviceId,
    pub created_at: DateTime<Utc>,
}

impl SyncOperation {
    pub fn new(kind: OperationKind, target_id: &str, timestamp: u64, device_id: DeviceId) -> Self {
        let op_id = compute_op_id(&device_id, timestamp, kind.op_type(), target_id);
        Self {
            op_id,
            kind,
            target_id: target_id.to_string(),
            timestamp,
            device_id,
            created_at: Utc::now(),
        }
    }

    pub fn op_type(&self) -> OperationType {
        self.kind.op_type()
    }
}

/// Content-address an operation by its identifying fields.
///
/// SHA-256 over (device id, timestamp, type, target), truncated to 128 bits
/// of hex. Stable across serialization changes to the payload structs.
fn compute_op_id(device_id: &DeviceId, timestamp: u64, op_type: OperationType, target_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(device_id.as_str().as_bytes());
    hasher.update(timestamp.to_be_bytes());
    hasher.update(op_type.tag().as_bytes());
    hasher.update(target_id.as_bytes());
    hex::encode(&hasher.finalize()[..16])
}
