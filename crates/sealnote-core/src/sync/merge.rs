//! Deterministic last-write-wins merge.
//!
//! Replicas converge by replaying their full operation set: operations are
//! ordered by `(timestamp, op_id)`, deduplicated by id, and applied in that
//! order. Because the order is total and derived only from the operations
//! themselves, any arrival order, and any number of repeated replays,
//! produces the same final projection.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::index::{NoteRecord, NotebookRecord};

use super::op::{OperationKind, SyncOperation};

/// Total order over operations: timestamp first, then op id.
pub fn compare(a: &SyncOperation, b: &SyncOperation) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then_with(|| a.op_id.cmp(&b.op_id))
}

/// Pure pairwise arbiter for two operations touching the same target.
///
/// The larger timestamp wins; on an exact tie the lexicographically greater
/// op id wins. No side effects, so `resolve(a, b) == resolve(b, a)` always.
pub fn resolve<'a>(a: &'a SyncOperation, b: &'a SyncOperation) -> &'a SyncOperation {
    match compare(a, b) {
        Ordering::Less => b,
        Ordering::Equal | Ordering::Greater => a,
    }
}

/// Fully merged note state.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteState {
    pub note_id: String,
    pub title: String,
    pub content: String,
    pub notebook_id: Option<String>,
    pub tags: Vec<String>,
    pub is_pinned: bool,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Fully merged notebook state.
#[derive(Debug, Clone, PartialEq)]
pub struct NotebookState {
    pub notebook_id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// The result of replaying an operation set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    notes: BTreeMap<String, NoteState>,
    notebooks: BTreeMap<String, NotebookState>,
    applied: BTreeSet<String>,
}

impl Projection {
    /// Replay a set of operations into a fresh projection.
    ///
    /// The input order is irrelevant; duplicates (same op id) are applied
    /// once. This is the convergence mechanism: two replicas holding the
    /// same operation set always compute identical projections.
    pub fn replay<'a, I>(ops: I) -> Self
    where
        I: IntoIterator<Item = &'a SyncOperation>,
    {
        let mut sorted: Vec<&SyncOperation> = ops.into_iter().collect();
        sorted.sort_by(|a, b| compare(a, b));

        let mut projection = Self::default();
        for op in sorted {
            projection.apply(op);
        }
        projection
    }

    pub fn note(&self, note_id: &str) -> Option<&NoteState> {
        self.notes.get(note_id)
    }

    pub fn notebook(&self, notebook_id: &str) -> Option<&NotebookState> {
        self.notebooks.get(notebook_id)
    }

    pub fn notes(&self) -> impl Iterator<Item = &NoteState> {
        self.notes.values()
    }

    pub fn notebooks(&self) -> impl Iterator<Item = &NotebookState> {
        self.notebooks.values()
    }

    /// Index records for the merged note set, ready for `refs/notes.jsonl.enc`.
    pub fn note_records(&self) -> Vec<NoteRecord> {
        self.notes
            .values()
            .map(|n| NoteRecord {
                note_id: n.note_id.clone(),
                title: n.title.clone(),
                notebook_id: n.notebook_id.clone(),
                tags: n.tags.clone(),
                is_pinned: n.is_pinned,
                is_archived: n.is_archived,
                created_at: n.created_at,
                modified_at: n.modified_at,
            })
            .collect()
    }

    /// Index records for the merged notebook set.
    pub fn notebook_records(&self) -> Vec<NotebookRecord> {
        self.notebooks
            .values()
            .map(|n| NotebookRecord {
                notebook_id: n.notebook_id.clone(),
                name: n.name.clone(),
                parent_id: n.parent_id.clone(),
                created_at: n.created_at,
                modified_at: n.modified_at,
            })
            .collect()
    }

    /// Every distinct tag across non-archived notes, sorted.
    pub fn tags(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self
            .notes
            .values()
            .filter(|n| !n.is_archived)
            .flat_map(|n| n.tags.iter().map(String::as_str))
            .collect();
        set.into_iter().map(str::to_string).collect()
    }

    /// Apply one operation. Private: callers replay sets, they do not feed
    /// single operations out of order.
    fn apply(&mut self, op: &SyncOperation) {
        // Idempotence: the same operation applied twice is a no-op.
        if !self.applied.insert(op.op_id.clone()) {
            return;
        }

        match &op.kind {
            OperationKind::CreateNote(p) => {
                self.notes.insert(
                    op.target_id.clone(),
                    NoteState {
                        note_id: p.note_id.clone(),
                        title: p.title.clone(),
                        content: p.content.clone(),
                        notebook_id: p.notebook_id.clone(),
                        tags: p.tags.clone(),
                        is_pinned: p.is_pinned,
                        is_archived: p.is_archived,
                        created_at: p.created_at,
                        modified_at: p.modified_at,
                    },
                );
            }
            OperationKind::UpdateNote(p) => {
                // Updates to a note that does not exist (deleted earlier in
                // the merged order, or never created) are dropped.
                if let Some(note) = self.notes.get_mut(&op.target_id) {
                    if let Some(title) = &p.title {
                        note.title = title.clone();
                    }
                    if let Some(content) = &p.content {
                        note.content = content.clone();
                    }
                    if let Some(notebook_id) = &p.notebook_id {
                        note.notebook_id = Some(notebook_id.clone());
                    }
                    if let Some(tags) = &p.tags {
                        note.tags = tags.clone();
                    }
                    if let Some(is_pinned) = p.is_pinned {
                        note.is_pinned = is_pinned;
                    }
                    if let Some(is_archived) = p.is_archived {
                        note.is_archived = is_archived;
                    }
                    note.modified_at = p.modified_at;
                }
            }
            OperationKind::DeleteNote(_) => {
                self.notes.remove(&op.target_id);
            }
            OperationKind::CreateNotebook(p) => {
                self.notebooks.insert(
                    op.target_id.clone(),
                    NotebookState {
                        notebook_id: p.notebook_id.clone(),
                        name: p.name.clone(),
                        parent_id: p.parent_id.clone(),
                        created_at: p.created_at,
                        modified_at: p.modified_at,
                    },
                );
            }
            OperationKind::UpdateNotebook(p) => {
                if let Some(notebook) = self.notebooks.get_mut(&op.target_id) {
                    if let Some(name) = &p.name {
                        notebook.name = name.clone();
                    }
                    if let Some(parent_id) = &p.parent_id {
                        notebook.parent_id = Some(parent_id.clone());
                    }
                    notebook.modified_at = p.modified_at;
                }
            }
            OperationKind::DeleteNotebook(_) => {
                self.notebooks.remove(&op.target_id);
            }
        }
    }
}
