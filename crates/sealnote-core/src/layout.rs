//! The fixed on-disk workspace layout.
//!
//! ```text
//! <workspace-root>/
//!   .workspace-marker
//!   .workspace.json            # plaintext: salt, KDF params
//!   .keyring.enc               # nonce||ciphertext||tag, encrypted with MUK
//!   vaults/<vault-id>/
//!     vault.header             # plaintext: version, vaultId, createdAt
//!     .vault-meta.json         # plaintext VaultMetadata
//!     notes/<note-id>.note.enc # encrypted note bodies
//!     refs/
//!       notes.jsonl.enc        # encrypted newline-delimited note metadata
//!       notebooks.jsonl.enc
//!       tags.jsonl.enc         # encrypted JSON array of tag strings
//!     sync/
//!       cursor.enc             # encrypted SyncCursor
//!       pending/*.op.enc       # one file per pending SyncOperation
//! ```
//!
//! Everything plaintext here is safe to expose before unlock (vault
//! discovery); everything else is a standard AEAD envelope.

/// Marker file identifying a directory as a sealnote workspace.
pub const WORKSPACE_MARKER: &str = ".workspace-marker";
/// Plaintext workspace config: KDF salt and cost parameters.
pub const WORKSPACE_CONFIG: &str = ".workspace.json";
/// Encrypted workspace keyring.
pub const KEYRING_FILE: &str = ".keyring.enc";
/// Directory holding all vaults.
pub const VAULTS_DIR: &str = "vaults";
/// Plaintext vault header file name.
pub const VAULT_HEADER_FILE: &str = "vault.header";
/// Plaintext vault metadata file name.
pub const VAULT_META_FILE: &str = ".vault-meta.json";
/// Per-vault directory of encrypted note bodies.
pub const NOTES_DIR: &str = "notes";
/// Per-vault directory of encrypted index files.
pub const REFS_DIR: &str = "refs";
/// Encrypted note index file name.
pub const NOTES_INDEX_FILE: &str = "notes.jsonl.enc";
/// Encrypted notebook index file name.
pub const NOTEBOOKS_INDEX_FILE: &str = "notebooks.jsonl.enc";
/// Encrypted tags file name.
pub const TAGS_FILE: &str = "tags.jsonl.enc";
/// Per-vault sync state directory.
pub const SYNC_DIR: &str = "sync";
/// Encrypted sync cursor file name.
pub const CURSOR_FILE: &str = "cursor.enc";
/// Pending-operations directory name.
pub const PENDING_DIR: &str = "pending";
/// Suffix of pending operation files.
pub const OP_FILE_SUFFIX: &str = ".op.enc";
/// Suffix of encrypted note body files.
pub const NOTE_FILE_SUFFIX: &str = ".note.enc";

// Associated-data labels binding each artifact kind to its envelope.
// A ciphertext copied between artifact kinds fails authentication.

/// AAD for the workspace keyring.
pub const AAD_KEYRING: &[u8] = b"sealnote:keyring:v1";
/// AAD for the note index.
pub const AAD_NOTES_INDEX: &[u8] = b"sealnote:index:notes:v1";
/// AAD for the notebook index.
pub const AAD_NOTEBOOKS_INDEX: &[u8] = b"sealnote:index:notebooks:v1";
/// AAD for the tags file.
pub const AAD_TAGS: &[u8] = b"sealnote:index:tags:v1";
/// AAD for note bodies.
pub const AAD_NOTE_BODY: &[u8] = b"sealnote:note:body:v1";
/// AAD for the sync cursor.
pub const AAD_CURSOR: &[u8] = b"sealnote:sync:cursor:v1";
/// AAD for pending sync operations.
pub const AAD_OPERATION: &[u8] = b"sealnote:sync:op:v1";

pub fn vault_dir(vault_id: &str) -> String {
    format!("{}/{}", VAULTS_DIR, vault_id)
}

pub fn vault_header_path(vault_id: &str) -> String {
    format!("{}/{}", vault_dir(vault_id), VAULT_HEADER_FILE)
}

pub fn vault_meta_path(vault_id: &str) -> String {
    format!("{}/{}", vault_dir(vault_id), VAULT_META_FILE)
}

pub fn notes_dir(vault_id: &str) -> String {
    format!("{}/{}", vault_dir(vault_id), NOTES_DIR)
}

pub fn note_body_path(vault_id: &str, note_id: &str) -> String {
    format!("{}/{}{}", notes_dir(vault_id), note_id, NOTE_FILE_SUFFIX)
}

pub fn refs_dir(vault_id: &str) -> String {
    format!("{}/{}", vault_dir(vault_id), REFS_DIR)
}

pub fn notes_index_path(vault_id: &str) -> String {
    format!("{}/{}", refs_dir(vault_id), NOTES_INDEX_FILE)
}

pub fn notebooks_index_path(vault_id: &str) -> String {
    format!("{}/{}", refs_dir(vault_id), NOTEBOOKS_INDEX_FILE)
}

pub fn tags_path(vault_id: &str) -> String {
    format!("{}/{}", refs_dir(vault_id), TAGS_FILE)
}

pub fn sync_dir(vault_id: &str) -> String {
    format!("{}/{}", vault_dir(vault_id), SYNC_DIR)
}

pub fn cursor_path(vault_id: &str) -> String {
    format!("{}/{}", sync_dir(vault_id), CURSOR_FILE)
}

pub fn pending_dir(vault_id: &str) -> String {
    format!("{}/{}", sync_dir(vault_id), PENDING_DIR)
}

pub fn pending_op_path(vault_id: &str, op_id: &str) -> String {
    format!("{}/{}{}", pending_dir(vault_id), op_id, OP_FILE_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_paths() {
        assert_eq!(vault_header_path("v1"), "vaults/v1/vault.header");
        assert_eq!(vault_meta_path("v1"), "vaults/v1/.vault-meta.json");
        assert_eq!(notes_index_path("v1"), "vaults/v1/refs/notes.jsonl.enc");
        assert_eq!(cursor_path("v1"), "vaults/v1/sync/cursor.enc");
        assert_eq!(
            pending_op_path("v1", "abc123"),
            "vaults/v1/sync/pending/abc123.op.enc"
        );
        assert_eq!(
            note_body_path("v1", "note-9"),
            "vaults/v1/notes/note-9.note.enc"
        );
    }

    #[test]
    fn test_aad_labels_are_distinct() {
        let labels = [
            AAD_KEYRING,
            AAD_NOTES_INDEX,
            AAD_NOTEBOOKS_INDEX,
            AAD_TAGS,
            AAD_NOTE_BODY,
            AAD_CURSOR,
            AAD_OPERATION,
        ];
        for (i, a) in labels.iter().enumerate() {
            for b in labels.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
