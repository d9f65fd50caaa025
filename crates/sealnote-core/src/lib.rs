//! sealnote-core: Core library for the sealnote zero-knowledge note store.
//!
//! This crate provides the core functionality for:
//! - The vault cryptographic key hierarchy (password → MUK → keyring →
//!   vault keys → per-entity derived keys)
//! - The encrypted on-disk workspace layout with atomic writes
//! - Encrypted newline-delimited JSON indexes
//! - The append-only, content-addressed sync operation log with a
//!   deterministic last-write-wins merge
//! - FileSystem trait abstraction (native and in-memory implementations)
//!
//! Everything secret zeroizes on drop; everything persisted is either
//! intentionally plaintext (vault discovery metadata) or a standard
//! `nonce || ciphertext || tag` AEAD envelope.

pub mod crypto;
pub mod fs;
pub mod index;
pub mod keyring;
pub mod layout;
pub mod sync;
pub mod vault;
pub mod workspace;

pub use crypto::hash::ContentHash;
pub use crypto::kdf::KdfParams;
pub use crypto::keys::{EntityKey, KeyContext, MasterUnlockKey, VaultKey};
pub use crypto::{CryptoContext, CryptoError};
pub use fs::{FileEntry, FileStat, FileSystem, FsError, InMemoryFs};
pub use index::{NoteRecord, NotebookRecord};
pub use keyring::Keyring;
pub use sync::clock::LamportClock;
pub use sync::cursor::{CursorStore, SyncCursor};
pub use sync::log::OperationLog;
pub use sync::merge::{resolve, Projection};
pub use sync::op::{DeviceId, OperationKind, OperationType, SyncOperation};
pub use sync::SyncError;
pub use vault::{UnlockedVault, Vault, VaultError, VaultHeader, VaultMetadata};
pub use workspace::{Workspace, WorkspaceConfig, WorkspaceError};
