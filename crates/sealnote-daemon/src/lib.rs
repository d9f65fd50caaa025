//! sealnote-daemon: native runtime for the sealnote core.
//!
//! Provides the tokio-backed `FileSystem` implementation, the debounced
//! file-change watcher with content-hash deduplication, and the reload
//! service that keeps decrypted in-memory index caches consistent with
//! externally modified ciphertext (e.g. from cloud-drive sync).

pub mod native_fs;
pub mod reload;
pub mod watcher;

pub use native_fs::NativeFs;
pub use reload::{IndexCache, ReloadService};
pub use watcher::{ChangeKind, FileChange, WorkspaceWatcher};
