//! File watcher with debouncing and content-hash deduplication.
//!
//! Cloud-drive agents routinely rewrite files with identical bytes and fire
//! bursts of change notifications for a single logical save. The watcher
//! therefore:
//!
//! 1. debounces raw OS events (notify-debouncer-mini),
//! 2. hashes created/modified files and suppresses events whose content
//!    hash matches the last known hash for that path,
//! 3. classifies the surviving events as created/modified/deleted/moved.
//!
//! Files that cannot be read (locked or mid-write) are skipped silently;
//! the next OS event retries. Dropping the watcher drops the debouncer,
//! which cancels pending timers and closes the OS subscription.

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent};
use sealnote_core::ContentHash;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(400);

/// How long a deleted file's hash is remembered for move detection.
const MOVE_DETECT_TTL: Duration = Duration::from_secs(5);

/// A coalesced, deduplicated file change.
#[derive(Debug, Clone, PartialEq)]
pub struct FileChange {
    /// Path relative to the watched root.
    pub path: String,
    pub kind: ChangeKind,
    /// Observation time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Ciphertext hash for created/modified/moved files.
    pub content_hash: Option<ContentHash>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    /// A created file whose content hash matches a recently deleted path.
    Moved,
}

/// Per-watcher state shared with the debouncer callback thread.
#[derive(Default)]
struct WatchState {
    /// Last known content hash per relative path.
    hashes: HashMap<String, ContentHash>,
    /// Hashes of recently deleted files, for rename/move detection.
    recent_deletes: HashMap<String, (String, Instant)>,
}

/// Watches a workspace directory and emits [`FileChange`] events.
pub struct WorkspaceWatcher {
    root: PathBuf,
    /// Debouncer handle (must keep alive; drop cancels the subscription)
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    event_rx: mpsc::UnboundedReceiver<FileChange>,
}

impl WorkspaceWatcher {
    /// Start watching `root` recursively.
    ///
    /// `suffixes` filters events by path suffix (e.g. `[".enc"]`); an empty
    /// list watches everything.
    pub fn start(
        root: PathBuf,
        suffixes: Vec<String>,
        debounce: Duration,
    ) -> Result<Self, notify::Error> {
        // Resolve symlinks: on macOS /var/... is /private/var/..., and
        // FSEvents reports the real path.
        let root = root.canonicalize().unwrap_or(root);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let root_clone = root.clone();
        let state = Arc::new(Mutex::new(WatchState::default()));

        let mut debouncer = new_debouncer(
            debounce,
            move |result: Result<Vec<DebouncedEvent>, notify::Error>| match result {
                Ok(events) => {
                    for event in events {
                        if let Some(change) =
                            process_event(&event.path, &root_clone, &suffixes, &state)
                        {
                            if event_tx.send(change).is_err() {
                                // Receiver dropped
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("File watcher error: {}", e);
                }
            },
        )?;

        debouncer
            .watcher()
            .watch(&root, RecursiveMode::Recursive)?;

        tracing::info!("Started file watcher for {}", root.display());

        Ok(Self {
            root,
            _debouncer: debouncer,
            event_rx,
        })
    }

    /// Receiver for change events.
    pub fn event_rx(&mut self) -> &mut mpsc::UnboundedReceiver<FileChange> {
        &mut self.event_rx
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Classify one debounced event, or suppress it.
fn process_event(
    path: &Path,
    root: &Path,
    suffixes: &[String],
    state: &Arc<Mutex<WatchState>>,
) -> Option<FileChange> {
    let relative = path.strip_prefix(root).ok()?;
    let relative_str = relative.to_str()?.replace('\\', "/");

    // Skip temp files from atomic writes
    if relative_str.contains(".tmp-") {
        return None;
    }

    if !suffixes.is_empty() && !suffixes.iter().any(|s| relative_str.ends_with(s.as_str())) {
        return None;
    }

    let mut state = state.lock().expect("watch state mutex poisoned");

    if path.exists() {
        // Locked or mid-write files throw on read; skip silently and let
        // the next OS event retry.
        let content = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Skipping unreadable file {}: {}", relative_str, e);
                return None;
            }
        };
        let hash = ContentHash::from_bytes(&content);

        match state.hashes.get(&relative_str) {
            Some(known) if *known == hash => {
                // Touched without a content change (cloud-sync echo)
                debug!("Suppressing no-op change for {}", relative_str);
                None
            }
            Some(_) => {
                state.hashes.insert(relative_str.clone(), hash.clone());
                debug!("File modified: {}", relative_str);
                Some(FileChange {
                    path: relative_str,
                    kind: ChangeKind::Modified,
                    timestamp_ms: now_ms(),
                    content_hash: Some(hash),
                })
            }
            None => {
                // New path: a recently deleted file with the same content
                // is a move, not a create.
                state
                    .recent_deletes
                    .retain(|_, (_, at)| at.elapsed() < MOVE_DETECT_TTL);
                let moved_from = state.recent_deletes.remove(hash.as_str());

                state.hashes.insert(relative_str.clone(), hash.clone());

                let kind = match moved_from {
                    Some((from, _)) => {
                        debug!("File moved: {} -> {}", from, relative_str);
                        ChangeKind::Moved
                    }
                    None => {
                        debug!("File created: {}", relative_str);
                        ChangeKind::Created
                    }
                };

                Some(FileChange {
                    path: relative_str,
                    kind,
                    timestamp_ms: now_ms(),
                    content_hash: Some(hash),
                })
            }
        }
    } else {
        // Path gone: only meaningful if we were tracking it
        let hash = state.hashes.remove(&relative_str)?;
        state
            .recent_deletes
            .insert(hash.as_str().to_string(), (relative_str.clone(), Instant::now()));

        debug!("File deleted: {}", relative_str);
        Some(FileChange {
            path: relative_str,
            kind: ChangeKind::Deleted,
            timestamp_ms: now_ms(),
            content_hash: None,
        })
    }
}
