//! The sync operation log.
//!
//! Every mutation to a note or notebook is captured as an immutable,
//! content-addressed [`op::SyncOperation`] tagged with a Lamport timestamp
//! and device id. Operations are persisted one file each under
//! `sync/pending/` for a transport layer to relay; replicas converge by
//! replaying the full operation set through the deterministic
//! last-write-wins merge in [`merge`].

pub mod clock;
pub mod cursor;
pub mod log;
pub mod merge;
pub mod op;

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::fs::FsError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("malformed operation: {0}")]
    Malformed(String),

    #[error("cursor would regress: ({current_ts}, {current_op}) -> ({proposed_ts}, {proposed_op})")]
    CursorRegression {
        current_ts: u64,
        current_op: String,
        proposed_ts: u64,
        proposed_op: String,
    },
}

pub type Result<T> = std::result::Result<T, SyncError>;
