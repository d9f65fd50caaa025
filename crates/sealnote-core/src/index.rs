//! Encrypted newline-delimited JSON indexes.
//!
//! Index files under `refs/` hold one JSON record per line, encrypted whole.
//! Decoding is resilient: a single corrupt line is logged and skipped rather
//! than aborting the reload, so one bad record can never take down the
//! entire index.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::fs::FsError;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("malformed index: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Decrypted note metadata, one line of `refs/notes.jsonl.enc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRecord {
    pub note_id: String,
    pub title: String,
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

/// Decrypted notebook metadata, one line of `refs/notebooks.jsonl.enc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookRecord {
    pub notebook_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Serialize records as newline-delimited JSON.
pub fn encode_records<T: Serialize>(records: &[T]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for record in records {
        let line = serde_json::to_vec(record).map_err(|e| IndexError::Malformed(e.to_string()))?;
        out.extend_from_slice(&line);
        out.push(b'\n');
    }
    Ok(out)
}

/// Parse newline-delimited JSON, skipping malformed lines with a warning.
///
/// `label` names the record kind in log output.
pub fn decode_records<T: DeserializeOwned>(plaintext: &[u8], label: &str) -> Vec<T> {
    let text = String::from_utf8_lossy(plaintext);
    let mut records = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(
                    "Skipping malformed {} record on line {}: {}",
                    label,
                    line_no + 1,
                    e
                );
            }
        }
    }

    records
}
