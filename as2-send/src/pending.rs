//! Pending-MDN record store.
//!
//! When a message requests an asynchronous MDN, the original MIC and the
//! pending file location must survive until the receiver's callback
//! arrives. Each record is one small text file named after the
//! filesystem-safe Message-ID: the MIC's AS2 string, a newline, the
//! pending file path, encoded as Latin-1. Writes go through a temp file
//! and an atomic rename so a concurrent reader never sees a torn record;
//! the rename doubles as the store's mutual exclusion.

use std::path::{Path, PathBuf};

use thiserror::Error;

use as2_types::filesystem_safe_id;

/// Pending store errors.
#[derive(Debug, Error)]
pub enum PendingError {
    /// Filesystem fault.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No record exists for the message.
    #[error("no pending record for message {message_id}")]
    NotFound {
        /// The Message-ID that was looked up.
        message_id: String,
    },

    /// A record exists but does not parse.
    #[error("malformed pending record for message {message_id}")]
    Malformed {
        /// The Message-ID whose record is broken.
        message_id: String,
    },
}

/// A stored pending-MDN record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRecord {
    /// The Message-ID the record belongs to.
    pub message_id: String,
    /// The original MIC in AS2 string form.
    pub mic: String,
    /// Where the payload copy waits for reconciliation.
    pub pending_file: PathBuf,
}

/// Filesystem-backed store of pending-MDN records.
///
/// Shared across sender tasks; puts to different Message-IDs are
/// independent files and need no coordination.
#[derive(Debug, Clone)]
pub struct PendingStore {
    directory: PathBuf,
}

impl PendingStore {
    /// Create a store rooted at `directory` (created lazily on first put).
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// The store's directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn record_path(&self, message_id: &str) -> PathBuf {
        self.directory.join(filesystem_safe_id(message_id))
    }

    /// Persist a record, replacing any previous one for the Message-ID.
    ///
    /// Returns the record's path.
    pub async fn put(
        &self,
        message_id: &str,
        mic: &str,
        pending_file: &Path,
    ) -> Result<PathBuf, PendingError> {
        tokio::fs::create_dir_all(&self.directory).await?;
        let path = self.record_path(message_id);
        let tmp = self
            .directory
            .join(format!("{}.tmp", filesystem_safe_id(message_id)));

        let mut content = latin1_bytes(mic);
        content.push(b'\n');
        content.extend_from_slice(&latin1_bytes(&pending_file.to_string_lossy()));

        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!("stored pending record for {} at {:?}", message_id, path);
        Ok(path)
    }

    /// Load the record for a Message-ID.
    pub async fn get(&self, message_id: &str) -> Result<PendingRecord, PendingError> {
        let path = self.record_path(message_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PendingError::NotFound {
                    message_id: message_id.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let text = latin1_string(&bytes);
        let (mic, pending_file) =
            text.split_once('\n')
                .ok_or_else(|| PendingError::Malformed {
                    message_id: message_id.to_string(),
                })?;
        let mic = mic.trim();
        let pending_file = pending_file.trim();
        if mic.is_empty() || pending_file.is_empty() {
            return Err(PendingError::Malformed {
                message_id: message_id.to_string(),
            });
        }
        Ok(PendingRecord {
            message_id: message_id.to_string(),
            mic: mic.to_string(),
            pending_file: PathBuf::from(pending_file),
        })
    }

    /// Delete the record for a Message-ID. Missing records are fine.
    pub async fn delete(&self, message_id: &str) -> Result<(), PendingError> {
        match tokio::fs::remove_file(self.record_path(message_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// The record encoding is Latin-1 for interoperability with existing
// pending directories: code points above U+00FF degrade to '?'.
fn latin1_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| {
            let code = c as u32;
            if code <= 0xFF {
                code as u8
            } else {
                b'?'
            }
        })
        .collect()
}

fn latin1_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}
