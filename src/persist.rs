//! Atomic JSON persistence shared by the ledger and the hash cache.
//!
//! Files are written to a sibling temp path, synced, and renamed over the
//! target so a reader never observes a half-written document. Loading
//! distinguishes a missing file from a file that exists but cannot be
//! decoded, so callers can apply their own corruption policy.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

/// Errors raised while reading or writing a persisted document.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Filesystem error on the document or its temp file.
    #[error("IO error on {path}: {source}")]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The document exists but is not valid JSON for the expected schema.
    #[error("malformed document {path}: {source}")]
    Malformed {
        /// Path of the malformed document.
        path: PathBuf,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },

    /// The in-memory value could not be encoded.
    #[error("failed to encode {path}: {source}")]
    Encode {
        /// Destination path.
        path: PathBuf,
        /// Encoder error.
        #[source]
        source: serde_json::Error,
    },
}

impl PersistError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true when the failure means the document content is unusable
    /// (as opposed to the file being unreadable).
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

/// Reads and decodes a JSON document.
///
/// Returns `Ok(None)` when the file does not exist.
///
/// # Errors
///
/// [`PersistError::Io`] when the file exists but cannot be read,
/// [`PersistError::Malformed`] when it cannot be decoded.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistError> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PersistError::io(path, e)),
    };

    serde_json::from_slice(&raw)
        .map(Some)
        .map_err(|source| PersistError::Malformed {
            path: path.to_path_buf(),
            source,
        })
}

/// Encodes `value` as pretty JSON and atomically replaces `path` with it.
///
/// Parent directories are created as needed.
///
/// # Errors
///
/// [`PersistError::Encode`] if serialization fails, [`PersistError::Io`] for
/// any filesystem failure. On failure the previous document is left intact.
pub fn store_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let encoded = serde_json::to_vec_pretty(value).map_err(|source| PersistError::Encode {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PersistError::io(parent, e))?;
    }

    let tmp_path = temp_path_for(path);
    let write_result = write_synced(&tmp_path, &encoded);
    if let Err(e) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(PersistError::io(&tmp_path, e));
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(PersistError::io(path, e));
    }

    debug!(path = %path.display(), bytes = encoded.len(), "persisted document");
    Ok(())
}

fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file: File = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
