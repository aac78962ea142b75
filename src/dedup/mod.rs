//! Content-hash deduplication with a modification-aware hash cache.
//!
//! [`HashCache`] maps a file path to its SHA-256, reusing the stored hash
//! while the file's size and modification time are unchanged.
//! [`Deduplicator`] indexes a destination tree by hash and answers "is this
//! candidate already present, under any name?".
//!
//! Neither type deletes files; callers decide what to do with duplicates.

mod detector;
mod hash_cache;

pub use detector::{Claim, Deduplicator, IndexStats};
pub use hash_cache::{HashCache, HashCacheEntry, hash_bytes};

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while hashing a file.
#[derive(Debug, Error)]
pub enum HashError {
    /// The file could not be inspected or read.
    #[error("IO error hashing {path}: {source}")]
    Io {
        /// File being hashed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The path exists but is not a regular file.
    #[error("not a regular file: {path}")]
    NotAFile {
        /// Offending path.
        path: PathBuf,
    },
}

impl HashError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
