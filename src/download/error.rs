//! Error types for the download module.
//!
//! [`AcquireError`] is a per-item failure: it is classified for retry and
//! then lands in the run's failure list. [`RunError`] aborts a run before
//! any item is scheduled.

use std::path::PathBuf;

use thiserror::Error;

use super::constants::{MAX_CONCURRENCY, MIN_CONCURRENCY};
use crate::dedup::HashError;
use crate::provider::ProviderError;
use crate::state::StateError;

/// Failure acquiring one item.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// The provider could not deliver the item.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// File system error while staging or placing the file (disk full,
    /// permission denied, ...).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The body ended before the declared content length.
    #[error(
        "integrity check failed for {path}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    Integrity {
        /// Staging path that failed verification.
        path: PathBuf,
        /// Declared size in bytes.
        expected_bytes: u64,
        /// Received size in bytes.
        actual_bytes: u64,
    },

    /// The provider delivered zero bytes.
    #[error("empty body received for {path}")]
    EmptyBody {
        /// Staging path.
        path: PathBuf,
    },

    /// A bundle could not be read as a ZIP archive.
    #[error("unreadable archive {path}: {message}")]
    Archive {
        /// Staged archive path.
        path: PathBuf,
        /// What the reader reported.
        message: String,
    },

    /// A bundle held no usable setup file.
    #[error("archive {path} contains no setup files")]
    EmptyArchive {
        /// Staged archive path.
        path: PathBuf,
    },

    /// The placed file could not be registered in the hash cache.
    #[error(transparent)]
    Hash(#[from] HashError),

    /// The ledger refused the record or could not be written.
    #[error("state error: {0}")]
    State(#[from] StateError),
}

impl AcquireError {
    /// Creates an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true when the provider rejected our credentials.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Provider(e) if e.is_auth())
    }
}

/// Failure that stops a run before (or instead of) scheduling items.
#[derive(Debug, Error)]
pub enum RunError {
    /// `DownloadState::load` was never called.
    #[error("download state not loaded; call load() before running")]
    StateNotLoaded,

    /// Concurrency outside the accepted range.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Other option out of range.
    #[error("invalid options: {message}")]
    InvalidOptions {
        /// What was wrong.
        message: String,
    },

    /// The provider rejected our credentials while listing.
    #[error("authentication failed: {0}")]
    Auth(#[source] ProviderError),

    /// The provider could not be reached at all.
    #[error("provider {provider} unreachable: {source}")]
    ProviderUnreachable {
        /// Provider name.
        provider: String,
        /// Underlying failure.
        #[source]
        source: ProviderError,
    },

    /// Creating the destination root failed.
    #[error("cannot prepare destination {path}: {source}")]
    Destination {
        /// Destination root.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,

    /// A blocking helper task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl RunError {
    /// Wraps a listing failure, separating authentication from reachability.
    pub fn from_listing(provider: &str, error: ProviderError) -> Self {
        if error.is_auth() {
            Self::Auth(error)
        } else {
            Self::ProviderUnreachable {
                provider: provider.to_string(),
                source: error,
            }
        }
    }

    /// Returns true for authentication failures.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}
