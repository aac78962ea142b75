//! Acquisition engine: paced, bounded, retrying fetch with dedupe-aware commit.
//!
//! This module turns a [`Provider`](crate::provider::Provider)'s listing into
//! files on disk under a destination root.
//!
//! # Features
//!
//! - Bounded concurrency (1-20 simultaneous fetches)
//! - Uniformly jittered pacing before each fetch
//! - Exponential backoff retry with Retry-After support
//! - Streaming bodies into a staging area, hashed on the fly
//! - ZIP bundles unpacked into one staged file per `.sto` member
//! - Content duplicates recognised across the whole destination tree
//! - Write-then-rename placement; the ledger only names complete files
//! - Dry run and cooperative interruption
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use setup_downloader_core::download::AcquisitionOptions;
//!
//! let options = AcquisitionOptions {
//!     max_concurrency: 2,
//!     min_delay: Duration::ZERO,
//!     max_delay: Duration::ZERO,
//!     ..AcquisitionOptions::default()
//! };
//! assert!(options.validate().is_ok());
//! ```

mod constants;
mod engine;
mod error;
mod filename;
mod pacing;
mod result;
mod retry;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use constants::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY, MAX_CONCURRENCY, MAX_PACING_DELAY,
    MAX_RETRIES_LIMIT, MIN_CONCURRENCY, STAGING_DIR,
};
pub use engine::{AcquisitionOptions, Orchestrator};
pub use error::{AcquireError, RunError};
pub use filename::{destination_dir, sanitize_filename};
pub(crate) use filename::{filename_from_url, parse_content_disposition};
pub use pacing::{Pacer, parse_retry_after};
pub use result::{AcquisitionResult, ItemFailure, PlannedItem};
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error,
    classify_provider_error, retry_after_delay,
};

// Note: no module-local Result aliases; spell out `Result<T, AcquireError>`.

/// Locks `mutex`, recovering the guard if a unit panicked while holding it.
///
/// Ledger and index updates are applied whole under the lock, so a poisoned
/// guard still protects consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
