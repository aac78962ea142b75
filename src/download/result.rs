//! Run statistics and the final [`AcquisitionResult`].

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// One failed item and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Provider-scoped item id.
    pub item_id: String,
    /// Human-readable final error.
    pub reason: String,
}

/// Where a dry run would have placed an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedItem {
    /// Provider-scoped item id.
    pub item_id: String,
    /// Destination directory.
    pub destination: PathBuf,
}

/// Summary of an acquisition run.
///
/// `skipped` covers items already up to date plus duplicates of files already
/// in the tree; `duplicates` is the latter share. In dry-run mode `acquired`
/// counts the items that would be fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquisitionResult {
    /// Items the provider offered.
    pub available: usize,
    /// Items not written (up to date or duplicate).
    pub skipped: usize,
    /// Items written (or that would be, in a dry run).
    pub acquired: usize,
    /// Items that failed after all attempts.
    pub failed: usize,
    /// Items whose content already existed under another name.
    pub duplicates: usize,
    /// Retry attempts made across all items.
    pub retried: usize,
    /// Bytes placed into the destination tree.
    pub bytes_written: u64,
    /// Per-item failure reasons.
    pub failures: Vec<ItemFailure>,
    /// The run was interrupted before all items finished.
    pub interrupted: bool,
    /// The run stopped scheduling early; carries the reason.
    pub aborted: Option<String>,
    /// Dry-run placement plan.
    pub planned: Vec<PlannedItem>,
}

impl AcquisitionResult {
    /// True when nothing failed and the run neither aborted nor was interrupted.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.aborted.is_none() && !self.interrupted
    }

    /// Items accounted for (skipped, acquired or failed).
    #[must_use]
    pub fn processed(&self) -> usize {
        self.skipped + self.acquired + self.failed
    }
}

/// Counters shared by every unit of a run.
#[derive(Debug, Default)]
pub(crate) struct RunStats {
    acquired: AtomicUsize,
    failed: AtomicUsize,
    duplicates: AtomicUsize,
    retried: AtomicUsize,
    bytes_written: AtomicU64,
    interrupted: AtomicBool,
    failures: Mutex<Vec<ItemFailure>>,
    abort_reason: Mutex<Option<String>>,
}

impl RunStats {
    pub(crate) fn increment_acquired(&self, bytes: u64) {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        self.bytes_written.fetch_add(bytes, Ordering::SeqCst);
    }

    pub(crate) fn increment_duplicates(&self) {
        self.duplicates.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_retried(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_failure(&self, item_id: &str, reason: String) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        let mut failures = self
            .failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        failures.push(ItemFailure {
            item_id: item_id.to_string(),
            reason,
        });
    }

    pub(crate) fn set_interrupted(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub(crate) fn was_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Records the first abort reason; later ones are ignored.
    pub(crate) fn abort(&self, reason: String) {
        let mut slot = self
            .abort_reason
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(reason);
        }
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.abort_reason
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub(crate) fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Snapshot of the final result. `skipped` is the pre-filtered count.
    ///
    /// Takes `&self` because aborted units may still hold a reference.
    pub(crate) fn to_result(&self, available: usize, skipped: usize) -> AcquisitionResult {
        let duplicates = self.duplicates.load(Ordering::SeqCst);
        let mut failures = self
            .failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        failures.sort_by(|a, b| a.item_id.cmp(&b.item_id));

        AcquisitionResult {
            available,
            skipped: skipped + duplicates,
            acquired: self.acquired.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            duplicates,
            retried: self.retried.load(Ordering::SeqCst),
            bytes_written: self.bytes_written.load(Ordering::SeqCst),
            failures,
            interrupted: self.interrupted.load(Ordering::SeqCst),
            aborted: self
                .abort_reason
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone(),
            planned: Vec::new(),
        }
    }
}
