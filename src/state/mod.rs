//! Persistent ledger of completed acquisitions.
//!
//! The ledger maps `"<provider>:<item-id>"` to the stored file paths (one per
//! setup, several when the item arrived as a bundle) and the revision marker
//! they were acquired at. It drives skip decisions: an item is skipped only
//! when all of its files still exist and the recorded revision is at least as
//! new as the provider's current one.
//!
//! Missing or corrupt ledger files are never fatal; they load as an empty
//! ledger (a full re-acquisition) with a warning.
//!
//! # Example
//!
//! ```no_run
//! use setup_downloader_core::state::DownloadState;
//!
//! let mut state = DownloadState::new("/home/me/.setup-downloader/state.json");
//! state.load();
//! println!("{} records", state.len());
//! ```

mod revision;

pub use revision::RevisionMarker;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::persist::{self, PersistError};
use crate::provider::AcquirableItem;

/// Errors raised by [`DownloadState`].
#[derive(Debug, Error)]
pub enum StateError {
    /// The ledger was used before [`DownloadState::load`].
    #[error("download state has not been loaded")]
    NotLoaded,

    /// A record was attempted for a file that is not present on disk.
    #[error("refusing to record unverified file {path}")]
    Unverified {
        /// Path that failed verification.
        path: PathBuf,
    },

    /// Writing the ledger failed.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// One ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Where the acquired files are stored. Older ledgers wrote a single
    /// `path` string; it loads as a one-element list.
    #[serde(alias = "path", deserialize_with = "one_or_many")]
    pub paths: Vec<PathBuf>,
    /// Source revision marker at the time of storage.
    pub revision_marker: String,
    /// When the record was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(PathBuf),
    Many(Vec<PathBuf>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(path) => vec![path],
        OneOrMany::Many(paths) => paths,
    })
}

/// The acquisition ledger.
#[derive(Debug, Default)]
pub struct DownloadState {
    path: Option<PathBuf>,
    records: BTreeMap<String, LedgerEntry>,
    loaded: bool,
    dirty: bool,
    recovered_from_corruption: bool,
}

/// Ledger key for a provider-scoped item id.
#[must_use]
pub fn ledger_key(provider: &str, item_id: &str) -> String {
    format!("{provider}:{item_id}")
}

impl DownloadState {
    /// Creates an unloaded ledger backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Creates a loaded, empty ledger that is never written to disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            loaded: true,
            ..Self::default()
        }
    }

    /// Reads the ledger file, replacing any in-memory records.
    ///
    /// Never fails: a missing file loads as empty, an unreadable or malformed
    /// one loads as empty with a warning, and individually malformed records
    /// are skipped.
    pub fn load(&mut self) {
        self.records.clear();
        self.recovered_from_corruption = false;
        self.loaded = true;

        let Some(path) = self.path.clone() else {
            return;
        };

        match persist::load_json::<BTreeMap<String, serde_json::Value>>(&path) {
            Ok(Some(raw)) => {
                for (key, value) in raw {
                    match serde_json::from_value::<LedgerEntry>(value) {
                        Ok(entry) if key.contains(':') => {
                            self.records.insert(key, entry);
                        }
                        Ok(_) => warn!(key = %key, "skipping ledger record with malformed key"),
                        Err(e) => warn!(key = %key, error = %e, "skipping malformed ledger record"),
                    }
                }
                info!(path = %path.display(), records = self.records.len(), "loaded download state");
            }
            Ok(None) => debug!(path = %path.display(), "no download state yet"),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "download state unreadable, treating as empty (full re-acquisition)"
                );
                self.recovered_from_corruption = true;
            }
        }
    }

    /// Returns true once [`Self::load`] has run (or for in-memory ledgers).
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Returns true when the last load found an unusable ledger file.
    #[must_use]
    pub fn recovered_from_corruption(&self) -> bool {
        self.recovered_from_corruption
    }

    /// Decides whether `item` can be skipped.
    ///
    /// True only when a record exists, all of its files are still on disk,
    /// and the recorded revision is at least as new as the item's.
    #[must_use]
    pub fn should_skip(&self, item: &AcquirableItem) -> bool {
        let Some(entry) = self.lookup(&item.provider, &item.id) else {
            return false;
        };
        if entry.paths.is_empty() {
            return false;
        }
        if let Some(missing) = entry.paths.iter().find(|path| !path.is_file()) {
            debug!(item_id = %item.id, path = %missing.display(), "recorded file missing");
            return false;
        }

        let recorded = RevisionMarker::parse(&entry.revision_marker);
        let current = RevisionMarker::parse(&item.revision);
        let up_to_date = recorded.is_up_to_date_with(&current);
        if !up_to_date {
            debug!(
                item_id = %item.id,
                recorded = %entry.revision_marker,
                current = %item.revision,
                "revision changed or not comparable"
            );
        }
        up_to_date
    }

    /// Records `item` as stored at `stored_path`, overwriting any previous record.
    ///
    /// # Errors
    ///
    /// [`StateError::NotLoaded`] before [`Self::load`];
    /// [`StateError::Unverified`] if `stored_path` is not an existing file.
    pub fn record(&mut self, item: &AcquirableItem, stored_path: &Path) -> Result<(), StateError> {
        self.record_all(item, &[stored_path.to_path_buf()])
    }

    /// Records `item` as stored at every path in `stored_paths`.
    ///
    /// # Errors
    ///
    /// As [`Self::record`]; an empty list is [`StateError::Unverified`] too.
    pub fn record_all(
        &mut self,
        item: &AcquirableItem,
        stored_paths: &[PathBuf],
    ) -> Result<(), StateError> {
        if !self.loaded {
            return Err(StateError::NotLoaded);
        }
        let Some(first) = stored_paths.first() else {
            return Err(StateError::Unverified {
                path: PathBuf::new(),
            });
        };
        if let Some(missing) = stored_paths.iter().find(|path| !path.is_file()) {
            return Err(StateError::Unverified {
                path: missing.clone(),
            });
        }

        let mut paths = Vec::with_capacity(stored_paths.len());
        for path in stored_paths {
            if !paths.contains(path) {
                paths.push(path.clone());
            }
        }
        debug!(item_id = %item.id, first = %first.display(), files = paths.len(), "recording item");

        self.records.insert(
            ledger_key(&item.provider, &item.id),
            LedgerEntry {
                paths,
                revision_marker: item.revision.clone(),
                recorded_at: Some(Utc::now()),
            },
        );
        self.dirty = true;
        Ok(())
    }

    /// Atomically writes the ledger if it changed.
    ///
    /// # Errors
    ///
    /// [`StateError::NotLoaded`] before [`Self::load`], or the persistence error.
    pub fn flush(&mut self) -> Result<(), StateError> {
        if !self.loaded {
            return Err(StateError::NotLoaded);
        }
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        persist::store_json(path, &self.records)?;
        self.dirty = false;
        debug!(path = %path.display(), records = self.records.len(), "flushed download state");
        Ok(())
    }

    /// Looks up the record for an item.
    #[must_use]
    pub fn lookup(&self, provider: &str, item_id: &str) -> Option<&LedgerEntry> {
        self.records.get(&ledger_key(provider, item_id))
    }

    /// Removes the record for an item. Returns true if one existed.
    pub fn forget(&mut self, provider: &str, item_id: &str) -> bool {
        let removed = self.records.remove(&ledger_key(provider, item_id)).is_some();
        if removed {
            self.dirty = true;
        }
        removed
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the ledger holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record counts per provider.
    #[must_use]
    pub fn stats(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for key in self.records.keys() {
            let provider = key.split_once(':').map_or(key.as_str(), |(p, _)| p);
            *counts.entry(provider.to_string()).or_insert(0) += 1;
        }
        counts
    }
}
