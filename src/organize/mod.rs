//! Reorganizing setup files already on disk into the catalog layout.
//!
//! [`Organizer::run`] scans a source tree for `.sto` files, works out each
//! file's subject (its car folder) and location (from the filename or the
//! folders around it), resolves the location against the catalog, and moves
//! or copies the file to `<destination>/<subject>/<layout path>/<file name>`.
//! Companion files travel with their setup.
//!
//! Files whose content already exists in the destination tree are not
//! relocated: in move mode the source copy (and its companions) is deleted,
//! in copy mode it is left alone.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use setup_downloader_core::{CatalogIndex, Deduplicator, HashCache, Resolver};
//! use setup_downloader_core::organize::{OrganizeOptions, Organizer};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = Arc::new(Resolver::new(Arc::new(CatalogIndex::bundled()?)));
//! let mut dedup = Deduplicator::new(HashCache::load("hash_cache.json"));
//! let organizer = Organizer::new(resolver);
//! let result = organizer.run(
//!     &mut dedup,
//!     Path::new("./unsorted"),
//!     Path::new("./setups"),
//!     &OrganizeOptions::default(),
//! )?;
//! println!("{result}");
//! # Ok(())
//! # }
//! ```

mod companion;
mod extract;

pub use companion::{COMPANION_EXTENSIONS, find_companions};
pub use extract::LocationSource;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::dedup::{Deduplicator, HashError};
use crate::naming::is_setup_file;
use crate::resolver::Resolver;

/// Errors that stop an organize run before any file is touched.
#[derive(Debug, Error)]
pub enum OrganizeError {
    /// The source directory does not exist.
    #[error("source path not found: {path}")]
    SourceMissing {
        /// Requested source.
        path: PathBuf,
    },

    /// The source exists but is not a directory.
    #[error("source path is not a directory: {path}")]
    NotADirectory {
        /// Requested source.
        path: PathBuf,
    },
}

/// Options for [`Organizer::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizeOptions {
    /// Copy instead of move; duplicates are then left in place.
    pub copy: bool,
    /// Category hint applied to every resolution (`GT3`, `oval`, ...).
    pub category_hint: Option<String>,
    /// Report only; touch nothing.
    pub dry_run: bool,
}

/// Why a file was left where it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No location could be extracted from the name or folders.
    NoLocation,
    /// The location text did not resolve against the catalog.
    Unresolved {
        /// Extracted location text.
        location: String,
    },
    /// The file sits directly in the source root.
    NoSubject,
    /// The file is already where it belongs.
    AlreadyInPlace,
    /// A different file already occupies the destination.
    DestinationExists {
        /// Occupied destination.
        path: PathBuf,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoLocation => f.write_str("could not determine track name"),
            Self::Unresolved { location } => {
                write!(f, "could not match track '{location}' to a catalog path")
            }
            Self::NoSubject => f.write_str("could not determine car folder"),
            Self::AlreadyInPlace => f.write_str("already in correct location"),
            Self::DestinationExists { path } => {
                write!(f, "destination already exists: {}", path.display())
            }
        }
    }
}

/// What happened (or would happen) to one file.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// Moved or copied to the destination.
    Organized,
    /// Dry run: would be moved or copied.
    Planned,
    /// Left alone.
    Skipped(SkipReason),
    /// Identical content already exists at `existing`.
    Duplicate {
        /// The copy that stays.
        existing: PathBuf,
        /// The source copy was deleted.
        deleted: bool,
    },
    /// The file operation failed.
    Failed(String),
}

/// One file's organize action.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganizeAction {
    /// File as found.
    pub source: PathBuf,
    /// Computed destination, when one was resolved.
    pub destination: Option<PathBuf>,
    /// Car folder name.
    pub subject: String,
    /// Extracted location text.
    pub location: String,
    /// Where the location text came from.
    pub location_source: Option<LocationSource>,
    /// Catalog-relative layout path.
    pub relative_path: String,
    /// Resolution confidence.
    pub confidence: f64,
    /// Companion files moved, copied or (dry run) found.
    pub companion_files: usize,
    /// Outcome.
    pub outcome: ActionOutcome,
}

impl OrganizeAction {
    fn new(source: PathBuf) -> Self {
        Self {
            source,
            destination: None,
            subject: String::new(),
            location: String::new(),
            location_source: None,
            relative_path: String::new(),
            confidence: 0.0,
            companion_files: 0,
            outcome: ActionOutcome::Planned,
        }
    }

    fn skip(mut self, reason: SkipReason) -> Self {
        debug!(source = %self.source.display(), %reason, "skipping");
        self.outcome = ActionOutcome::Skipped(reason);
        self
    }
}

/// Summary of an organize run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrganizeResult {
    /// Setup files found.
    pub total: usize,
    /// Files moved or copied (or that would be, in a dry run).
    pub organized: usize,
    /// Files left alone, duplicates included.
    pub skipped: usize,
    /// Files whose relocation failed.
    pub failed: usize,
    /// Files whose content already existed in the destination tree.
    pub duplicates_found: usize,
    /// Duplicate sources deleted (move mode only).
    pub duplicates_deleted: usize,
    /// Bytes freed by deleting duplicates and their companions.
    pub bytes_saved: u64,
    /// Companion files moved or copied.
    pub companion_files_moved: usize,
    /// Per-file actions, in scan order.
    pub actions: Vec<OrganizeAction>,
}

impl fmt::Display for OrganizeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total: {}, Organized: {}, Skipped: {}, Failed: {}",
            self.total, self.organized, self.skipped, self.failed
        )?;
        if self.duplicates_found > 0 {
            write!(f, ", Duplicates: {}", self.duplicates_found)?;
        }
        if self.companion_files_moved > 0 {
            write!(f, ", Companion files: {}", self.companion_files_moved)?;
        }
        Ok(())
    }
}

/// Moves setup files into the catalog layout.
#[derive(Debug, Clone)]
pub struct Organizer {
    resolver: Arc<Resolver>,
}

impl Organizer {
    /// Creates an organizer over `resolver`.
    #[must_use]
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self { resolver }
    }

    /// Organizes every setup file under `source` into `destination`.
    ///
    /// `destination` may equal `source` to reorganize in place. The
    /// deduplicator is indexed over `destination` first; its hash cache is
    /// updated in memory and left for the caller to flush.
    ///
    /// # Errors
    ///
    /// [`OrganizeError`] when `source` is missing or not a directory.
    /// Per-file failures are reported in the result instead.
    #[instrument(skip(self, dedup, options), fields(source = %source.display(), destination = %destination.display()))]
    pub fn run(
        &self,
        dedup: &mut Deduplicator,
        source: &Path,
        destination: &Path,
        options: &OrganizeOptions,
    ) -> Result<OrganizeResult, OrganizeError> {
        if !source.exists() {
            return Err(OrganizeError::SourceMissing {
                path: source.to_path_buf(),
            });
        }
        if !source.is_dir() {
            return Err(OrganizeError::NotADirectory {
                path: source.to_path_buf(),
            });
        }

        info!("building duplicate index");
        dedup.build_index(destination);

        let files = scan_setup_files(source);
        info!(count = files.len(), "found setup files");

        let mut result = OrganizeResult {
            total: files.len(),
            ..OrganizeResult::default()
        };

        for file in files {
            let mut action = self.plan(dedup, &file, source, destination, options);
            match &action.outcome {
                ActionOutcome::Skipped(_) => result.skipped += 1,
                ActionOutcome::Duplicate { existing, .. } => {
                    result.duplicates_found += 1;
                    result.skipped += 1;
                    if !options.dry_run && !options.copy {
                        let existing = existing.clone();
                        if let Some(freed) = delete_duplicate(dedup, &file, &existing, source) {
                            result.duplicates_deleted += 1;
                            result.bytes_saved += freed;
                            action.outcome = ActionOutcome::Duplicate {
                                existing,
                                deleted: true,
                            };
                        }
                    }
                }
                ActionOutcome::Failed(_) => result.failed += 1,
                ActionOutcome::Planned | ActionOutcome::Organized => {
                    if options.dry_run {
                        action.companion_files = find_companions(&file).len();
                        result.companion_files_moved += action.companion_files;
                        result.organized += 1;
                    } else {
                        match execute(dedup, &action, source, options.copy) {
                            Ok(companions) => {
                                action.companion_files = companions;
                                action.outcome = ActionOutcome::Organized;
                                result.companion_files_moved += companions;
                                result.organized += 1;
                            }
                            Err(e) => {
                                warn!(source = %file.display(), error = %e, "failed to organize");
                                action.outcome = ActionOutcome::Failed(e.to_string());
                                result.failed += 1;
                            }
                        }
                    }
                }
            }
            result.actions.push(action);
        }

        info!(
            total = result.total,
            organized = result.organized,
            skipped = result.skipped,
            failed = result.failed,
            duplicates = result.duplicates_found,
            dry_run = options.dry_run,
            "organize complete"
        );
        Ok(result)
    }

    /// Decides what to do with one file without touching the filesystem.
    fn plan(
        &self,
        dedup: &mut Deduplicator,
        file: &Path,
        source_root: &Path,
        destination_root: &Path,
        options: &OrganizeOptions,
    ) -> OrganizeAction {
        let mut action = OrganizeAction::new(file.to_path_buf());
        let Ok(relative) = file.strip_prefix(source_root) else {
            return action.skip(SkipReason::NoLocation);
        };

        let subject = extract::subject_folder(relative);
        let Some(location) = extract::extract_location(&self.resolver, relative) else {
            return action.skip(SkipReason::NoLocation);
        };
        action.location.clone_from(&location.text);
        action.location_source = Some(location.source);

        let hint = options.category_hint.as_deref().or(location.category.as_deref());
        let resolution = self.resolver.resolve_with_hint_text(&location.text, hint);
        let Some(resolved) = resolution.into_resolved() else {
            return action.skip(SkipReason::Unresolved {
                location: location.text,
            });
        };
        action.relative_path = resolved.relative_path;
        action.confidence = resolved.confidence;

        let Some(subject) = subject else {
            return action.skip(SkipReason::NoSubject);
        };
        let Some(file_name) = file.file_name() else {
            return action.skip(SkipReason::NoLocation);
        };

        let mut target = destination_root.join(&subject);
        for segment in action.relative_path.split('/') {
            target.push(segment);
        }
        target.push(file_name);
        action.subject = subject;
        action.destination = Some(target.clone());

        if target == file {
            return action.skip(SkipReason::AlreadyInPlace);
        }

        if target.exists() {
            return match dedup.is_duplicate(file, &target) {
                Ok(true) => {
                    action.outcome = ActionOutcome::Duplicate {
                        existing: target,
                        deleted: false,
                    };
                    action
                }
                Ok(false) => action.skip(SkipReason::DestinationExists { path: target }),
                Err(e) => failed(action, &e),
            };
        }

        match dedup.find_duplicate(file) {
            Ok(Some(existing)) => {
                debug!(source = %file.display(), existing = %existing.display(), "binary duplicate");
                action.outcome = ActionOutcome::Duplicate {
                    existing,
                    deleted: false,
                };
                action
            }
            Ok(None) => action,
            Err(e) => failed(action, &e),
        }
    }
}

fn failed(mut action: OrganizeAction, error: &HashError) -> OrganizeAction {
    warn!(source = %action.source.display(), error = %error, "cannot hash file");
    action.outcome = ActionOutcome::Failed(error.to_string());
    action
}

/// Every `.sto` file under `root`, sorted, skipping hidden directories.
fn scan_setup_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with('.'))
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "cannot read directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_setup_file(entry.path()))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Moves or copies the file and its companions. Returns the companion count.
fn execute(
    dedup: &mut Deduplicator,
    action: &OrganizeAction,
    source_root: &Path,
    copy: bool,
) -> std::io::Result<usize> {
    let Some(target) = action.destination.as_deref() else {
        return Ok(0);
    };
    let Some(dest_dir) = target.parent() else {
        return Ok(0);
    };
    std::fs::create_dir_all(dest_dir)?;

    let companions = find_companions(&action.source);
    let hash = dedup.content_hash(&action.source).ok();

    companion::transfer(&action.source, target, copy)?;
    info!(from = %action.source.display(), to = %target.display(), copy, "organized");

    if let Some(hash) = hash {
        if copy {
            if let Err(e) = dedup.cache_mut().record_known(target, &hash) {
                debug!(error = %e, "could not register copied file in hash cache");
            }
            dedup.add_to_index(target, &hash);
        } else {
            dedup.record_move(&action.source, target, &hash);
            dedup.cache_mut().rename_entry(&action.source, target);
        }
    }

    let moved = companion::relocate(&companions, dest_dir, copy);
    if !copy && let Some(parent) = action.source.parent() {
        prune_empty_dirs(parent, source_root);
    }
    Ok(moved)
}

/// Deletes a duplicate source and its companions. Returns bytes freed, or
/// `None` when the source could not be deleted.
fn delete_duplicate(
    dedup: &mut Deduplicator,
    file: &Path,
    existing: &Path,
    source_root: &Path,
) -> Option<u64> {
    let size = std::fs::metadata(file).map(|m| m.len()).unwrap_or(0);
    let mut freed = companion::delete(&find_companions(file));

    if let Err(e) = std::fs::remove_file(file) {
        warn!(path = %file.display(), error = %e, "failed to delete duplicate");
        return None;
    }
    freed += size;
    info!(path = %file.display(), existing = %existing.display(), "deleted duplicate");

    dedup.remove_from_index(file);
    dedup.cache_mut().invalidate(file);
    if let Some(parent) = file.parent() {
        prune_empty_dirs(parent, source_root);
    }
    Some(freed)
}

/// Removes `start` and its ancestors while they are empty, stopping at (and
/// never removing) `stop_at`.
fn prune_empty_dirs(start: &Path, stop_at: &Path) {
    let mut dir = start;
    while dir != stop_at && dir.starts_with(stop_at) {
        let is_empty = std::fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none());
        if !is_empty || std::fs::remove_dir(dir).is_err() {
            break;
        }
        debug!(path = %dir.display(), "removed empty directory");
        match dir.parent() {
            Some(parent) => dir = parent,
            None => break,
        }
    }
}
