//! Content index over a destination tree.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use super::HashError;
use super::hash_cache::HashCache;

/// Outcome of reserving a hash for a file about to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// No indexed file had this hash; it is now reserved for the caller.
    Claimed,
    /// An identical file already exists at this path.
    Existing(PathBuf),
}

/// Counts from an index build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Files hashed or served from cache.
    pub indexed_files: usize,
    /// Distinct hashes among them.
    pub unique_hashes: usize,
    /// Files that could not be hashed (logged and skipped).
    pub errors: usize,
}

/// Decides whether a candidate file duplicates one already in the tree.
///
/// Owns the [`HashCache`]; every hash goes through it.
#[derive(Debug)]
pub struct Deduplicator {
    cache: HashCache,
    by_hash: HashMap<String, PathBuf>,
    by_path: HashMap<PathBuf, String>,
}

impl Deduplicator {
    /// Creates a deduplicator with an empty index.
    #[must_use]
    pub fn new(cache: HashCache) -> Self {
        Self {
            cache,
            by_hash: HashMap::new(),
            by_path: HashMap::new(),
        }
    }

    /// Hashes every regular file under `root` into the index.
    ///
    /// Hidden directories (including the download staging area) are skipped.
    /// Files are visited in sorted order; the first path seen for a hash
    /// becomes its canonical copy. A missing root yields an empty index.
    #[instrument(skip_all, fields(root = %root.display()))]
    pub fn build_index(&mut self, root: &Path) -> IndexStats {
        let mut stats = IndexStats::default();
        if !root.is_dir() {
            debug!("index root missing, nothing to index");
            return stats;
        }

        let walker = WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !(e.file_type().is_dir() && is_hidden(e.file_name())));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    stats.errors += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            match self.cache.hash_file(entry.path()) {
                Ok(hash) => {
                    self.add_to_index(entry.path(), &hash);
                    stats.indexed_files += 1;
                }
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "skipping unhashable file");
                    stats.errors += 1;
                }
            }
        }

        stats.unique_hashes = self.by_hash.len();
        info!(
            indexed = stats.indexed_files,
            unique = stats.unique_hashes,
            rehashed = self.cache.rehash_count(),
            "built duplicate index"
        );
        stats
    }

    /// Content hash of `path`, through the cache.
    ///
    /// # Errors
    ///
    /// [`HashError`] if the file cannot be read.
    pub fn content_hash(&mut self, path: &Path) -> Result<String, HashError> {
        self.cache.hash_file(path)
    }

    /// Returns an indexed file identical to `path`, never `path` itself.
    ///
    /// # Errors
    ///
    /// [`HashError`] if `path` cannot be hashed.
    pub fn find_duplicate(&mut self, path: &Path) -> Result<Option<PathBuf>, HashError> {
        let hash = self.cache.hash_file(path)?;
        Ok(self
            .by_hash
            .get(&hash)
            .filter(|existing| existing.as_path() != path)
            .cloned())
    }

    /// Indexed file with the given hash.
    #[must_use]
    pub fn find_by_hash(&self, hash: &str) -> Option<&Path> {
        self.by_hash.get(hash).map(PathBuf::as_path)
    }

    /// Returns true when both files have identical content.
    ///
    /// # Errors
    ///
    /// [`HashError`] if either file cannot be hashed.
    pub fn is_duplicate(&mut self, a: &Path, b: &Path) -> Result<bool, HashError> {
        let size_a = std::fs::metadata(a).map_err(|e| HashError::io(a, e))?.len();
        let size_b = std::fs::metadata(b).map_err(|e| HashError::io(b, e))?.len();
        if size_a != size_b {
            return Ok(false);
        }
        Ok(self.cache.hash_file(a)? == self.cache.hash_file(b)?)
    }

    /// Adds a file to the index. An existing canonical copy for the hash is kept.
    pub fn add_to_index(&mut self, path: &Path, hash: &str) {
        self.by_hash
            .entry(hash.to_string())
            .or_insert_with(|| path.to_path_buf());
        self.by_path.insert(path.to_path_buf(), hash.to_string());
    }

    /// Removes a file from the index (e.g. after it was deleted or moved).
    pub fn remove_from_index(&mut self, path: &Path) {
        if let Some(hash) = self.by_path.remove(path)
            && self.by_hash.get(&hash).is_some_and(|p| p == path)
        {
            self.by_hash.remove(&hash);
            // Promote another indexed copy, if one exists.
            if let Some((other, _)) = self.by_path.iter().find(|(_, h)| **h == hash) {
                self.by_hash.insert(hash, other.clone());
            }
        }
    }

    /// Re-keys a file that was renamed from `from` to `to`.
    ///
    /// A canonical copy stays canonical at its new path. No other copy is
    /// promoted in between, so a sibling with the same content still finds
    /// the moved file as its duplicate.
    pub fn record_move(&mut self, from: &Path, to: &Path, hash: &str) {
        self.by_path.remove(from);
        self.by_path.insert(to.to_path_buf(), hash.to_string());
        let keeps_canonical = self.by_hash.get(hash).is_none_or(|p| p == from);
        if keeps_canonical {
            self.by_hash.insert(hash.to_string(), to.to_path_buf());
        }
    }

    /// Atomically checks for an identical file and, if none, reserves `hash`
    /// for `path`.
    pub fn claim(&mut self, hash: &str, path: &Path) -> Claim {
        if let Some(existing) = self.by_hash.get(hash) {
            return Claim::Existing(existing.clone());
        }
        self.add_to_index(path, hash);
        Claim::Claimed
    }

    /// Undoes a [`Self::claim`] whose commit failed.
    pub fn release(&mut self, hash: &str, path: &Path) {
        if self.by_hash.get(hash).is_some_and(|p| p == path) {
            self.remove_from_index(path);
        }
    }

    /// Number of indexed files.
    #[must_use]
    pub fn indexed_files(&self) -> usize {
        self.by_path.len()
    }

    /// Number of distinct hashes in the index.
    #[must_use]
    pub fn unique_hashes(&self) -> usize {
        self.by_hash.len()
    }

    /// The underlying hash cache.
    #[must_use]
    pub fn cache(&self) -> &HashCache {
        &self.cache
    }

    /// Mutable access to the hash cache.
    pub fn cache_mut(&mut self) -> &mut HashCache {
        &mut self.cache
    }

    /// Gives back the hash cache.
    #[must_use]
    pub fn into_cache(self) -> HashCache {
        self.cache
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}
