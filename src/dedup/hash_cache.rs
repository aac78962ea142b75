//! Persistent content-hash cache keyed by path, valid while size and
//! modification time are unchanged.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::HashError;
use crate::persist::{self, PersistError};

/// Read buffer used when streaming a file through the digest.
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// One cached hash and the file identity it was computed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashCacheEntry {
    /// Hex-encoded SHA-256.
    pub hash: String,
    /// File size in bytes when hashed.
    pub size: u64,
    /// Modification time (nanoseconds since the Unix epoch) when hashed.
    pub modified_at: u64,
}

/// File identity used to validate a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    size: u64,
    modified_at: u64,
}

impl FileStamp {
    fn read(path: &Path) -> Result<Self, HashError> {
        let metadata = std::fs::metadata(path).map_err(|e| HashError::io(path, e))?;
        if !metadata.is_file() {
            return Err(HashError::NotAFile {
                path: path.to_path_buf(),
            });
        }
        let modified_at = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
        Ok(Self {
            size: metadata.len(),
            modified_at,
        })
    }
}

/// Path → content hash cache with a JSON backing file.
///
/// A lookup hits only when the cached size and modification time equal the
/// file's current ones; otherwise the file is rehashed and the entry replaced.
#[derive(Debug, Default)]
pub struct HashCache {
    path: Option<PathBuf>,
    entries: HashMap<PathBuf, HashCacheEntry>,
    dirty: bool,
    rehash_count: usize,
    hit_count: usize,
    recovered_from_corruption: bool,
}

impl HashCache {
    /// Creates an empty cache that is never written to disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the cache stored at `path`.
    ///
    /// A missing file yields an empty cache. An unreadable or malformed file
    /// is logged and also yields an empty cache; individually malformed
    /// records are dropped.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut cache = Self {
            path: Some(path.clone()),
            ..Self::default()
        };

        match persist::load_json::<BTreeMap<String, serde_json::Value>>(&path) {
            Ok(Some(raw)) => {
                for (file, value) in raw {
                    match serde_json::from_value::<HashCacheEntry>(value) {
                        Ok(entry) => {
                            cache.entries.insert(PathBuf::from(file), entry);
                        }
                        Err(e) => {
                            warn!(file = %file, error = %e, "dropping malformed hash cache record");
                            cache.dirty = true;
                        }
                    }
                }
                debug!(path = %path.display(), entries = cache.entries.len(), "loaded hash cache");
            }
            Ok(None) => {
                debug!(path = %path.display(), "no hash cache yet");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "hash cache unreadable, starting empty");
                cache.recovered_from_corruption = true;
            }
        }

        cache
    }

    /// Writes the cache back to its file if anything changed.
    ///
    /// # Errors
    ///
    /// Propagates [`PersistError`] from the atomic write.
    pub fn flush(&mut self) -> Result<(), PersistError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        let snapshot: BTreeMap<String, &HashCacheEntry> = self
            .entries
            .iter()
            .map(|(file, entry)| (file.to_string_lossy().into_owned(), entry))
            .collect();
        persist::store_json(path, &snapshot)?;
        self.dirty = false;
        debug!(path = %path.display(), entries = snapshot.len(), "flushed hash cache");
        Ok(())
    }

    /// Returns the content hash of `path`, from cache when still valid.
    ///
    /// # Errors
    ///
    /// [`HashError`] when the file cannot be inspected or read.
    pub fn hash_file(&mut self, path: &Path) -> Result<String, HashError> {
        let stamp = FileStamp::read(path)?;

        if let Some(entry) = self.entries.get(path)
            && entry.size == stamp.size
            && entry.modified_at == stamp.modified_at
        {
            self.hit_count += 1;
            return Ok(entry.hash.clone());
        }

        let hash = hash_reader(path)?;
        self.rehash_count += 1;
        self.insert(path, &hash, stamp);
        Ok(hash)
    }

    /// Registers a file whose hash is already known (e.g. hashed while it
    /// was being written), without reading it again.
    ///
    /// # Errors
    ///
    /// [`HashError`] when the file cannot be inspected.
    pub fn record_known(&mut self, path: &Path, hash: &str) -> Result<(), HashError> {
        let stamp = FileStamp::read(path)?;
        self.insert(path, hash, stamp);
        Ok(())
    }

    /// Moves an entry to a new key after the file itself was renamed.
    ///
    /// The entry is revalidated lazily on the next [`Self::hash_file`].
    pub fn rename_entry(&mut self, from: &Path, to: &Path) {
        if let Some(entry) = self.entries.remove(from) {
            self.entries.insert(to.to_path_buf(), entry);
            self.dirty = true;
        }
    }

    /// Drops the entry for `path`, if any.
    pub fn invalidate(&mut self, path: &Path) {
        if self.entries.remove(path).is_some() {
            self.dirty = true;
        }
    }

    /// Drops entries whose files no longer exist. Returns how many were removed.
    pub fn cleanup_stale(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|path, _| path.is_file());
        let removed = before - self.entries.len();
        if removed > 0 {
            self.dirty = true;
            info!(removed, "removed stale hash cache entries");
        }
        removed
    }

    /// Cached entry for `path`, without validating it.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&HashCacheEntry> {
        self.entries.get(path)
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of files actually read and digested since load.
    #[must_use]
    pub fn rehash_count(&self) -> usize {
        self.rehash_count
    }

    /// Number of lookups served from cache since load.
    #[must_use]
    pub fn hit_count(&self) -> usize {
        self.hit_count
    }

    /// Returns true if the backing file existed but could not be used.
    #[must_use]
    pub fn recovered_from_corruption(&self) -> bool {
        self.recovered_from_corruption
    }

    fn insert(&mut self, path: &Path, hash: &str, stamp: FileStamp) {
        self.entries.insert(
            path.to_path_buf(),
            HashCacheEntry {
                hash: hash.to_string(),
                size: stamp.size,
                modified_at: stamp.modified_at,
            },
        );
        self.dirty = true;
    }
}

/// SHA-256 of an in-memory buffer, hex-encoded.
#[must_use]
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hash_reader(path: &Path) -> Result<String, HashError> {
    let file = File::open(path).map_err(|e| HashError::io(path, e))?;
    let mut reader = BufReader::with_capacity(HASH_BUFFER_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; HASH_BUFFER_SIZE];

    loop {
        let read = reader.read(&mut buffer).map_err(|e| HashError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
