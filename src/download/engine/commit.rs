//! Staging and committing fetched bytes.
//!
//! Bytes stream into `<root>/.staging/<provider>-<hex id>.part` while being
//! hashed, so no reader ever sees a partial file in the tree. Bundles are
//! split into one staged file per setup first. Commit then claims each hash
//! in the deduplicator and renames the staged file into place, all under
//! the deduplicator lock, so two units with identical content cannot both
//! be written.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use super::UnitContext;
use crate::dedup::Claim;
use crate::download::constants::STAGING_DIR;
use crate::download::error::AcquireError;
use crate::download::filename::{resolve_unique_path, sanitize_filename};
use crate::download::lock;
use crate::provider::{AcquirableItem, FetchedAsset, Packaging};

/// A fully received, hashed body waiting in the staging directory.
#[derive(Debug)]
pub(super) struct StagedAsset {
    pub(super) path: PathBuf,
    pub(super) hash: String,
    pub(super) size: u64,
    pub(super) filename: String,
    /// Car folder chosen for a bundle member; `None` uses the item's subject.
    pub(super) subject: Option<String>,
    pub(super) packaging: Packaging,
}

/// What a commit did with the staged bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum CommitOutcome {
    /// Placed at `path`.
    Written { path: PathBuf, bytes: u64 },
    /// Identical content already at `existing`; nothing written.
    Duplicate { existing: PathBuf },
}

impl CommitOutcome {
    fn stored_path(&self) -> &Path {
        match self {
            Self::Written { path, .. } => path,
            Self::Duplicate { existing } => existing,
        }
    }
}

/// Per-item staging file, unique per `(provider, id)`.
///
/// The id is hex-encoded rather than sanitised: sanitising maps distinct ids
/// such as `a/b` and `a_b` to the same name.
pub(super) fn staging_path(root: &Path, item: &AcquirableItem) -> PathBuf {
    root.join(STAGING_DIR).join(format!(
        "{}-{}.part",
        sanitize_filename(&item.provider),
        hex::encode(item.id.as_bytes())
    ))
}

/// Streams `asset` into `path`, hashing as it goes.
///
/// The staging file is removed on every failure.
pub(super) async fn stage(asset: FetchedAsset, path: &Path) -> Result<StagedAsset, AcquireError> {
    let result = write_body(asset, path).await;
    if result.is_err() {
        remove_quietly(path);
    }
    result
}

async fn write_body(asset: FetchedAsset, path: &Path) -> Result<StagedAsset, AcquireError> {
    let FetchedAsset {
        suggested_filename,
        content_length,
        packaging,
        mut body,
    } = asset;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AcquireError::io(parent, e))?;
    }

    let file = File::create(path)
        .await
        .map_err(|e| AcquireError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let mut hasher = Sha256::new();
    let mut size: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| AcquireError::io(path, e))?;
        hasher.update(&chunk);
        size += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| AcquireError::io(path, e))?;
    writer
        .into_inner()
        .sync_all()
        .await
        .map_err(|e| AcquireError::io(path, e))?;

    if let Some(expected) = content_length
        && expected != size
    {
        return Err(AcquireError::Integrity {
            path: path.to_path_buf(),
            expected_bytes: expected,
            actual_bytes: size,
        });
    }
    if size == 0 {
        return Err(AcquireError::EmptyBody {
            path: path.to_path_buf(),
        });
    }

    Ok(StagedAsset {
        path: path.to_path_buf(),
        hash: hex::encode(hasher.finalize()),
        size,
        filename: suggested_filename,
        subject: None,
        packaging,
    })
}

/// Places each staged file under its directory (or recognises it as a
/// duplicate), then records every stored path in the ledger and flushes both
/// stores.
///
/// Blocking; run on the blocking pool. Locks are taken one at a time. When a
/// placement fails, the files not yet placed are removed from staging and
/// nothing is recorded.
pub(super) fn commit(
    ctx: &UnitContext,
    item: &AcquirableItem,
    members: &[(StagedAsset, PathBuf)],
) -> Result<Vec<CommitOutcome>, AcquireError> {
    let mut owned = lock(&ctx.state)
        .lookup(&item.provider, &item.id)
        .map(|entry| entry.paths.clone())
        .unwrap_or_default();

    let mut outcomes = Vec::with_capacity(members.len());
    for (index, (staged, dest_dir)) in members.iter().enumerate() {
        match place(ctx, staged, dest_dir, &owned) {
            Ok(outcome) => {
                // A path reused for one member is no longer free for the next.
                if let CommitOutcome::Written { path, .. } = &outcome {
                    owned.retain(|o| o != path);
                }
                outcomes.push(outcome);
            }
            Err(e) => {
                for (pending, _) in &members[index..] {
                    remove_quietly(&pending.path);
                }
                return Err(e);
            }
        }
    }

    let stored: Vec<PathBuf> = outcomes
        .iter()
        .map(|outcome| outcome.stored_path().to_path_buf())
        .collect();
    {
        let mut state = lock(&ctx.state);
        state.record_all(item, &stored)?;
        state.flush()?;
    }

    if let Err(e) = lock(&ctx.dedup).cache_mut().flush() {
        warn!(error = %e, "failed to flush hash cache");
    }

    Ok(outcomes)
}

fn place(
    ctx: &UnitContext,
    staged: &StagedAsset,
    dest_dir: &Path,
    owned: &[PathBuf],
) -> Result<CommitOutcome, AcquireError> {
    let mut dedup = lock(&ctx.dedup);

    let known = dedup.find_by_hash(&staged.hash).map(Path::to_path_buf);
    if let Some(existing) = known {
        drop(dedup);
        debug!(existing = %existing.display(), "identical file already present");
        remove_quietly(&staged.path);
        return Ok(CommitOutcome::Duplicate { existing });
    }

    std::fs::create_dir_all(dest_dir).map_err(|e| AcquireError::io(dest_dir, e))?;
    let target = resolve_unique_path(dest_dir, &staged.filename, owned);

    // The target may hold this item's previous revision.
    dedup.remove_from_index(&target);
    if let Claim::Existing(existing) = dedup.claim(&staged.hash, &target) {
        drop(dedup);
        remove_quietly(&staged.path);
        return Ok(CommitOutcome::Duplicate { existing });
    }

    if let Err(e) = std::fs::rename(&staged.path, &target) {
        dedup.release(&staged.hash, &target);
        return Err(AcquireError::io(&target, e));
    }
    dedup.cache_mut().record_known(&target, &staged.hash)?;

    Ok(CommitOutcome::Written {
        path: target,
        bytes: staged.size,
    })
}

pub(super) fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove staging file");
    }
}

/// Removes staging leftovers from an earlier, interrupted run.
pub(super) fn clear_staging(root: &Path) {
    let staging = root.join(STAGING_DIR);
    if !staging.exists() {
        return;
    }
    match std::fs::remove_dir_all(&staging) {
        Ok(()) => debug!(path = %staging.display(), "cleared stale staging directory"),
        Err(e) => warn!(path = %staging.display(), error = %e, "failed to clear staging directory"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::stream;
    use tempfile::TempDir;

    use super::*;
    use crate::dedup::hash_bytes;
    use crate::provider::ProviderError;

    fn asset_with_chunks(chunks: Vec<Result<Vec<u8>, ProviderError>>, length: Option<u64>) -> FetchedAsset {
        FetchedAsset {
            suggested_filename: "a.sto".to_string(),
            content_length: length,
            packaging: Packaging::Plain,
            body: stream::iter(chunks).boxed(),
        }
    }

    // ==================== Staging Tests ====================

    #[tokio::test]
    async fn test_stage_hashes_streamed_chunks() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".staging").join("gofast-1.part");
        let asset = asset_with_chunks(vec![Ok(b"ab".to_vec()), Ok(b"cd".to_vec())], Some(4));

        let staged = stage(asset, &path).await.unwrap();
        assert_eq!(staged.size, 4);
        assert_eq!(staged.hash, hash_bytes(b"abcd"));
        assert_eq!(std::fs::read(&path).unwrap(), b"abcd");
        assert_eq!(staged.subject, None);
    }

    #[tokio::test]
    async fn test_stage_carries_packaging() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("x.part");
        let asset = asset_with_chunks(vec![Ok(b"PK".to_vec())], None).zipped();

        let staged = stage(asset, &path).await.unwrap();
        assert_eq!(staged.packaging, Packaging::Zip);
    }

    #[tokio::test]
    async fn test_stage_length_mismatch_removes_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("x.part");
        let asset = asset_with_chunks(vec![Ok(b"ab".to_vec())], Some(10));

        let err = stage(asset, &path).await.unwrap_err();
        assert!(matches!(err, AcquireError::Integrity { expected_bytes: 10, actual_bytes: 2, .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_stage_stream_error_removes_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("x.part");
        let asset = asset_with_chunks(
            vec![Ok(b"ab".to_vec()), Err(ProviderError::transient("reset"))],
            None,
        );

        let err = stage(asset, &path).await.unwrap_err();
        assert!(matches!(err, AcquireError::Provider(_)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_stage_rejects_empty_body() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("x.part");
        let err = stage(asset_with_chunks(vec![], None), &path).await.unwrap_err();
        assert!(matches!(err, AcquireError::EmptyBody { .. }));
    }

    fn item_with_id(id: &str) -> AcquirableItem {
        AcquirableItem {
            provider: "gofast".to_string(),
            id: id.to_string(),
            subject: "car".to_string(),
            location: "spa".to_string(),
            category_hint: None,
            revision: String::new(),
            series: None,
            season: None,
            handle: crate::provider::FetchHandle::new("h"),
        }
    }

    #[test]
    fn test_staging_path_is_per_item() {
        assert_eq!(
            staging_path(Path::new("/root"), &item_with_id("42/x")),
            PathBuf::from("/root/.staging/gofast-34322f78.part")
        );
    }

    #[test]
    fn test_staging_path_keeps_ids_apart_that_sanitise_alike() {
        let root = Path::new("/root");
        let slash = staging_path(root, &item_with_id("a/b"));
        let underscore = staging_path(root, &item_with_id("a_b"));
        assert_ne!(slash, underscore);
        assert_eq!(slash.parent(), underscore.parent());
    }
}
