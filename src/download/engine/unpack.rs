//! Splitting a staged ZIP bundle into one staged file per setup.
//!
//! Only `.sto` members are kept. Entries that could land outside the
//! extraction root (`..` segments, absolute paths) are skipped with a
//! warning. The provider decides each member's car folder and stored name.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use zip::ZipArchive;

use super::commit::{StagedAsset, remove_quietly};
use crate::download::error::AcquireError;
use crate::naming::is_setup_file;
use crate::provider::archive::{is_unsafe_member_path, normalize_member_path};
use crate::provider::{AcquirableItem, Packaging, Provider};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Extracts every usable setup from `archive`, which is removed afterwards.
///
/// Blocking; run on the blocking pool. On failure no staged member is left
/// behind.
///
/// # Errors
///
/// [`AcquireError::Archive`] when the bundle is not a readable ZIP,
/// [`AcquireError::EmptyArchive`] when nothing in it is a setup.
pub(super) fn unpack(
    archive: &StagedAsset,
    item: &AcquirableItem,
    provider: &dyn Provider,
) -> Result<Vec<StagedAsset>, AcquireError> {
    let mut members = Vec::new();
    let result = extract_members(archive, item, provider, &mut members);
    remove_quietly(&archive.path);

    match result {
        Ok(()) if members.is_empty() => Err(AcquireError::EmptyArchive {
            path: archive.path.clone(),
        }),
        Ok(()) => {
            debug!(members = members.len(), "unpacked bundle");
            Ok(members)
        }
        Err(e) => {
            for member in &members {
                remove_quietly(&member.path);
            }
            Err(e)
        }
    }
}

fn extract_members(
    archive: &StagedAsset,
    item: &AcquirableItem,
    provider: &dyn Provider,
    members: &mut Vec<StagedAsset>,
) -> Result<(), AcquireError> {
    let invalid = |e: zip::result::ZipError| AcquireError::Archive {
        path: archive.path.clone(),
        message: e.to_string(),
    };

    let file = File::open(&archive.path).map_err(|e| AcquireError::io(&archive.path, e))?;
    let mut zip = ZipArchive::new(BufReader::new(file)).map_err(invalid)?;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(invalid)?;
        if entry.is_dir() {
            continue;
        }

        let name = normalize_member_path(entry.name());
        if is_unsafe_member_path(&name) || entry.enclosed_name().is_none() {
            warn!(member = %name, "skipping archive entry outside the extraction root");
            continue;
        }
        if !is_setup_file(Path::new(&name)) {
            debug!(member = %name, "skipping non-setup archive entry");
            continue;
        }
        let Some(placement) = provider.place_member(item, &name) else {
            debug!(member = %name, "provider could not place archive entry");
            continue;
        };

        let path = member_staging_path(&archive.path, index);
        let (hash, size) = match stage_member(&mut entry, &path, &archive.path) {
            Ok(staged) => staged,
            Err(e) => {
                remove_quietly(&path);
                return Err(e);
            }
        };
        if size == 0 {
            debug!(member = %name, "skipping empty archive entry");
            remove_quietly(&path);
            continue;
        }

        members.push(StagedAsset {
            path,
            hash,
            size,
            filename: placement.filename,
            subject: Some(placement.subject),
            packaging: Packaging::Plain,
        });
    }
    Ok(())
}

/// `<root>/.staging/gofast-3132.part` → `<root>/.staging/gofast-3132-<index>.part`.
fn member_staging_path(archive_path: &Path, index: usize) -> PathBuf {
    let stem = archive_path
        .file_stem()
        .map_or_else(|| "bundle".into(), |s| s.to_string_lossy());
    archive_path.with_file_name(format!("{stem}-{index}.part"))
}

/// Copies one member to `path`, returning its SHA-256 and size.
fn stage_member(
    reader: &mut impl Read,
    path: &Path,
    archive_path: &Path,
) -> Result<(String, u64), AcquireError> {
    let mut file = File::create(path).map_err(|e| AcquireError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut size: u64 = 0;

    loop {
        let read = reader.read(&mut buffer).map_err(|e| AcquireError::Archive {
            path: archive_path.to_path_buf(),
            message: e.to_string(),
        })?;
        if read == 0 {
            break;
        }
        file.write_all(&buffer[..read])
            .map_err(|e| AcquireError::io(path, e))?;
        hasher.update(&buffer[..read]);
        size += read as u64;
    }

    file.sync_all().map_err(|e| AcquireError::io(path, e))?;
    Ok((hex::encode(hasher.finalize()), size))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::dedup::hash_bytes;
    use crate::provider::archive::zip_bytes;
    use crate::provider::{FetchHandle, FetchedAsset, MemberPlacement, ProviderError};

    struct FolderProvider;

    #[async_trait]
    impl Provider for FolderProvider {
        fn name(&self) -> &str {
            "test"
        }

        async fn list(&self) -> Result<Vec<AcquirableItem>, ProviderError> {
            Ok(Vec::new())
        }

        async fn fetch(&self, _item: &AcquirableItem) -> Result<FetchedAsset, ProviderError> {
            Err(ProviderError::transient("not used"))
        }

        fn place_member(&self, item: &AcquirableItem, member: &str) -> Option<MemberPlacement> {
            // Members named "skip*" have no placement.
            let placement = crate::provider::archive::default_placement(item, member);
            (!placement.filename.starts_with("skip")).then_some(placement)
        }
    }

    fn item() -> AcquirableItem {
        AcquirableItem {
            provider: "test".to_string(),
            id: "7".to_string(),
            subject: "Ferrari 296 GT3".to_string(),
            location: "Spa".to_string(),
            category_hint: None,
            revision: String::new(),
            series: None,
            season: None,
            handle: FetchHandle::new("h"),
        }
    }

    fn staged_zip(dir: &Path, entries: &[(&str, &[u8])]) -> StagedAsset {
        let bytes = zip_bytes(entries);
        staged_file(dir, &bytes)
    }

    fn staged_file(dir: &Path, bytes: &[u8]) -> StagedAsset {
        let path = dir.join("test-37.part");
        std::fs::write(&path, bytes).unwrap();
        StagedAsset {
            path,
            hash: hash_bytes(bytes),
            size: bytes.len() as u64,
            filename: "bundle.zip".to_string(),
            subject: None,
            packaging: Packaging::Zip,
        }
    }

    // ==================== Member Selection Tests ====================

    #[test]
    fn test_unpack_keeps_only_safe_setup_members() {
        let temp = TempDir::new().unwrap();
        let archive = staged_zip(
            temp.path(),
            &[
                ("ferrari296gt3/", b""),
                ("ferrari296gt3/race.sto", b"race body"),
                ("ferrari296gt3/QUALI.STO", b"quali body"),
                ("ferrari296gt3/notes.txt", b"read me"),
                ("../evil.sto", b"escape"),
                ("ferrari296gt3/skip.sto", b"unplaced"),
                ("loose.sto", b"loose body"),
            ],
        );

        let members = unpack(&archive, &item(), &FolderProvider).unwrap();
        let placed: Vec<_> = members
            .iter()
            .map(|m| (m.subject.clone().unwrap(), m.filename.clone()))
            .collect();
        assert_eq!(
            placed,
            vec![
                ("ferrari296gt3".to_string(), "race.sto".to_string()),
                ("ferrari296gt3".to_string(), "QUALI.STO".to_string()),
                ("Ferrari 296 GT3".to_string(), "loose.sto".to_string()),
            ]
        );
        assert_eq!(members[0].hash, hash_bytes(b"race body"));
        assert_eq!(members[0].size, 9);
        assert_eq!(std::fs::read(&members[1].path).unwrap(), b"quali body");
        assert!(!archive.path.exists());
    }

    #[test]
    fn test_member_staging_paths_are_distinct() {
        let temp = TempDir::new().unwrap();
        let archive = staged_zip(temp.path(), &[("a/1.sto", b"one"), ("a/2.sto", b"two")]);

        let members = unpack(&archive, &item(), &FolderProvider).unwrap();
        assert_eq!(members[0].path, temp.path().join("test-37-0.part"));
        assert_eq!(members[1].path, temp.path().join("test-37-1.part"));
    }

    // ==================== Failure Tests ====================

    #[test]
    fn test_unpack_without_setups_is_empty_archive() {
        let temp = TempDir::new().unwrap();
        let archive = staged_zip(temp.path(), &[("car/readme.txt", b"x"), ("car/empty.sto", b"")]);

        let err = unpack(&archive, &item(), &FolderProvider).unwrap_err();
        assert!(matches!(err, AcquireError::EmptyArchive { .. }));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unpack_rejects_non_zip_body() {
        let temp = TempDir::new().unwrap();
        let archive = staged_file(temp.path(), b"<html>session expired</html>");

        let err = unpack(&archive, &item(), &FolderProvider).unwrap_err();
        assert!(matches!(err, AcquireError::Archive { .. }));
        assert!(!archive.path.exists());
    }
}
