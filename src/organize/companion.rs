//! Companion files: telemetry, lap and replay files sharing a setup's stem.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// Extensions that travel with a setup file.
pub const COMPANION_EXTENSIONS: &[&str] = &["ld", "ldx", "olap", "blap", "rpy"];

/// Existing companions of `primary`, in extension order.
#[must_use]
pub fn find_companions(primary: &Path) -> Vec<PathBuf> {
    let (Some(parent), Some(stem)) = (primary.parent(), primary.file_stem()) else {
        return Vec::new();
    };
    let stem = stem.to_string_lossy();
    COMPANION_EXTENSIONS
        .iter()
        .map(|ext| parent.join(format!("{stem}.{ext}")))
        .filter(|path| path.is_file())
        .collect()
}

/// Moves or copies `from` to `to`.
///
/// A move falls back to copy-then-delete when a rename is not possible
/// (different file systems).
pub(super) fn transfer(from: &Path, to: &Path, copy: bool) -> io::Result<()> {
    if copy {
        std::fs::copy(from, to)?;
        return Ok(());
    }
    if let Err(rename_err) = std::fs::rename(from, to) {
        debug!(error = %rename_err, "rename failed, copying instead");
        std::fs::copy(from, to)?;
        std::fs::remove_file(from)?;
    }
    Ok(())
}

/// Relocates companions next to `dest_dir`, returning how many made it.
///
/// A companion whose name is already taken at the destination is left behind.
pub(super) fn relocate(companions: &[PathBuf], dest_dir: &Path, copy: bool) -> usize {
    let mut relocated = 0;
    for companion in companions {
        let Some(name) = companion.file_name() else {
            continue;
        };
        let target = dest_dir.join(name);
        if target.exists() {
            warn!(
                companion = %companion.display(),
                "skipping companion file: already exists at destination"
            );
            continue;
        }
        match transfer(companion, &target, copy) {
            Ok(()) => {
                info!(from = %companion.display(), to = %target.display(), copy, "companion relocated");
                relocated += 1;
            }
            Err(e) => warn!(companion = %companion.display(), error = %e, "failed to relocate companion"),
        }
    }
    relocated
}

/// Deletes companions, returning the bytes freed.
pub(super) fn delete(companions: &[PathBuf]) -> u64 {
    let mut freed = 0;
    for companion in companions {
        let size = std::fs::metadata(companion).map(|m| m.len()).unwrap_or(0);
        match std::fs::remove_file(companion) {
            Ok(()) => {
                info!(path = %companion.display(), "deleted duplicate companion");
                freed += size;
            }
            Err(e) => warn!(path = %companion.display(), error = %e, "failed to delete companion"),
        }
    }
    freed
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_find_companions_matches_stem_only() {
        let temp = TempDir::new().unwrap();
        let primary = temp.path().join("race.sto");
        std::fs::write(&primary, b"s").unwrap();
        std::fs::write(temp.path().join("race.ld"), b"l").unwrap();
        std::fs::write(temp.path().join("race.rpy"), b"r").unwrap();
        std::fs::write(temp.path().join("qual.ld"), b"q").unwrap();
        std::fs::write(temp.path().join("race.txt"), b"t").unwrap();

        let found = find_companions(&primary);
        assert_eq!(
            found,
            vec![temp.path().join("race.ld"), temp.path().join("race.rpy")]
        );
    }

    #[test]
    fn test_relocate_skips_taken_names() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::create_dir_all(&dst).unwrap();
        std::fs::write(src.join("a.ld"), b"new").unwrap();
        std::fs::write(src.join("a.olap"), b"lap").unwrap();
        std::fs::write(dst.join("a.ld"), b"old").unwrap();

        let moved = relocate(&[src.join("a.ld"), src.join("a.olap")], &dst, false);
        assert_eq!(moved, 1);
        assert_eq!(std::fs::read(dst.join("a.ld")).unwrap(), b"old");
        assert!(src.join("a.ld").exists());
        assert!(dst.join("a.olap").exists());
        assert!(!src.join("a.olap").exists());
    }

    #[test]
    fn test_copy_keeps_source() {
        let temp = TempDir::new().unwrap();
        let from = temp.path().join("a.blap");
        let to = temp.path().join("b.blap");
        std::fs::write(&from, b"x").unwrap();
        transfer(&from, &to, true).unwrap();
        assert!(from.exists());
        assert!(to.exists());
    }

    #[test]
    fn test_delete_reports_bytes() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.ld");
        std::fs::write(&a, b"12345").unwrap();
        assert_eq!(delete(&[a.clone(), temp.path().join("missing.ld")]), 5);
        assert!(!a.exists());
    }
}
