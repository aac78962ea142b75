//! Subject and location extraction for files already on disk.

use std::path::Path;

use tracing::{debug, warn};

use crate::naming::{location_candidate_tokens, parse_setup_filename};
use crate::resolver::Resolver;

/// Minimum confidence for a bare filename token to count as a location.
const TOKEN_CONFIDENCE: f64 = 0.7;

/// Minimum confidence for a folder name to count as a location.
const FOLDER_CONFIDENCE: f64 = 0.6;

/// Folder names that are usually containers rather than car folders.
const SUSPICIOUS_FOLDERS: &[&str] = &[
    "setups",
    "setup",
    "downloads",
    "download",
    "backup",
    "backups",
    "old",
    "new",
    "temp",
    "tmp",
];

/// Where the location text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationSource {
    /// A known filename convention.
    Convention,
    /// A filename token that resolved on its own.
    FilenameToken,
    /// A folder between the subject folder and the file.
    Folder,
}

/// Location text plus any category the filename carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ExtractedLocation {
    pub(super) text: String,
    pub(super) source: LocationSource,
    pub(super) category: Option<String>,
}

/// First directory under the source root, if the file is not at the root.
pub(super) fn subject_folder(relative: &Path) -> Option<String> {
    let mut components = relative.components();
    let first = components.next()?.as_os_str().to_str()?.to_string();
    // A lone component is the file itself.
    components.next()?;

    if SUSPICIOUS_FOLDERS.contains(&first.to_ascii_lowercase().as_str()) {
        warn!(
            folder = %first,
            file = %relative.display(),
            "folder looks like a container, not a car folder; try organizing its parent"
        );
    }
    Some(first)
}

/// Extracts a location name from the filename, then from the folders.
pub(super) fn extract_location(resolver: &Resolver, relative: &Path) -> Option<ExtractedLocation> {
    let file_name = relative.file_name()?.to_str()?;

    if let Some(parsed) = parse_setup_filename(file_name) {
        debug!(convention = ?parsed.convention, location = %parsed.location, "filename convention matched");
        return Some(ExtractedLocation {
            text: parsed.location,
            source: LocationSource::Convention,
            category: parsed.category,
        });
    }

    for token in location_candidate_tokens(file_name) {
        let resolution = resolver.resolve(&token, None);
        if resolution
            .as_resolved()
            .is_some_and(|r| r.confidence >= TOKEN_CONFIDENCE)
        {
            return Some(ExtractedLocation {
                text: token,
                source: LocationSource::FilenameToken,
                category: None,
            });
        }
    }

    location_from_folders(resolver, relative)
}

/// Tries the folders between the subject folder and the file.
///
/// Falls back to the first such folder verbatim; it may still resolve once
/// the category hint is applied.
fn location_from_folders(resolver: &Resolver, relative: &Path) -> Option<ExtractedLocation> {
    let parts: Vec<&str> = relative
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    if parts.len() <= 2 {
        return None;
    }
    let middle = &parts[1..parts.len() - 1];

    let matched = middle.iter().map(|part| part.replace(['-', '_'], " ")).find(|cleaned| {
        resolver
            .resolve(cleaned, None)
            .as_resolved()
            .is_some_and(|r| r.confidence >= FOLDER_CONFIDENCE)
    });

    let text = matched.or_else(|| middle.first().map(|part| (*part).to_string()))?;
    Some(ExtractedLocation {
        text,
        source: LocationSource::Folder,
        category: None,
    })
}
