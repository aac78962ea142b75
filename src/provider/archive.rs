//! Naming rules for setups delivered inside ZIP archives.
//!
//! Providers ship setup bundles as archives whose members are either nested
//! under a car folder (`ferrari296gt3/GO 26S1 Spa Race.sto`) or flat with the
//! car encoded in the name (`porsche 992 @ spa Race.sto`). These helpers
//! recover the car folder and build the stored filename; the engine does the
//! actual extraction.

use std::sync::LazyLock;

use regex::Regex;

use super::{AcquirableItem, MemberPlacement};
use crate::naming::{SETUP_EXTENSION, setup_type_from_filename};

static CAR_FOLDER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[a-z0-9]+$").ok());

/// Normalises an archive entry name to `/` separators.
#[must_use]
pub fn normalize_member_path(raw: &str) -> String {
    raw.replace('\\', "/")
}

/// True for entries that could escape the extraction root.
#[must_use]
pub fn is_unsafe_member_path(member: &str) -> bool {
    member.starts_with('/')
        || member.split('/').any(|segment| segment == "..")
        || member.contains(':')
}

/// Splits a member path into its top-level folder (when nested) and file name.
#[must_use]
pub fn split_member(member: &str) -> (Option<&str>, &str) {
    let file_name = member.rsplit('/').next().unwrap_or(member);
    let folder = member
        .split_once('/')
        .map(|(first, _)| first)
        .filter(|first| !first.is_empty());
    (folder, file_name)
}

/// How the car is read from a flat `"<car> @ <track> <type>.sto"` name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlatCarRule {
    /// First word before `" @ "` (`"mx5 mx52016 @ ..."` → `mx5`).
    FirstWord,
    /// Everything before `" @ "` with spaces removed (`"porsche 992 @ ..."` → `porsche992`).
    Joined,
}

/// Car folder encoded in a flat member name.
///
/// The result is lowercased with hyphens dropped; names that do not reduce
/// to ASCII letters and digits are rejected.
#[must_use]
pub fn car_folder_from_flat_name(file_name: &str, rule: FlatCarRule) -> Option<String> {
    let stem = file_name
        .rsplit_once('.')
        .map_or(file_name, |(stem, _)| stem)
        .to_lowercase();
    let (car_part, _) = stem.split_once(" @ ")?;
    let folder = match rule {
        FlatCarRule::FirstWord => car_part.split_whitespace().next()?.to_string(),
        FlatCarRule::Joined => car_part.split_whitespace().collect(),
    }
    .replace('-', "");
    CAR_FOLDER
        .as_ref()
        .is_some_and(|re| re.is_match(&folder))
        .then_some(folder)
}

/// Builds `<creator>_<series>_<season>_<track>_<type>.sto`.
///
/// Empty components are dropped, spaces become underscores and runs of
/// underscores collapse.
#[must_use]
pub fn build_creator_filename(creator: &str, components: &[&str]) -> String {
    let joined = std::iter::once(creator)
        .chain(components.iter().copied())
        .flat_map(|component| component.split([' ', '_']))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");

    if joined.is_empty() {
        format!("setup.{SETUP_EXTENSION}")
    } else {
        format!("{joined}.{SETUP_EXTENSION}")
    }
}

/// Stored filename for one member under `creator`'s scheme: the item's
/// series, season and track plus the member's setup type.
#[must_use]
pub fn creator_filename(creator: &str, item: &AcquirableItem, member_file_name: &str) -> String {
    let setup_type = setup_type_from_filename(member_file_name).unwrap_or_default();
    build_creator_filename(
        creator,
        &[
            item.series.as_deref().unwrap_or_default(),
            item.season.as_deref().unwrap_or_default(),
            &item.location,
            &setup_type,
        ],
    )
}

/// Placement used when a provider has no naming scheme of its own: the
/// archive folder (or the item's subject) and the member's own file name.
#[must_use]
pub fn default_placement(item: &AcquirableItem, member: &str) -> MemberPlacement {
    let (folder, file_name) = split_member(member);
    MemberPlacement {
        subject: folder.map_or_else(|| item.subject.clone(), str::to_string),
        filename: file_name.to_string(),
    }
}

/// Builds an in-memory ZIP from `(name, body)` pairs.
#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;

    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, body) in entries {
        let options = zip::write::SimpleFileOptions::default();
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
            continue;
        }
        writer.start_file(*name, options).unwrap();
        writer.write_all(body).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
