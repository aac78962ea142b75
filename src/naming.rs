//! Setup filename conventions.
//!
//! Parsers return a [`ParsedName`] or `None`; a filename that matches no
//! convention is a normal outcome the organizer reports as a skip reason.
//! The same module builds the filenames the download path writes, so both
//! directions of a convention live side by side.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::resolver::split_camel_case;

/// Extension of primary setup files.
pub const SETUP_EXTENSION: &str = "sto";

/// Tokens that name a setup's purpose rather than its location.
pub const SETUP_TYPES: &[&str] = &[
    "race",
    "qualifying",
    "qual",
    "q",
    "practice",
    "wet",
    "swet",
    "er",
    "sr",
    "sq",
    "eq",
];

/// Filename tokens that never name a location.
const NOISE_TOKENS: &[&str] = &["go", "fast", "gofast", "ir", "sto"];

static GOFAST_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    RegexBuilder::new(
        r"^GoFast_(?P<series>.+?)_(?P<season>\d+S\d+W?\d*)_(?P<track>[^_]+)_(?P<type>[^_]+)\.sto$",
    )
    .case_insensitive(true)
    .build()
    .ok()
});

static GENERIC_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    RegexBuilder::new(r"^.*?_(?P<track>[A-Za-z][A-Za-z0-9\-]+)_(?P<type>[^_]+)\.sto$")
        .case_insensitive(true)
        .build()
        .ok()
});

static SEASON_TOKEN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    RegexBuilder::new(r"^\d+S\d+")
        .case_insensitive(true)
        .build()
        .ok()
});

/// A filename convention with a structured parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    /// `GoFast_<series>_<season>_<track>_<type>.sto`
    GoFast,
    /// `<anything>_<track>_<type>.sto`, where `<type>` is a known setup type
    /// or at most three characters.
    Generic,
}

impl Convention {
    /// Conventions in the order they are tried.
    pub const ALL: [Self; 2] = [Self::GoFast, Self::Generic];

    /// Parses `file_name` under this convention.
    #[must_use]
    pub fn parse(self, file_name: &str) -> Option<ParsedName> {
        match self {
            Self::GoFast => {
                let caps = GOFAST_PATTERN.as_ref()?.captures(file_name)?;
                Some(ParsedName {
                    convention: self,
                    location: add_spaces_to_track_name(&caps["track"]),
                    category: Some(caps["series"].to_string()),
                    revision: Some(caps["season"].to_string()),
                    setup_type: caps["type"].to_string(),
                })
            }
            Self::Generic => {
                let caps = GENERIC_PATTERN.as_ref()?.captures(file_name)?;
                let setup_type = caps["type"].to_string();
                let lowered = setup_type.to_ascii_lowercase();
                if !(SETUP_TYPES.contains(&lowered.as_str()) || setup_type.chars().count() <= 3) {
                    return None;
                }
                Some(ParsedName {
                    convention: self,
                    location: add_spaces_to_track_name(&caps["track"]),
                    category: None,
                    revision: None,
                    setup_type,
                })
            }
        }
    }
}

/// Structured fields recovered from a filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    /// Convention that matched.
    pub convention: Convention,
    /// Location text (spacing restored).
    pub location: String,
    /// Category or series text, usable as a category hint.
    pub category: Option<String>,
    /// Season or revision token.
    pub revision: Option<String>,
    /// Setup type (`Race`, `Qualifying`, `eR`, ...).
    pub setup_type: String,
}

/// Tries every [`Convention`] in order.
#[must_use]
pub fn parse_setup_filename(file_name: &str) -> Option<ParsedName> {
    Convention::ALL
        .into_iter()
        .find_map(|convention| convention.parse(file_name))
}

/// Filename tokens worth resolving as a location when no convention matched.
///
/// Drops short tokens, noise words, season tokens, and setup types.
#[must_use]
pub fn location_candidate_tokens(file_name: &str) -> Vec<String> {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);

    stem.replace('-', "_")
        .split(['_', ' '])
        .filter(|part| part.chars().count() >= 3)
        .filter(|part| {
            let lowered = part.to_ascii_lowercase();
            !NOISE_TOKENS.contains(&lowered.as_str()) && !SETUP_TYPES.contains(&lowered.as_str())
        })
        .filter(|part| !SEASON_TOKEN.as_ref().is_some_and(|re| re.is_match(part)))
        .map(str::to_string)
        .collect()
}

/// Readable name from a URL slug: `"road-america_full"` → `"Road America Full"`.
#[must_use]
pub fn slug_to_title(slug: &str) -> String {
    slug.split(['-', '_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Restores spacing in a squashed track name (`SpaFrancorchamps` →
/// `Spa Francorchamps`). Names already containing spaces are returned as is.
#[must_use]
pub fn add_spaces_to_track_name(track: &str) -> String {
    if track.contains(' ') {
        track.to_string()
    } else {
        split_camel_case(track)
    }
}

/// Last word of a filename stem, used as the setup type.
///
/// `"GO 26S1 NextGen Daytona500 Qualifying.sto"` → `"Qualifying"`.
#[must_use]
pub fn setup_type_from_filename(file_name: &str) -> Option<String> {
    let stem = Path::new(file_name).file_stem()?.to_str()?;
    stem.replace('_', " ")
        .split_whitespace()
        .last()
        .map(str::to_string)
}

/// Builds `GoFast_<series>_<season>_<track>_<type>.sto`, omitting empty
/// components. Spaces are removed from the track.
#[must_use]
pub fn build_gofast_filename(series: &str, season: &str, track: &str, setup_type: &str) -> String {
    let track = track.replace(' ', "");
    let joined = ["GoFast", series.trim(), season.trim(), track.as_str(), setup_type.trim()]
        .iter()
        .flat_map(|component| component.split('_'))
        .filter(|component| !component.is_empty())
        .collect::<Vec<_>>()
        .join("_");

    if joined.is_empty() {
        format!("setup.{SETUP_EXTENSION}")
    } else {
        format!("{joined}.{SETUP_EXTENSION}")
    }
}

/// Returns true for `.sto` paths (case-insensitive).
#[must_use]
pub fn is_setup_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(SETUP_EXTENSION))
}
