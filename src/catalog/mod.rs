//! Reference catalog of canonical locations and their layouts.
//!
//! The catalog is loaded once at startup and is read-only afterwards. It is
//! the data the [`crate::resolver`] matches free-text location names against.
//!
//! # Document shapes
//!
//! - `{"entries": [...]}` or a bare array of entries, each with `name`,
//!   `aliases`, `category` and `subConfigs` (`name`, `path`, `retired`,
//!   optional `category`)
//! - a flat track-list export (`{"data": [...]}` or a bare array of rows
//!   carrying `track_name`, `track_dirpath`, `config_name`, ...), grouped
//!   into entries by base location name
//!
//! # Example
//!
//! ```
//! use setup_downloader_core::catalog::CatalogIndex;
//!
//! let catalog = CatalogIndex::from_json_str(
//!     r#"[{"name": "Spa-Francorchamps", "category": "road",
//!          "subConfigs": [{"name": "gp", "path": "spa/gp"}]}]"#,
//!     "inline",
//! )?;
//! assert_eq!(catalog.len(), 1);
//! # Ok::<(), setup_downloader_core::catalog::CatalogError>(())
//! ```

mod entry;
mod error;
mod legacy;

pub use entry::{CatalogEntry, SubConfig, TrackCategory};
pub use error::CatalogError;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use legacy::LegacyRow;

/// Catalog compiled into the binary, used when no override path is configured.
const BUNDLED_CATALOG: &str = include_str!("../../data/catalog.json");

static BRACKET_PREFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*\[[^\]]*\]\s*").ok());

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogDocument {
    Wrapped { entries: Vec<RawEntry> },
    Legacy { data: Vec<LegacyRow> },
    Entries(Vec<RawEntry>),
    LegacyRows(Vec<LegacyRow>),
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    name: String,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default = "default_entry_category")]
    category: TrackCategory,
    #[serde(rename = "subConfigs", alias = "sub_configs")]
    sub_configs: Vec<RawSubConfig>,
}

#[derive(Debug, Deserialize)]
struct RawSubConfig {
    name: String,
    #[serde(alias = "relativePath", alias = "relative_path")]
    path: String,
    #[serde(default)]
    retired: bool,
    #[serde(default)]
    category: Option<TrackCategory>,
}

fn default_entry_category() -> TrackCategory {
    TrackCategory::Mixed
}

/// Strips a bracketed prefix (e.g. `[Retired]`) and any `" - <layout>"` suffix.
///
/// `"[Retired] Spa-Francorchamps - Grand Prix"` becomes `"Spa-Francorchamps"`.
#[must_use]
pub fn base_location_name(name: &str) -> String {
    let without_prefix = match BRACKET_PREFIX.as_ref() {
        Some(re) => re.replace(name, "").into_owned(),
        None => name.to_string(),
    };
    without_prefix
        .split(" - ")
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Immutable, validated set of catalog entries.
#[derive(Debug, Clone)]
pub struct CatalogIndex {
    entries: Vec<CatalogEntry>,
    /// Normalised relative path → (entry index, sub-config index).
    by_path: BTreeMap<String, (usize, usize)>,
}

impl CatalogIndex {
    /// Builds an index from already-constructed entries.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] when an entry has no name, no layouts, an
    /// unsafe path, or a path already used by another layout.
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Result<Self, CatalogError> {
        Self::validate(entries, "entries")
    }

    /// Parses and validates a catalog document.
    ///
    /// # Errors
    ///
    /// [`CatalogError::Parse`] when the document matches no known shape, plus
    /// every validation error of [`Self::from_entries`].
    pub fn from_json_str(raw: &str, origin: &str) -> Result<Self, CatalogError> {
        let document: CatalogDocument =
            serde_json::from_str(raw).map_err(|e| CatalogError::parse(origin, e))?;

        let entries = match document {
            CatalogDocument::Wrapped { entries } | CatalogDocument::Entries(entries) => {
                entries.into_iter().map(RawEntry::into_entry).collect()
            }
            CatalogDocument::Legacy { data } | CatalogDocument::LegacyRows(data) => {
                debug!(rows = data.len(), "grouping flat track rows");
                legacy::group_rows(data)
            }
        };

        Self::validate(entries, origin)
    }

    /// Loads a catalog from a file.
    ///
    /// # Errors
    ///
    /// [`CatalogError::Io`] if the file cannot be read, otherwise as
    /// [`Self::from_json_str`].
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|e| CatalogError::io(path, e))?;
        let catalog = Self::from_json_str(&raw, &path.display().to_string())?;
        info!(entries = catalog.len(), "loaded catalog");
        Ok(catalog)
    }

    /// Returns the catalog compiled into the crate.
    ///
    /// # Errors
    ///
    /// Only fails if the bundled document itself is invalid.
    pub fn bundled() -> Result<Self, CatalogError> {
        Self::from_json_str(BUNDLED_CATALOG, "bundled")
    }

    /// Loads `override_path` when given, otherwise the bundled catalog.
    ///
    /// # Errors
    ///
    /// As [`Self::load`] / [`Self::bundled`].
    pub fn load_or_bundled(override_path: Option<&Path>) -> Result<Self, CatalogError> {
        match override_path {
            Some(path) => Self::load(path),
            None => Self::bundled(),
        }
    }

    fn validate(entries: Vec<CatalogEntry>, origin: &str) -> Result<Self, CatalogError> {
        if entries.is_empty() {
            return Err(CatalogError::Empty {
                origin: origin.to_string(),
            });
        }

        let mut normalized_entries = Vec::with_capacity(entries.len());
        let mut by_path: BTreeMap<String, (usize, usize)> = BTreeMap::new();

        for (entry_index, mut entry) in entries.into_iter().enumerate() {
            entry.name = entry.name.trim().to_string();
            if entry.name.is_empty() {
                return Err(CatalogError::EmptyName { index: entry_index });
            }
            if entry.sub_configs.is_empty() {
                return Err(CatalogError::NoSubConfigs { entry: entry.name });
            }

            for (sub_index, sub) in entry.sub_configs.iter_mut().enumerate() {
                let normalized = normalize_relative_path(&sub.relative_path).ok_or_else(|| {
                    CatalogError::InvalidPath {
                        entry: entry.name.clone(),
                        path: sub.relative_path.clone(),
                    }
                })?;

                let key = normalized.to_ascii_lowercase();
                if let Some(&(first_index, _)) = by_path.get(&key) {
                    let first = normalized_entries
                        .get(first_index)
                        .map_or_else(|| entry.name.clone(), |e: &CatalogEntry| e.name.clone());
                    return Err(CatalogError::DuplicatePath {
                        path: normalized,
                        first,
                        second: entry.name.clone(),
                    });
                }
                by_path.insert(key, (entry_index, sub_index));
                sub.relative_path = normalized;
            }

            normalized_entries.push(entry);
        }

        Ok(Self {
            entries: normalized_entries,
            by_path,
        })
    }

    /// All entries in declaration order.
    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the catalog has no entries (never true once validated).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of layouts across all entries.
    #[must_use]
    pub fn sub_config_count(&self) -> usize {
        self.by_path.len()
    }

    /// Finds an entry by canonical name, ignoring ASCII case.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&CatalogEntry> {
        let name = name.trim();
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
    }

    /// Looks up the layout owning a relative path (`/` or `\` separated).
    #[must_use]
    pub fn sub_config_by_path(&self, path: &str) -> Option<(&CatalogEntry, &SubConfig)> {
        let key = normalize_relative_path(path)?.to_ascii_lowercase();
        let &(entry_index, sub_index) = self.by_path.get(&key)?;
        let entry = self.entries.get(entry_index)?;
        Some((entry, entry.sub_configs.get(sub_index)?))
    }
}

impl RawEntry {
    fn into_entry(self) -> CatalogEntry {
        CatalogEntry {
            name: self.name,
            aliases: self
                .aliases
                .into_iter()
                .map(|alias| alias.trim().to_string())
                .filter(|alias| !alias.is_empty())
                .collect(),
            category: self.category,
            sub_configs: self
                .sub_configs
                .into_iter()
                .map(|sub| SubConfig {
                    name: sub.name,
                    relative_path: sub.path,
                    retired: sub.retired,
                    category: sub.category,
                })
                .collect(),
        }
    }
}

/// Normalises a layout path to `/` separators.
///
/// Returns `None` for empty, absolute, drive-prefixed, or `.`/`..` paths.
fn normalize_relative_path(raw: &str) -> Option<String> {
    let unified = raw.trim().replace('\\', "/");
    if unified.starts_with('/') || unified.contains(':') {
        return None;
    }

    let segments: Vec<&str> = unified.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() || segments.iter().any(|s| *s == "." || *s == "..") {
        return None;
    }
    Some(segments.join("/"))
}
