//! Flat track-list rows (one row per layout) grouped into catalog entries.

use serde::Deserialize;
use tracing::warn;

use super::base_location_name;
use super::entry::{CatalogEntry, SubConfig, TrackCategory};

/// One row of a flat track-list export.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LegacyRow {
    pub(crate) track_name: String,
    pub(crate) track_dirpath: String,
    #[serde(default)]
    pub(crate) config_name: String,
    #[serde(default)]
    pub(crate) category: String,
    #[serde(default)]
    pub(crate) retired: bool,
    #[serde(default)]
    pub(crate) is_oval: bool,
    #[serde(default)]
    pub(crate) is_dirt: bool,
}

impl LegacyRow {
    fn sub_category(&self) -> TrackCategory {
        if let Some(category) = TrackCategory::from_label(&self.category)
            && category != TrackCategory::Mixed
        {
            return category;
        }
        match (self.is_dirt, self.is_oval) {
            (true, true) => TrackCategory::DirtOval,
            (true, false) => TrackCategory::DirtRoad,
            (false, true) => TrackCategory::Oval,
            (false, false) => TrackCategory::Road,
        }
    }

    fn is_marked_retired(&self) -> bool {
        self.retired
            || self
                .track_name
                .trim_start()
                .to_ascii_lowercase()
                .starts_with("[retired]")
    }
}

/// Groups rows by base location name, preserving first-appearance order.
///
/// Rows repeating an already-seen layout path are dropped with a warning.
pub(crate) fn group_rows(rows: Vec<LegacyRow>) -> Vec<CatalogEntry> {
    let mut entries: Vec<CatalogEntry> = Vec::new();
    let mut seen_paths = std::collections::HashSet::new();

    for row in rows {
        let base = base_location_name(&row.track_name);
        if base.is_empty() {
            warn!(track_name = %row.track_name, "skipping track row without a name");
            continue;
        }

        let path_key = row.track_dirpath.replace('\\', "/").to_ascii_lowercase();
        if !seen_paths.insert(path_key) {
            warn!(
                track_name = %row.track_name,
                path = %row.track_dirpath,
                "skipping track row repeating an existing layout path"
            );
            continue;
        }

        let sub = SubConfig {
            name: if row.config_name.trim().is_empty() {
                "default".to_string()
            } else {
                row.config_name.trim().to_string()
            },
            relative_path: row.track_dirpath.clone(),
            retired: row.is_marked_retired(),
            category: Some(row.sub_category()),
        };

        match entries
            .iter_mut()
            .find(|entry| entry.name.eq_ignore_ascii_case(&base))
        {
            Some(entry) => entry.sub_configs.push(sub),
            None => entries.push(CatalogEntry {
                name: base,
                aliases: Vec::new(),
                category: TrackCategory::Mixed,
                sub_configs: vec![sub],
            }),
        }
    }

    for entry in &mut entries {
        entry.category = uniform_category(&entry.sub_configs);
    }

    entries
}

fn uniform_category(subs: &[SubConfig]) -> TrackCategory {
    let mut categories = subs.iter().filter_map(|sub| sub.category);
    let Some(first) = categories.next() else {
        return TrackCategory::Mixed;
    };
    if categories.all(|c| c == first) {
        first
    } else {
        TrackCategory::Mixed
    }
}
