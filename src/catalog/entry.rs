//! Catalog entry types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category tag of a catalog entry or sub-configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackCategory {
    /// Road course.
    #[serde(alias = "road-racing", alias = "road_racing")]
    Road,
    /// Paved oval.
    #[serde(alias = "oval-racing", alias = "oval_racing")]
    Oval,
    /// Dirt road course / rallycross.
    #[serde(alias = "dirt-road")]
    DirtRoad,
    /// Dirt oval.
    #[serde(alias = "dirt-oval")]
    DirtOval,
    /// Location hosting several kinds of layouts.
    Mixed,
}

impl TrackCategory {
    /// Parses a catalog category label (case-insensitive).
    ///
    /// Accepts the serialized names plus the `-racing` long forms.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "road" | "road_racing" | "road_course" => Some(Self::Road),
            "oval" | "oval_racing" => Some(Self::Oval),
            "dirt_road" => Some(Self::DirtRoad),
            "dirt_oval" => Some(Self::DirtOval),
            "mixed" => Some(Self::Mixed),
            _ => None,
        }
    }

    /// Returns the stable label used in catalog documents.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Road => "road",
            Self::Oval => "oval",
            Self::DirtRoad => "dirt_road",
            Self::DirtOval => "dirt_oval",
            Self::Mixed => "mixed",
        }
    }
}

impl fmt::Display for TrackCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named layout variant of a location with its own destination path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubConfig {
    /// Layout name (e.g. "gp", "Grand Prix Pits").
    pub name: String,
    /// Destination path relative to the subject folder, `/`-separated.
    pub relative_path: String,
    /// Retired layouts lose to active ones during disambiguation.
    pub retired: bool,
    /// Layout-specific category, overriding the entry's.
    pub category: Option<TrackCategory>,
}

/// A canonical location with its aliases and layouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    /// Canonical location name.
    pub name: String,
    /// Alternative spellings matched exactly like the canonical name.
    pub aliases: Vec<String>,
    /// Entry category.
    pub category: TrackCategory,
    /// Layouts in declaration order.
    pub sub_configs: Vec<SubConfig>,
}

impl CatalogEntry {
    /// Category a sub-configuration competes under during disambiguation.
    ///
    /// A `mixed` entry contributes no category of its own.
    #[must_use]
    pub fn effective_category(&self, sub: &SubConfig) -> Option<TrackCategory> {
        sub.category.or(match self.category {
            TrackCategory::Mixed => None,
            other => Some(other),
        })
    }

    /// Returns the first sub-configuration that is not retired, falling back
    /// to the first declared one.
    #[must_use]
    pub fn default_sub_config(&self) -> Option<&SubConfig> {
        self.sub_configs
            .iter()
            .find(|sub| !sub.retired)
            .or_else(|| self.sub_configs.first())
    }
}
