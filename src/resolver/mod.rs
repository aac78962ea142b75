//! Fuzzy resolution of free-text location names to catalog paths.
//!
//! Resolution is tiered and the first tier producing a candidate wins:
//!
//! 1. **Exact**: the normalised name equals a canonical name, base name,
//!    alias, or top-level path segment of an entry
//! 2. **Substring**: the name contains, or is contained in, one of those keys
//!    (keys and inputs shorter than three characters never match here)
//! 3. **Fuzzy**: the best `strsim::normalized_levenshtein` ratio against any
//!    key reaches [`FUZZY_THRESHOLD`]
//!
//! Names with a glued layout suffix (`DaytonaRoad`, `SpaGP`) are tried as
//! written first, then as their base name; the suffix then steers layout
//! selection.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use setup_downloader_core::catalog::CatalogIndex;
//! use setup_downloader_core::resolver::{MatchTier, Resolver};
//!
//! let catalog = CatalogIndex::from_json_str(
//!     r#"[{"name": "Spa-Francorchamps", "category": "road",
//!          "subConfigs": [{"name": "gp", "path": "spa/gp"}]}]"#,
//!     "inline",
//! )?;
//! let resolver = Resolver::new(Arc::new(catalog));
//!
//! let resolved = resolver.resolve("SPA", None).into_resolved().unwrap();
//! assert_eq!(resolved.relative_path, "spa/gp");
//! assert_eq!(resolved.tier, MatchTier::Exact);
//! # Ok::<(), setup_downloader_core::catalog::CatalogError>(())
//! ```

mod category;
mod normalize;

pub use category::parse_category_hint;
pub(crate) use normalize::split_camel_case;

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::catalog::{CatalogEntry, CatalogIndex, SubConfig, TrackCategory};
use normalize::{Normalized, normalize, split_compound, suffix_keywords};

/// Minimum similarity for the fuzzy tier.
pub const FUZZY_THRESHOLD: f64 = 0.6;

/// Confidence reported for substring matches.
pub const SUBSTRING_CONFIDENCE: f64 = 0.8;

/// Shortest key or input considered by the substring tier.
const MIN_SUBSTRING_LEN: usize = 3;

/// Which tier produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchTier {
    /// Normalised equality with a name, alias, or path key.
    Exact,
    /// Containment in either direction.
    Substring,
    /// Similarity at or above [`FUZZY_THRESHOLD`].
    Fuzzy,
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Exact => "exact",
            Self::Substring => "substring",
            Self::Fuzzy => "fuzzy",
        };
        f.write_str(label)
    }
}

/// A successful resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    /// Canonical name of the matched entry.
    pub entry_name: String,
    /// Name of the selected layout.
    pub sub_config: String,
    /// Destination path of the layout, relative to the subject folder.
    pub relative_path: String,
    /// Tier that matched.
    pub tier: MatchTier,
    /// 1.0 for exact, [`SUBSTRING_CONFIDENCE`] for substring, the similarity
    /// score for fuzzy.
    pub confidence: f64,
}

/// Outcome of [`Resolver::resolve`]. Unresolved is a normal result.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The name mapped to a catalog layout.
    Resolved(ResolvedPath),
    /// No tier produced a candidate.
    Unresolved,
}

impl Resolution {
    /// Returns the resolved path, if any.
    #[must_use]
    pub fn as_resolved(&self) -> Option<&ResolvedPath> {
        match self {
            Self::Resolved(path) => Some(path),
            Self::Unresolved => None,
        }
    }

    /// Consumes the resolution, returning the resolved path, if any.
    #[must_use]
    pub fn into_resolved(self) -> Option<ResolvedPath> {
        match self {
            Self::Resolved(path) => Some(path),
            Self::Unresolved => None,
        }
    }

    /// Relative destination path, if resolved.
    #[must_use]
    pub fn relative_path(&self) -> Option<&str> {
        self.as_resolved().map(|r| r.relative_path.as_str())
    }

    /// Returns true when no tier matched.
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved)
    }
}

#[derive(Debug, Clone)]
struct IndexKey {
    key: Normalized,
    entry: usize,
}

/// Maps location names to catalog layouts. Pure and deterministic.
#[derive(Debug, Clone)]
pub struct Resolver {
    catalog: Arc<CatalogIndex>,
    keys: Vec<IndexKey>,
    // Pre-normalised layout names/paths, parallel to catalog entries.
    layout_text: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    entry: usize,
    tier: MatchTier,
    confidence: f64,
    // Substring tier: length of the matched overlap.
    overlap: usize,
}

impl Resolver {
    /// Builds the key index for `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<CatalogIndex>) -> Self {
        let mut keys = Vec::new();
        let mut layout_text = Vec::with_capacity(catalog.len());

        for (index, entry) in catalog.entries().iter().enumerate() {
            let mut seen: BTreeSet<String> = BTreeSet::new();
            let mut push = |raw: &str| {
                let key = Normalized::new(raw);
                if !key.is_empty() && seen.insert(key.compact.clone()) {
                    keys.push(IndexKey { key, entry: index });
                }
            };

            push(&entry.name);
            push(&crate::catalog::base_location_name(&entry.name));
            for alias in &entry.aliases {
                push(alias);
            }
            for sub in &entry.sub_configs {
                if let Some(segment) = sub.relative_path.split('/').next() {
                    push(segment);
                }
            }

            layout_text.push(
                entry
                    .sub_configs
                    .iter()
                    .map(|sub| format!("{} {}", normalize(&sub.name), normalize(&sub.relative_path)))
                    .collect(),
            );
        }

        debug!(entries = catalog.len(), keys = keys.len(), "built resolver index");
        Self {
            catalog,
            keys,
            layout_text,
        }
    }

    /// The catalog this resolver matches against.
    #[must_use]
    pub fn catalog(&self) -> &CatalogIndex {
        &self.catalog
    }

    /// Resolves a free-text location name.
    ///
    /// `category_hint` steers layout selection on entries with several
    /// layouts; it never affects which entry is matched.
    #[must_use]
    pub fn resolve(&self, raw_name: &str, category_hint: Option<TrackCategory>) -> Resolution {
        let raw = Normalized::new(raw_name);
        if raw.is_empty() {
            return Resolution::Unresolved;
        }

        let compound = split_compound(raw_name);
        let mut forms = vec![raw];
        if let Some((base, _)) = &compound {
            let base = Normalized::new(base);
            if !base.is_empty() && !forms.contains(&base) {
                forms.push(base);
            }
        }
        let suffix = compound.as_ref().map(|(_, suffix)| *suffix);

        for tier in [MatchTier::Exact, MatchTier::Substring, MatchTier::Fuzzy] {
            for form in &forms {
                if let Some(candidate) = self.match_tier(tier, form) {
                    return self.finish(candidate, category_hint, suffix, raw_name);
                }
            }
        }

        debug!(name = raw_name, "location unresolved");
        Resolution::Unresolved
    }

    /// Resolves a hint given as free text (see [`parse_category_hint`]).
    #[must_use]
    pub fn resolve_with_hint_text(&self, raw_name: &str, hint: Option<&str>) -> Resolution {
        self.resolve(raw_name, hint.and_then(parse_category_hint))
    }

    fn match_tier(&self, tier: MatchTier, input: &Normalized) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;

        for index_key in &self.keys {
            let candidate = match tier {
                MatchTier::Exact => (index_key.key.compact == input.compact).then_some(Candidate {
                    entry: index_key.entry,
                    tier,
                    confidence: 1.0,
                    overlap: 0,
                }),
                MatchTier::Substring => substring_overlap(&index_key.key, input).map(|overlap| {
                    Candidate {
                        entry: index_key.entry,
                        tier,
                        confidence: SUBSTRING_CONFIDENCE,
                        overlap,
                    }
                }),
                MatchTier::Fuzzy => {
                    let score = similarity(&index_key.key, input);
                    (score >= FUZZY_THRESHOLD).then_some(Candidate {
                        entry: index_key.entry,
                        tier,
                        confidence: score,
                        overlap: 0,
                    })
                }
            };

            if let Some(candidate) = candidate {
                trace!(key = %index_key.key.spaced, %tier, "candidate key");
                best = Some(match best {
                    Some(current) if self.rank(&current, &candidate) != Ordering::Greater => current,
                    _ => candidate,
                });
            }
        }

        best
    }

    /// Orders candidates; `Less` means `a` is preferred.
    fn rank(&self, a: &Candidate, b: &Candidate) -> Ordering {
        let entries = self.catalog.entries();
        let name_a = &entries[a.entry].name;
        let name_b = &entries[b.entry].name;

        b.overlap
            .cmp(&a.overlap)
            .then_with(|| b.confidence.total_cmp(&a.confidence))
            .then_with(|| name_a.chars().count().cmp(&name_b.chars().count()))
            .then_with(|| name_a.cmp(name_b))
    }

    fn finish(
        &self,
        candidate: Candidate,
        category_hint: Option<TrackCategory>,
        suffix: Option<&'static str>,
        raw_name: &str,
    ) -> Resolution {
        let Some(entry) = self.catalog.entries().get(candidate.entry) else {
            return Resolution::Unresolved;
        };
        let Some(sub) = self.select_sub_config(candidate.entry, entry, category_hint, suffix) else {
            return Resolution::Unresolved;
        };

        debug!(
            name = raw_name,
            entry = %entry.name,
            sub_config = %sub.name,
            tier = %candidate.tier,
            confidence = candidate.confidence,
            "resolved location"
        );

        Resolution::Resolved(ResolvedPath {
            entry_name: entry.name.clone(),
            sub_config: sub.name.clone(),
            relative_path: sub.relative_path.clone(),
            tier: candidate.tier,
            confidence: candidate.confidence,
        })
    }

    fn select_sub_config<'a>(
        &self,
        entry_index: usize,
        entry: &'a CatalogEntry,
        category_hint: Option<TrackCategory>,
        suffix: Option<&'static str>,
    ) -> Option<&'a SubConfig> {
        let mut pool: Vec<usize> = (0..entry.sub_configs.len()).collect();

        if let Some(hint) = category_hint {
            narrow(&mut pool, |i| {
                entry.effective_category(&entry.sub_configs[i]) == Some(hint)
            });
        }

        narrow(&mut pool, |i| !entry.sub_configs[i].retired);

        if let Some(suffix) = suffix
            && let Some(texts) = self.layout_text.get(entry_index)
        {
            let keywords = suffix_keywords(suffix);
            narrow(&mut pool, |i| {
                texts
                    .get(i)
                    .is_some_and(|text| keywords.iter().any(|k| text.contains(k)))
            });
        }

        pool.first().and_then(|&i| entry.sub_configs.get(i))
    }
}

/// Keeps the indices matching `keep`, unless none do.
fn narrow(pool: &mut Vec<usize>, keep: impl Fn(usize) -> bool) {
    let narrowed: Vec<usize> = pool.iter().copied().filter(|&i| keep(i)).collect();
    if !narrowed.is_empty() {
        *pool = narrowed;
    }
}

fn substring_overlap(key: &Normalized, input: &Normalized) -> Option<usize> {
    let key_len = key.compact.len();
    let input_len = input.compact.len();
    if key_len < MIN_SUBSTRING_LEN || input_len < MIN_SUBSTRING_LEN {
        return None;
    }
    if key.compact.contains(&input.compact) {
        Some(input_len)
    } else if input.compact.contains(&key.compact) {
        Some(key_len)
    } else {
        None
    }
}

fn similarity(key: &Normalized, input: &Normalized) -> f64 {
    strsim::normalized_levenshtein(&key.spaced, &input.spaced)
        .max(strsim::normalized_levenshtein(&key.compact, &input.compact))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn resolver_from(raw: &str) -> Resolver {
        Resolver::new(Arc::new(CatalogIndex::from_json_str(raw, "test").unwrap()))
    }

    fn sample() -> Resolver {
        resolver_from(
            r#"[
                {"name": "Spa-Francorchamps", "aliases": ["Spa"], "category": "road",
                 "subConfigs": [
                    {"name": "gp", "path": "spa/gp"},
                    {"name": "endurance", "path": "spa/endurance"}
                 ]},
                {"name": "Daytona International Speedway", "aliases": ["Daytona"], "category": "mixed",
                 "subConfigs": [
                    {"name": "oval", "path": "daytona/oval", "category": "oval"},
                    {"name": "road", "path": "daytona/road", "category": "road"}
                 ]},
                {"name": "Okayama", "category": "road",
                 "subConfigs": [
                    {"name": "old", "path": "okayama/old", "retired": true},
                    {"name": "full", "path": "okayama/full"}
                 ]},
                {"name": "Road America", "category": "road",
                 "subConfigs": [{"name": "full", "path": "roadamerica/full"}]},
                {"name": "Watkins Glen", "category": "road",
                 "subConfigs": [{"name": "boot", "path": "watkinsglen/boot"}]}
            ]"#,
        )
    }

    // ==================== Tier Tests ====================

    #[test]
    fn test_resolve_spa_uppercase_exact() {
        let resolver = resolver_from(
            r#"[{"name": "Spa-Francorchamps", "subConfigs": [{"name": "gp", "path": "spa/gp", "retired": false}]}]"#,
        );
        let resolved = resolver.resolve("SPA", None).into_resolved().unwrap();
        assert_eq!(resolved.relative_path, "spa/gp");
        assert_eq!(resolved.tier, MatchTier::Exact);
        assert!((resolved.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_resolve_punctuation_insensitive_exact() {
        let resolved = sample().resolve("spa francorchamps", None).into_resolved().unwrap();
        assert_eq!(resolved.entry_name, "Spa-Francorchamps");
        assert_eq!(resolved.tier, MatchTier::Exact);
    }

    #[test]
    fn test_resolve_substring_tier() {
        let resolved = sample().resolve("Watkins Glen Boot Layout", None).into_resolved().unwrap();
        assert_eq!(resolved.entry_name, "Watkins Glen");
        assert_eq!(resolved.tier, MatchTier::Substring);
    }

    #[test]
    fn test_resolve_fuzzy_tier() {
        let resolved = sample().resolve("Okayamma", None).into_resolved().unwrap();
        assert_eq!(resolved.entry_name, "Okayama");
        assert_eq!(resolved.tier, MatchTier::Fuzzy);
        assert!(resolved.confidence >= FUZZY_THRESHOLD);
    }

    #[test]
    fn test_resolve_exact_beats_substring() {
        // "road america" is also a substring candidate for "road" keys; exact wins.
        let resolved = sample().resolve("Road America", None).into_resolved().unwrap();
        assert_eq!(resolved.tier, MatchTier::Exact);
        assert_eq!(resolved.relative_path, "roadamerica/full");
    }

    #[test]
    fn test_resolve_unmatched_is_unresolved() {
        let resolver = sample();
        assert!(resolver.resolve("Zzyzx Proving Ground", None).is_unresolved());
        assert!(resolver.resolve("   ", None).is_unresolved());
    }

    #[test]
    fn test_resolve_short_input_skips_substring() {
        assert!(sample().resolve("xy", None).is_unresolved());
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let resolver = sample();
        let first = resolver.resolve("Daytona", Some(TrackCategory::Road));
        for _ in 0..10 {
            assert_eq!(resolver.resolve("Daytona", Some(TrackCategory::Road)), first);
        }
    }

    // ==================== Layout Selection Tests ====================

    #[test]
    fn test_category_hint_selects_layout() {
        let resolver = sample();
        assert_eq!(
            resolver.resolve("Daytona", Some(TrackCategory::Road)).relative_path(),
            Some("daytona/road")
        );
        assert_eq!(
            resolver.resolve("Daytona", Some(TrackCategory::Oval)).relative_path(),
            Some("daytona/oval")
        );
        assert_eq!(resolver.resolve("Daytona", None).relative_path(), Some("daytona/oval"));
    }

    #[test]
    fn test_retired_layout_loses() {
        assert_eq!(sample().resolve("Okayama", None).relative_path(), Some("okayama/full"));
    }

    #[test]
    fn test_unmatched_category_hint_falls_back() {
        assert_eq!(
            sample().resolve("Spa", Some(TrackCategory::Oval)).relative_path(),
            Some("spa/gp")
        );
    }

    #[test]
    fn test_compound_name_suffix_selects_layout() {
        let resolver = sample();
        assert_eq!(resolver.resolve("DaytonaRoad", None).relative_path(), Some("daytona/road"));
        assert_eq!(resolver.resolve("SpaEndurance", None).relative_path(), Some("spa/endurance"));
    }

    #[test]
    fn test_resolve_with_hint_text_maps_series_tags() {
        let resolver = sample();
        assert_eq!(
            resolver.resolve_with_hint_text("Daytona", Some("GT3")).relative_path(),
            Some("daytona/road")
        );
        assert_eq!(
            resolver.resolve_with_hint_text("Daytona", Some("nascar cup")).relative_path(),
            Some("daytona/oval")
        );
    }

    #[test]
    fn test_bundled_catalog_resolves_common_names() {
        let resolver = Resolver::new(Arc::new(CatalogIndex::bundled().unwrap()));
        assert_eq!(resolver.resolve("Le Mans", None).relative_path(), Some("lemans/full"));
        assert_eq!(resolver.resolve("Nürburgring", None).relative_path(), Some("nurburgring/gp"));
        assert_eq!(resolver.resolve("SPA", None).relative_path(), Some("spa/gp"));
    }
}
