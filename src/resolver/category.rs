//! Free-text category hints mapped onto catalog categories.

use crate::catalog::TrackCategory;

use super::normalize::normalize;

const ROAD_TAGS: &[&str] = &[
    "road", "gt3", "gt4", "gte", "lmp2", "lmp3", "gtp", "imsa", "wec", "tcr", "f4",
];
const OVAL_TAGS: &[&str] = &[
    "oval",
    "nascar",
    "arca",
    "indycar oval",
    "cup",
    "xfinity",
    "truck",
    "trucks",
];
const DIRT_OVAL_TAGS: &[&str] = &["dirt oval", "sprint car", "late model", "world of outlaws"];
const DIRT_ROAD_TAGS: &[&str] = &["dirt road", "rallycross", "rx"];

/// Interprets a category hint.
///
/// Accepts catalog category labels (`road`, `oval-racing`, ...) and common
/// series tags (`GT3`, `NASCAR`, ...). The whole hint is tried first, then
/// each word. `mixed` and unknown hints yield `None`.
#[must_use]
pub fn parse_category_hint(hint: &str) -> Option<TrackCategory> {
    if let Some(category) = TrackCategory::from_label(hint) {
        return (category != TrackCategory::Mixed).then_some(category);
    }

    let normalized = normalize(hint);
    if normalized.is_empty() {
        return None;
    }
    if let Some(category) = lookup_tag(&normalized) {
        return Some(category);
    }
    normalized.split(' ').find_map(lookup_tag)
}

fn lookup_tag(tag: &str) -> Option<TrackCategory> {
    if DIRT_OVAL_TAGS.contains(&tag) {
        Some(TrackCategory::DirtOval)
    } else if DIRT_ROAD_TAGS.contains(&tag) {
        Some(TrackCategory::DirtRoad)
    } else if OVAL_TAGS.contains(&tag) {
        Some(TrackCategory::Oval)
    } else if ROAD_TAGS.contains(&tag) {
        Some(TrackCategory::Road)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_category_hint_labels() {
        assert_eq!(parse_category_hint("road-racing"), Some(TrackCategory::Road));
        assert_eq!(parse_category_hint("OVAL"), Some(TrackCategory::Oval));
        assert_eq!(parse_category_hint("mixed"), None);
    }

    #[test]
    fn test_parse_category_hint_series_tags() {
        assert_eq!(parse_category_hint("GT3"), Some(TrackCategory::Road));
        assert_eq!(parse_category_hint("NASCAR Cup Series"), Some(TrackCategory::Oval));
        assert_eq!(parse_category_hint("IndyCar Oval"), Some(TrackCategory::Oval));
        assert_eq!(parse_category_hint("Dirt Oval"), Some(TrackCategory::DirtOval));
    }

    #[test]
    fn test_parse_category_hint_unknown() {
        assert_eq!(parse_category_hint("formula vee"), None);
        assert_eq!(parse_category_hint(""), None);
    }
}
