//! Source revision markers and their ordering.

use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

/// `25S4 W3`, `26S1W8`: two-digit year, season, week.
static SEASON_WEEK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^(\d{2})\s*S\s*(\d+)\s*W\s*(\d+)$").ok());

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// A provider-supplied revision marker, parsed into a comparable form.
///
/// Markers of the same kind are totally ordered. Markers of different kinds,
/// or unrecognised markers, do not compare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionMarker {
    /// RFC 3339 / ISO-8601 timestamp (naive values are taken as UTC).
    Timestamp(DateTime<Utc>),
    /// Integer seconds since the Unix epoch.
    Epoch(i64),
    /// Dotted numeric version, optional `v` prefix (`v1.2.10`).
    Version(Vec<u64>),
    /// Racing-season week (`25S4 W3`), ordered by year, season, then week.
    SeasonWeek(u32, u32, u32),
    /// Anything else.
    Unrecognized(String),
}

impl RevisionMarker {
    /// Parses a raw marker. Never fails; unknown shapes become
    /// [`RevisionMarker::Unrecognized`].
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Unrecognized(String::new());
        }

        if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
            return Self::Timestamp(ts.with_timezone(&Utc));
        }
        for format in NAIVE_DATETIME_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Self::Timestamp(naive.and_utc());
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            && let Some(midnight) = date.and_hms_opt(0, 0, 0)
        {
            return Self::Timestamp(midnight.and_utc());
        }

        if let Ok(epoch) = trimmed.parse::<i64>() {
            return Self::Epoch(epoch);
        }

        if let Some(caps) = SEASON_WEEK.as_ref().and_then(|re| re.captures(trimmed))
            && let (Ok(year), Ok(season), Ok(week)) =
                (caps[1].parse(), caps[2].parse(), caps[3].parse())
        {
            return Self::SeasonWeek(year, season, week);
        }

        let version = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        if !version.is_empty() {
            let parts: Result<Vec<u64>, _> = version.split('.').map(str::parse::<u64>).collect();
            if let Ok(parts) = parts {
                return Self::Version(parts);
            }
        }

        Self::Unrecognized(trimmed.to_string())
    }

    /// Compares two markers of the same kind.
    ///
    /// Returns `None` across kinds or when either side is unrecognised.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::Epoch(a), Self::Epoch(b)) => Some(a.cmp(b)),
            (Self::Version(a), Self::Version(b)) => Some(compare_versions(a, b)),
            (Self::SeasonWeek(ay, asn, aw), Self::SeasonWeek(by, bsn, bw)) => {
                Some((ay, asn, aw).cmp(&(by, bsn, bw)))
            }
            _ => None,
        }
    }

    /// Returns true when `self` (the recorded marker) is at least as new as
    /// `current`. Incomparable markers are never considered up to date.
    #[must_use]
    pub fn is_up_to_date_with(&self, current: &Self) -> bool {
        matches!(
            self.compare(current),
            Some(Ordering::Greater | Ordering::Equal)
        )
    }
}

impl fmt::Display for RevisionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Self::Epoch(epoch) => write!(f, "{epoch}"),
            Self::Version(parts) => {
                let joined: Vec<String> = parts.iter().map(u64::to_string).collect();
                write!(f, "v{}", joined.join("."))
            }
            Self::SeasonWeek(year, season, week) => write!(f, "{year:02}S{season} W{week}"),
            Self::Unrecognized(raw) => f.write_str(raw),
        }
    }
}

/// Compares versions component-wise, missing components counting as zero.
fn compare_versions(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let left = a.get(i).copied().unwrap_or(0);
        let right = b.get(i).copied().unwrap_or(0);
        match left.cmp(&right) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}
