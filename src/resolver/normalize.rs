//! Text normalisation for location matching.

use std::sync::LazyLock;

use regex::Regex;

static BRACKET_PREFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*\[[^\]]*\]\s*").ok());

/// Layout suffixes that may be glued onto a location name (`DaytonaRoad`).
///
/// Ordered longest first so `fullcourse` wins over `full`.
pub(crate) const CONFIG_SUFFIXES: &[&str] = &[
    "fullcourse",
    "endurance",
    "grandprix",
    "combined",
    "national",
    "outer",
    "inner",
    "north",
    "south",
    "short",
    "club",
    "east",
    "west",
    "full",
    "road",
    "oval",
    "moto",
    "24h",
    "gp",
];

/// A normalised string in both its spaced and space-free forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Normalized {
    pub(crate) spaced: String,
    pub(crate) compact: String,
}

impl Normalized {
    pub(crate) fn new(raw: &str) -> Self {
        let spaced = normalize(raw);
        let compact = spaced.replace(' ', "");
        Self { spaced, compact }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.compact.is_empty()
    }
}

/// Lowercases, folds common Latin diacritics, strips a bracketed prefix and
/// punctuation, and collapses runs of separators into single spaces.
pub(crate) fn normalize(raw: &str) -> String {
    let stripped = match BRACKET_PREFIX.as_ref() {
        Some(re) => re.replace(raw, "").into_owned(),
        None => raw.to_string(),
    };

    let mut folded = String::with_capacity(stripped.len());
    for ch in stripped.chars().flat_map(char::to_lowercase) {
        match fold_diacritic(ch) {
            Some(replacement) => folded.push_str(replacement),
            None if ch.is_ascii_alphanumeric() => folded.push(ch),
            None => folded.push(' '),
        }
    }

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_diacritic(ch: char) -> Option<&'static str> {
    let folded = match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' => "a",
        'æ' => "ae",
        'ç' | 'č' | 'ć' => "c",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ě' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ñ' | 'ń' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ő' => "o",
        'œ' => "oe",
        'ś' | 'š' => "s",
        'ß' => "ss",
        'ù' | 'ú' | 'û' | 'ü' | 'ű' => "u",
        'ý' | 'ÿ' => "y",
        'ž' | 'ź' | 'ż' => "z",
        _ => return None,
    };
    Some(folded)
}

/// Inserts spaces at CamelCase and letter/digit boundaries.
///
/// `SpaGP` → `Spa GP`, `Daytona2011Road` → `Daytona 2011 Road`.
pub(crate) fn split_camel_case(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len() + 4);

    for (i, &ch) in chars.iter().enumerate() {
        if i > 0 {
            let prev = chars[i - 1];
            let lower_to_upper = prev.is_lowercase() && ch.is_uppercase();
            let letter_digit = (prev.is_alphabetic() && ch.is_ascii_digit())
                || (prev.is_ascii_digit() && ch.is_alphabetic());
            if lower_to_upper || letter_digit {
                out.push(' ');
            }
        }
        out.push(ch);
    }
    out
}

/// Splits a trailing layout suffix off a location name.
///
/// Returns the base name (normalised, spaced) and the suffix, or `None` when
/// the name carries no recognised suffix or the remainder would be shorter
/// than three characters.
pub(crate) fn split_compound(raw: &str) -> Option<(String, &'static str)> {
    let spaced = normalize(&split_camel_case(raw));
    let words: Vec<&str> = spaced.split(' ').collect();

    if words.len() > 1
        && let Some(last) = words.last()
        && let Some(suffix) = CONFIG_SUFFIXES.iter().find(|s| **s == *last)
    {
        let base = words[..words.len() - 1].join(" ");
        if base.replace(' ', "").len() >= 3 {
            return Some((base, *suffix));
        }
    }

    let compact = spaced.replace(' ', "");
    for suffix in CONFIG_SUFFIXES {
        if let Some(base) = compact.strip_suffix(suffix)
            && base.len() >= 3
        {
            return Some((base.to_string(), *suffix));
        }
    }
    None
}

/// Keywords a layout name or path must contain to satisfy a suffix hint.
pub(crate) fn suffix_keywords(suffix: &str) -> &'static [&'static str] {
    match suffix {
        "gp" | "grandprix" => &["gp", "grand prix", "grandprix"],
        "full" | "fullcourse" => &["full"],
        "road" => &["road"],
        "oval" => &["oval"],
        "moto" => &["moto"],
        "endurance" | "24h" => &["endurance", "24h"],
        "combined" => &["combined"],
        "national" => &["national"],
        "club" => &["club"],
        "short" => &["short"],
        "outer" => &["outer"],
        "inner" => &["inner"],
        "north" => &["north"],
        "south" => &["south"],
        "east" => &["east"],
        "west" => &["west"],
        _ => &[],
    }
}
