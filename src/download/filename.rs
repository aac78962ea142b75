//! Filename sanitisation, destination layout, and unique path resolution.

use std::path::{Component, Path, PathBuf};

use url::Url;

/// Folder used when an item carries no subject.
const UNKNOWN_SUBJECT: &str = "unknown";

/// Highest numeric suffix tried before falling back to a timestamp.
const MAX_SUFFIX: usize = 1000;

/// Parses a Content-Disposition header for its filename.
///
/// Handles `filename="a.sto"`, `filename=a.sto`, and the RFC 5987
/// `filename*=UTF-8''a%20b.sto` form (preferred when present).
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            if let Ok(decoded) = urlencoding::decode(encoded[..end].trim()) {
                return Some(decoded.into_owned());
            }
        }
    }

    if let Some(pos) = header.find("filename=") {
        let value = header[pos + 9..].trim();
        if let Some(stripped) = value.strip_prefix('"') {
            if let Some(end) = stripped.find('"') {
                return Some(stripped[..end].to_string());
            }
        } else {
            let end = value.find(';').unwrap_or(value.len());
            let filename = value[..end].trim();
            if !filename.is_empty() {
                return Some(filename.to_string());
            }
        }
    }

    None
}

/// Last non-empty path segment of a URL, percent-decoded.
pub(crate) fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(last).ok()?;
    Some(decoded.into_owned())
}

/// Replaces characters invalid on common filesystems (`/ \ : * ? " < > |`
/// and control characters) with `_`. Never returns `.`, `..`, or an empty name.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized.replace('.', "_")
    }
}

/// Destination directory for an item:
/// `<root>/<subject>/<relative path>` or `<root>/<subject>` when unresolved.
#[must_use]
pub fn destination_dir(root: &Path, subject: &str, relative_path: Option<&str>) -> PathBuf {
    let subject = if subject.trim().is_empty() {
        UNKNOWN_SUBJECT.to_string()
    } else {
        sanitize_filename(subject)
    };

    let mut dir = root.join(subject);
    if let Some(relative) = relative_path {
        for segment in relative.split(['/', '\\']).filter(|s| !s.is_empty()) {
            dir.push(sanitize_filename(segment));
        }
    }
    dir
}

/// Picks a path in `dir` for `filename` that does not clobber another file.
///
/// The plain name is used when free or when it is one of the `owned` files
/// (stored by this item previously). Otherwise `stem_2.ext`, `stem_3.ext`,
/// ... are tried.
pub(crate) fn resolve_unique_path(dir: &Path, filename: &str, owned: &[PathBuf]) -> PathBuf {
    let filename = sanitize_filename(filename);
    let base_path = dir.join(&filename);
    let is_available = |path: &Path| !path.exists() || owned.iter().any(|o| o == path);

    if is_available(&base_path) {
        return base_path;
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename.as_str(), ""),
    };

    for i in 2..MAX_SUFFIX {
        let candidate = dir.join(format!("{stem}_{i}{ext}"));
        if is_available(&candidate) {
            return candidate;
        }
    }

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    dir.join(format!("{stem}_{timestamp}{ext}"))
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}
