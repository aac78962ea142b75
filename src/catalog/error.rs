//! Error types for catalog loading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog file could not be read.
    #[error("IO error reading catalog {path}: {source}")]
    Io {
        /// Catalog file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The catalog document is not in a recognised shape.
    #[error("invalid catalog document {origin}: {source}")]
    Parse {
        /// Where the document came from (file path or "bundled").
        origin: String,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },

    /// The catalog contains no entries.
    #[error("catalog {origin} contains no entries")]
    Empty {
        /// Where the document came from.
        origin: String,
    },

    /// An entry has a blank canonical name.
    #[error("catalog entry #{index} has an empty name")]
    EmptyName {
        /// Zero-based position of the entry.
        index: usize,
    },

    /// An entry declares no sub-configurations.
    #[error("catalog entry '{entry}' declares no sub-configurations")]
    NoSubConfigs {
        /// Canonical name of the entry.
        entry: String,
    },

    /// A sub-configuration path is empty, absolute, or escapes the root.
    #[error("catalog entry '{entry}' has invalid path '{path}'")]
    InvalidPath {
        /// Canonical name of the entry.
        entry: String,
        /// Offending path as written.
        path: String,
    },

    /// Two sub-configurations share the same relative path.
    #[error("duplicate sub-configuration path '{path}' in '{first}' and '{second}'")]
    DuplicatePath {
        /// Normalised path.
        path: String,
        /// Entry that declared it first.
        first: String,
        /// Entry that declared it again.
        second: String,
    },
}

impl CatalogError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a parse error.
    pub fn parse(origin: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Parse {
            origin: origin.into(),
            source,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_path_display_names_both_entries() {
        let error = CatalogError::DuplicatePath {
            path: "spa/gp".to_string(),
            first: "Spa".to_string(),
            second: "Spa Legacy".to_string(),
        };
        let msg = error.to_string();
        assert!(msg.contains("spa/gp"), "Expected path in: {msg}");
        assert!(msg.contains("Spa Legacy"), "Expected second entry in: {msg}");
    }

    #[test]
    fn test_io_error_display_includes_path() {
        let error = CatalogError::io(
            "/tmp/catalog.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(error.to_string().contains("/tmp/catalog.json"));
    }
}
