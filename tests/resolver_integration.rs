//! Integration tests for the resolver module.
//!
//! Tests resolution against the bundled catalog and catalogs loaded from disk.

use std::sync::Arc;

use setup_downloader_core::catalog::CatalogError;
use setup_downloader_core::{CatalogIndex, MatchTier, Resolver, TrackCategory};
use tempfile::TempDir;

fn bundled_resolver() -> Resolver {
    Resolver::new(Arc::new(CatalogIndex::bundled().unwrap()))
}

// ==================== Bundled Catalog Tests ====================

#[test]
fn test_every_bundled_entry_name_resolves_exactly_to_itself() {
    let catalog = Arc::new(CatalogIndex::bundled().unwrap());
    let resolver = Resolver::new(Arc::clone(&catalog));

    for entry in catalog.entries() {
        let resolved = resolver
            .resolve(&entry.name, None)
            .into_resolved()
            .unwrap_or_else(|| panic!("{} did not resolve", entry.name));
        assert_eq!(resolved.entry_name, entry.name);
        assert_eq!(resolved.tier, MatchTier::Exact);
        assert!(
            catalog.sub_config_by_path(&resolved.relative_path).is_some(),
            "{} resolved to unknown path {}",
            entry.name,
            resolved.relative_path
        );
    }
}

#[test]
fn test_bundled_spa_variants_share_layout() {
    let resolver = bundled_resolver();
    for name in ["Spa", "SPA", "spa-francorchamps", "Circuit de Spa-Francorchamps"] {
        assert_eq!(resolver.resolve(name, None).relative_path(), Some("spa/gp"), "{name}");
    }
}

#[test]
fn test_bundled_series_hint_picks_layout() {
    let resolver = bundled_resolver();
    assert_eq!(
        resolver.resolve_with_hint_text("Charlotte", Some("NASCAR Cup")).relative_path(),
        Some("charlotte/oval")
    );
    assert_eq!(
        resolver.resolve_with_hint_text("Charlotte", Some("GT3")).relative_path(),
        Some("charlotte/roval")
    );
    assert_eq!(
        resolver.resolve("Indianapolis", Some(TrackCategory::Road)).relative_path(),
        Some("indianapolis/road")
    );
}

#[test]
fn test_bundled_misspelling_resolves_fuzzy() {
    let resolved = bundled_resolver()
        .resolve("Silverstonne Circuit", None)
        .into_resolved()
        .unwrap();
    assert_eq!(resolved.entry_name, "Silverstone Circuit");
    assert!(resolved.confidence < 1.0);
}

#[test]
fn test_bundled_unknown_track_is_unresolved() {
    let resolver = bundled_resolver();
    assert!(resolver.resolve("Zzyzx Proving Ground", None).is_unresolved());
    assert!(resolver.resolve("", None).is_unresolved());
}

// ==================== Catalog File Tests ====================

#[test]
fn test_catalog_override_file_is_used() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("catalog.json");
    std::fs::write(
        &path,
        r#"{"entries": [{"name": "Lime Rock Park", "aliases": ["Lime Rock"], "category": "road",
            "subConfigs": [{"name": "full", "path": "limerock/full"}]}]}"#,
    )
    .unwrap();

    let catalog = CatalogIndex::load_or_bundled(Some(&path)).unwrap();
    assert_eq!(catalog.len(), 1);

    let resolver = Resolver::new(Arc::new(catalog));
    assert_eq!(resolver.resolve("Lime Rock", None).relative_path(), Some("limerock/full"));
    assert!(resolver.resolve("Spa", None).is_unresolved());
}

#[test]
fn test_catalog_flat_rows_are_grouped_by_location() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("tracks.json");
    std::fs::write(
        &path,
        r#"[
            {"track_name": "Lime Rock Park - Grand Prix", "track_dirpath": "limerock\\gp", "config_name": "Grand Prix"},
            {"track_name": "Lime Rock Park - Chicanes", "track_dirpath": "limerock\\chicanes", "config_name": "Chicanes"}
        ]"#,
    )
    .unwrap();

    let catalog = CatalogIndex::load(&path).unwrap();
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.sub_config_count(), 2);

    let resolved = Resolver::new(Arc::new(catalog))
        .resolve("Lime Rock Park", None)
        .into_resolved()
        .unwrap();
    assert!(resolved.relative_path.starts_with("limerock/"));
}

#[test]
fn test_catalog_duplicate_paths_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("catalog.json");
    std::fs::write(
        &path,
        r#"[
            {"name": "A", "subConfigs": [{"name": "x", "path": "same/path"}]},
            {"name": "B", "subConfigs": [{"name": "y", "path": "SAME\\path"}]}
        ]"#,
    )
    .unwrap();

    let err = CatalogIndex::load(&path).unwrap_err();
    assert!(matches!(err, CatalogError::DuplicatePath { .. }), "got {err:?}");
}

#[test]
fn test_catalog_missing_file_is_io_error() {
    let temp = TempDir::new().unwrap();
    let err = CatalogIndex::load(&temp.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, CatalogError::Io { .. }));
}
