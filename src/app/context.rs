//! Shared runtime context built once at startup.

use std::sync::Arc;

use anyhow::{Context, Result};
use setup_downloader_core::{CatalogIndex, Resolver};
use tracing::debug;

use crate::app::config_runtime::Settings;

/// Holds what every command needs so handlers take `ctx` instead of many
/// arguments. Nothing here is global; commands receive it explicitly.
pub(crate) struct RunContext {
    pub(crate) settings: Settings,
    pub(crate) resolver: Arc<Resolver>,
    pub(crate) quiet: bool,
    /// Whether long runs may draw a spinner on stderr.
    pub(crate) spinner: bool,
}

impl RunContext {
    /// Loads the catalog (override or bundled) and builds the resolver.
    pub(crate) fn build(settings: Settings, quiet: bool, spinner: bool) -> Result<Self> {
        let catalog = CatalogIndex::load_or_bundled(settings.catalog_path.as_deref())
            .context("failed to load track catalog")?;
        debug!(entries = catalog.len(), "catalog loaded");
        Ok(Self {
            resolver: Arc::new(Resolver::new(Arc::new(catalog))),
            settings,
            quiet,
            spinner,
        })
    }
}
