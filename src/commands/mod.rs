//! CLI command handlers.

mod config;
mod download;
mod list;
mod organize;
mod resolve;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use setup_downloader_core::provider::{CDA_ENDPOINT, GOFAST_ENDPOINT, TRACKTITAN_API_BASE};
use setup_downloader_core::{
    CdaConfig, CdaProvider, GoFastConfig, GoFastProvider, Provider, TrackTitanConfig,
    TrackTitanProvider,
};
use tracing::debug;

use crate::app::config_runtime::Settings;
use crate::cli::ProviderName;

pub use config::run_config_show_command;
pub use download::run_download_command;
pub use list::run_list_command;
pub use organize::run_organize_command;
pub use resolve::run_resolve_command;

/// Builds the provider named on the command line.
fn build_provider(name: ProviderName, settings: &Settings) -> Result<Arc<dyn Provider>> {
    match name {
        ProviderName::Gofast => {
            let Some(token) = configured(settings.gofast_token.as_deref()) else {
                bail!("GoFast token not configured: pass --token or set GOFAST_TOKEN");
            };
            let endpoint = settings
                .gofast_endpoint
                .clone()
                .unwrap_or_else(|| GOFAST_ENDPOINT.to_string());
            debug!(%endpoint, "creating GoFast provider");
            let provider = GoFastProvider::new(
                token,
                GoFastConfig {
                    endpoint,
                    timeout: settings.timeout,
                },
            )
            .context("failed to create GoFast provider")?;
            Ok(Arc::new(provider))
        }
        ProviderName::Cda => {
            let (Some(session_id), Some(csrf_token)) = (
                configured(settings.cda_session_id.as_deref()),
                configured(settings.cda_csrf_token.as_deref()),
            ) else {
                bail!("CDA session not configured: set CDA_SESSION_ID and CDA_CSRF_TOKEN");
            };
            let endpoint = settings
                .cda_endpoint
                .clone()
                .unwrap_or_else(|| CDA_ENDPOINT.to_string());
            debug!(%endpoint, "creating CDA provider");
            let provider = CdaProvider::new(
                session_id,
                csrf_token,
                CdaConfig {
                    endpoint,
                    timeout: settings.timeout,
                },
            )
            .context("failed to create CDA provider")?;
            Ok(Arc::new(provider))
        }
        ProviderName::Tracktitan => {
            let (Some(access_token), Some(user_id)) = (
                configured(settings.tt_access_token.as_deref()),
                configured(settings.tt_user_id.as_deref()),
            ) else {
                bail!("Track Titan credentials not configured: set TT_ACCESS_TOKEN and TT_USER_ID");
            };
            let api_base = settings
                .tt_endpoint
                .clone()
                .unwrap_or_else(|| TRACKTITAN_API_BASE.to_string());
            debug!(%api_base, "creating Track Titan provider");
            let provider = TrackTitanProvider::new(
                access_token,
                user_id,
                TrackTitanConfig {
                    api_base,
                    timeout: settings.timeout,
                    ..TrackTitanConfig::default()
                },
            )
            .context("failed to create Track Titan provider")?;
            Ok(Arc::new(provider))
        }
    }
}

fn configured(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
