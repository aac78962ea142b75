//! Coach Dave Academy (Delta) provider.
//!
//! The catalog is a single JSON document nested car → track → series →
//! weekly entries. Every entry installs as a ZIP of flat
//! `"<car> @ <track> <type>.sto"` files. Requests carry the site's session
//! cookie and its CSRF header.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::COOKIE;
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::archive::{FlatCarRule, car_folder_from_flat_name, creator_filename, split_member};
use super::http::{self, DEFAULT_TIMEOUT_SECS, scalar_text};
use super::{
    AcquirableItem, FetchHandle, FetchedAsset, MemberPlacement, Packaging, Provider, ProviderError,
};
use crate::naming::slug_to_title;

/// Provider name, also the ledger key prefix.
pub const CDA_PROVIDER_NAME: &str = "cda";

/// Default site root.
pub const CDA_ENDPOINT: &str = "https://delta.coachdaveacademy.com";

const CATALOG_PATH: &str = "/api/driving/iracing/catalog";

const CSRF_HEADER: &str = "x-elle-csrf-token";

/// Prefix of stored filenames.
const CREATOR: &str = "CDA";

static SEASON: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(\d+S\d+)").ok());

static SERIES_TYPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\d+S\d+\s+(.+?)(?:\s+Racing\s+Series)?$").ok());

/// CDA connection settings.
#[derive(Debug, Clone)]
pub struct CdaConfig {
    /// Site root; the catalog and install paths hang off it.
    pub endpoint: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for CdaConfig {
    fn default() -> Self {
        Self {
            endpoint: CDA_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// HTTP client for the CDA catalog and installer.
#[derive(Debug, Clone)]
pub struct CdaProvider {
    client: Client,
    cookie: String,
    csrf_token: String,
    endpoint: String,
}

impl CdaProvider {
    /// Creates a provider for a browser session.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Auth`] unless both values are present and
    /// [`ProviderError::Transient`] if the HTTP client cannot be built.
    pub fn new(session_id: &str, csrf_token: &str, config: CdaConfig) -> Result<Self, ProviderError> {
        let session_id = session_id.trim();
        let csrf_token = csrf_token.trim();
        if session_id.is_empty() || csrf_token.is_empty() {
            return Err(ProviderError::auth(
                CDA_PROVIDER_NAME,
                "session id and CSRF token are both required",
            ));
        }

        Ok(Self {
            client: http::build_client(config.timeout)?,
            cookie: format!("PHPSESSID={session_id}"),
            csrf_token: csrf_token.to_string(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, url: &str) -> Result<Response, ProviderError> {
        let response = self
            .client
            .get(url)
            .header(COOKIE, &self.cookie)
            .header(CSRF_HEADER, &self.csrf_token)
            .send()
            .await
            .map_err(|e| ProviderError::network(url, e))?;

        http::check_status(CDA_PROVIDER_NAME, url, response)
    }

    fn install_url(&self, series: &str, bundle: &str, week: &str) -> String {
        format!("{}/iracing/install/{series}/{bundle}/{week}/setups/zip", self.endpoint)
    }

    fn entry_item(&self, car_slug: &str, track_slug: &str, entry: &Value) -> Option<AcquirableItem> {
        let series = entry.get("series").and_then(scalar_text)?;
        let bundle = entry.get("bundle").and_then(scalar_text)?;
        let week = entry.get("week").and_then(scalar_text)?;
        let series_name = entry
            .get("seriesName")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let season = capture(&SEASON, series_name);
        let series_type = capture(&SERIES_TYPE, series_name);
        let revision = season
            .as_deref()
            .map_or_else(|| format!("W{week}"), |s| format!("{s} W{week}"));

        Some(AcquirableItem {
            provider: CDA_PROVIDER_NAME.to_string(),
            id: format!("{series}/{bundle}/{week}"),
            subject: slug_to_title(car_slug),
            location: slug_to_title(track_slug),
            category_hint: series_type.clone(),
            revision,
            series: series_type,
            season,
            handle: FetchHandle::new(self.install_url(&series, &bundle, &week)),
        })
    }
}

fn capture(pattern: &LazyLock<Option<Regex>>, text: &str) -> Option<String> {
    pattern
        .as_ref()
        .and_then(|re| re.captures(text))
        .map(|caps| caps[1].trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Object members of `value`. An empty PHP array arrives as `[]`, which
/// yields nothing.
fn members(value: &Value) -> impl Iterator<Item = (&String, &Value)> {
    value.as_object().into_iter().flat_map(|map| map.iter())
}

#[async_trait]
impl Provider for CdaProvider {
    fn name(&self) -> &str {
        CDA_PROVIDER_NAME
    }

    #[instrument(skip(self), fields(provider = CDA_PROVIDER_NAME))]
    async fn list(&self) -> Result<Vec<AcquirableItem>, ProviderError> {
        let url = format!("{}{CATALOG_PATH}", self.endpoint);
        let body = http::read_json(CDA_PROVIDER_NAME, self.get(&url).await?).await?;

        let code = body.get("code").and_then(Value::as_i64);
        if code != Some(200) {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unexpected catalog response");
            return Err(ProviderError::invalid_response(
                CDA_PROVIDER_NAME,
                format!("catalog returned code {}: {message}", code.unwrap_or_default()),
            ));
        }
        let Some(data) = body.get("data") else {
            return Ok(Vec::new());
        };

        let mut items = Vec::new();
        let mut seen = HashSet::new();
        for (car_slug, tracks) in members(data) {
            for (track_slug, series) in members(tracks) {
                for (series_name, entries) in members(series) {
                    let Some(entries) = entries.as_array() else {
                        debug!(car = %car_slug, track = %track_slug, series = %series_name, "no weekly entries");
                        continue;
                    };
                    for entry in entries {
                        match self.entry_item(car_slug, track_slug, entry) {
                            Some(item) if seen.insert(item.id.clone()) => items.push(item),
                            Some(_) => {}
                            None => warn!(car = %car_slug, track = %track_slug, "Skipping incomplete CDA catalog entry"),
                        }
                    }
                }
            }
        }

        info!(count = items.len(), "Fetched CDA catalog");
        Ok(items)
    }

    #[instrument(skip(self, item), fields(item_id = %item.id))]
    async fn fetch(&self, item: &AcquirableItem) -> Result<FetchedAsset, ProviderError> {
        let url = item.handle.as_str();
        let response = self.get(url).await?;
        Ok(FetchedAsset {
            suggested_filename: format!("{}.zip", item.id.replace('/', "-")),
            content_length: response.content_length(),
            packaging: Packaging::Zip,
            body: http::body_stream(response, url),
        })
    }

    /// The car comes from the member's own name (`"porsche 992 @ spa Race.sto"`
    /// → `porsche992`); members without one are skipped.
    fn place_member(&self, item: &AcquirableItem, member: &str) -> Option<MemberPlacement> {
        let (_, file_name) = split_member(member);
        let subject = car_folder_from_flat_name(file_name, FlatCarRule::Joined)?;
        Some(MemberPlacement {
            subject,
            filename: creator_filename(CREATOR, item, file_name),
        })
    }
}
