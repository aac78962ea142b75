//! Track Titan provider.
//!
//! Setups are listed page by page (twelve per page) from the services API
//! and each downloads as a ZIP. Members usually sit under the car folder;
//! flat members carry the car as the first word of their name.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::archive::{FlatCarRule, car_folder_from_flat_name, creator_filename, split_member};
use super::http::{self, DEFAULT_TIMEOUT_SECS, scalar_text};
use super::{
    AcquirableItem, FetchHandle, FetchedAsset, MemberPlacement, Packaging, Provider, ProviderError,
};
use crate::download::Pacer;
use crate::naming::slug_to_title;

/// Provider name, also the ledger key prefix.
pub const TRACKTITAN_PROVIDER_NAME: &str = "tracktitan";

/// Default services API root.
pub const TRACKTITAN_API_BASE: &str = "https://services.tracktitan.io";

const SETUPS_PATH: &str = "/api/v2/games/iRacing/setups";

const PAGE_SIZE: usize = 12;

/// Stops a listing that never returns a short page.
const MAX_PAGES: u32 = 500;

/// Prefix of stored filenames.
const CREATOR: &str = "TT";

/// Series names shortened in filenames, matched by case-insensitive
/// containment. Longer names come first so they win over their prefixes.
const SERIES_ABBREVIATIONS: &[(&str, &str)] = &[
    ("Super Formula Lights", "SFL"),
    ("Super Formula", "SF"),
    ("Production Car Challenge", "PCC"),
    ("Falken Tyre Sports Car Challenge", "FTSC"),
    ("GT Sprint Series", "GTS"),
    ("INDYCAR Series", "INDYCAR"),
    ("IMSA", "IMSA"),
    ("Formula C", "FC"),
    ("Formula B", "FB"),
];

/// Track Titan connection settings.
#[derive(Debug, Clone)]
pub struct TrackTitanConfig {
    /// API root.
    pub api_base: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Shortest pause between listing pages.
    pub min_page_delay: Duration,
    /// Longest pause between listing pages.
    pub max_page_delay: Duration,
}

impl Default for TrackTitanConfig {
    fn default() -> Self {
        Self {
            api_base: TRACKTITAN_API_BASE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            min_page_delay: Duration::from_secs(1),
            max_page_delay: Duration::from_secs(3),
        }
    }
}

/// HTTP client for the Track Titan API.
#[derive(Debug, Clone)]
pub struct TrackTitanProvider {
    client: Client,
    access_token: String,
    user_id: String,
    api_base: String,
    page_pacer: Pacer,
}

impl TrackTitanProvider {
    /// Creates a provider for an access token and user id.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Auth`] unless both values are present and
    /// [`ProviderError::Transient`] if the HTTP client cannot be built.
    pub fn new(
        access_token: &str,
        user_id: &str,
        config: TrackTitanConfig,
    ) -> Result<Self, ProviderError> {
        let access_token = access_token.trim();
        let user_id = user_id.trim();
        if access_token.is_empty() || user_id.is_empty() {
            return Err(ProviderError::auth(
                TRACKTITAN_PROVIDER_NAME,
                "access token and user id are both required",
            ));
        }

        Ok(Self {
            client: http::build_client(config.timeout)?,
            access_token: access_token.to_string(),
            user_id: user_id.to_string(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            page_pacer: Pacer::new(config.min_page_delay, config.max_page_delay),
        })
    }

    async fn get(&self, url: &str) -> Result<Response, ProviderError> {
        // The token goes out raw, without a Bearer prefix.
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, &self.access_token)
            .header("x-consumer-id", "trackTitan")
            .header("x-user-device", "desktop")
            .header("x-user-id", &self.user_id)
            .send()
            .await
            .map_err(|e| ProviderError::network(url, e))?;

        http::check_status(TRACKTITAN_PROVIDER_NAME, url, response)
    }

    fn download_url(&self, id: &str) -> String {
        format!("{}{SETUPS_PATH}/{id}/download", self.api_base)
    }

    fn setup_item(&self, setup: &Value) -> Option<AcquirableItem> {
        let id = setup.get("id").and_then(scalar_text)?;
        let config = setup.get("config")?.as_array()?.first()?;
        let combo = setup
            .get("setupCombos")
            .and_then(Value::as_array)
            .and_then(|combos| combos.first());

        let subject = combo_name(combo, "car")
            .or_else(|| text(config, "carId").map(|slug| slug_to_title(&slug)))?;
        let location = combo_name(combo, "track")
            .or_else(|| text(config, "trackId").map(|slug| slug_to_title(&slug)))?;

        let season = setup.get("period").and_then(period_token);
        let series = setup
            .get("hymoSeries")
            .and_then(|s| text(s, "seriesName"))
            .map(|name| abbreviate_series(&name));
        let revision = setup
            .get("lastUpdatedAt")
            .and_then(scalar_text)
            .or_else(|| season.clone())
            .unwrap_or_default();

        Some(AcquirableItem {
            provider: TRACKTITAN_PROVIDER_NAME.to_string(),
            handle: FetchHandle::new(self.download_url(&id)),
            id,
            subject,
            location,
            category_hint: None,
            revision,
            series,
            season,
        })
    }
}

fn text(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn combo_name(combo: Option<&Value>, part: &str) -> Option<String> {
    combo.and_then(|c| c.get(part)).and_then(|p| text(p, "name"))
}

/// `{season: 1, week: 8, year: 2026}` → `26S1W8`.
fn period_token(period: &Value) -> Option<String> {
    let season = period.get("season").and_then(Value::as_u64)?;
    let week = period.get("week").and_then(Value::as_u64)?;
    let year = period.get("year").and_then(Value::as_u64)?;
    Some(format!("{:02}S{season}W{week}", year % 100))
}

fn abbreviate_series(name: &str) -> String {
    let lowered = name.to_lowercase();
    SERIES_ABBREVIATIONS
        .iter()
        .find(|(full, _)| lowered.contains(&full.to_lowercase()))
        .map_or_else(|| name.to_string(), |(_, short)| (*short).to_string())
}

#[async_trait]
impl Provider for TrackTitanProvider {
    fn name(&self) -> &str {
        TRACKTITAN_PROVIDER_NAME
    }

    #[instrument(skip(self), fields(provider = TRACKTITAN_PROVIDER_NAME))]
    async fn list(&self) -> Result<Vec<AcquirableItem>, ProviderError> {
        let mut items = Vec::new();
        let mut seen = HashSet::new();

        for page in 1..=MAX_PAGES {
            let url = format!("{}{SETUPS_PATH}?page={page}&limit={PAGE_SIZE}", self.api_base);
            let body = http::read_json(TRACKTITAN_PROVIDER_NAME, self.get(&url).await?).await?;

            if body.get("success").and_then(Value::as_bool) != Some(true) {
                return Err(ProviderError::invalid_response(
                    TRACKTITAN_PROVIDER_NAME,
                    format!("page {page} was not successful"),
                ));
            }
            let setups = body
                .pointer("/data/setups")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();

            for setup in setups {
                match self.setup_item(setup) {
                    Some(item) if seen.insert(item.id.clone()) => items.push(item),
                    Some(_) => {}
                    None => warn!(page, "Skipping Track Titan setup without id or car config"),
                }
            }

            debug!(page, count = setups.len(), "fetched setups page");
            if setups.len() < PAGE_SIZE {
                break;
            }
            self.page_pacer.pause().await;
        }

        info!(count = items.len(), "Fetched Track Titan setups");
        Ok(items)
    }

    #[instrument(skip(self, item), fields(item_id = %item.id))]
    async fn fetch(&self, item: &AcquirableItem) -> Result<FetchedAsset, ProviderError> {
        let url = item.handle.as_str();
        let response = self.get(url).await?;
        Ok(FetchedAsset {
            suggested_filename: format!("{}.zip", item.id),
            content_length: response.content_length(),
            packaging: Packaging::Zip,
            body: http::body_stream(response, url),
        })
    }

    /// Nested members keep their archive folder; flat ones take the first
    /// word before `" @ "`. Anything else is skipped.
    fn place_member(&self, item: &AcquirableItem, member: &str) -> Option<MemberPlacement> {
        let (folder, file_name) = split_member(member);
        let subject = match folder {
            Some(folder) => folder.to_string(),
            None => car_folder_from_flat_name(file_name, FlatCarRule::FirstWord)?,
        };
        Some(MemberPlacement {
            subject,
            filename: creator_filename(CREATOR, item, file_name),
        })
    }
}
