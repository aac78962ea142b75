//! GoFast subscription provider.
//!
//! Lists the subscriber's manual-install records and fetches each setup
//! bundle over HTTPS with a bearer token. Bundles are ZIP archives whose
//! members sit under the iRacing car folder they belong to.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{AUTHORIZATION, CONTENT_DISPOSITION};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::archive::split_member;
use super::http::{self, DEFAULT_TIMEOUT_SECS};
use super::{
    AcquirableItem, FetchHandle, FetchedAsset, MemberPlacement, Packaging, Provider, ProviderError,
};
use crate::download::{filename_from_url, parse_content_disposition};
use crate::naming::{build_gofast_filename, setup_type_from_filename};

/// Provider name, also the ledger key prefix.
pub const GOFAST_PROVIDER_NAME: &str = "gofast";

/// Default listing endpoint.
pub const GOFAST_ENDPOINT: &str = "https://go-fast.gg:5002/api/subscription/manualinstall";

/// Only records for iRacing carry this prefix.
const IRACING_PREFIX: &str = "IR - ";

static DOWNLOAD_NAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^IR\s+-\s+V\d+\s+-\s+(.+?)\s+-\s+(.+)$").ok());

/// GoFast connection settings.
#[derive(Debug, Clone)]
pub struct GoFastConfig {
    /// Listing endpoint.
    pub endpoint: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for GoFastConfig {
    fn default() -> Self {
        Self {
            endpoint: GOFAST_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// HTTP client for the GoFast API.
#[derive(Debug, Clone)]
pub struct GoFastProvider {
    client: Client,
    authorization: String,
    endpoint: String,
}

impl GoFastProvider {
    /// Creates a provider for `token`. A missing `Bearer ` prefix is added.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Auth`] for an empty token and
    /// [`ProviderError::Transient`] if the HTTP client cannot be built.
    pub fn new(token: &str, config: GoFastConfig) -> Result<Self, ProviderError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ProviderError::auth(GOFAST_PROVIDER_NAME, "no API token configured"));
        }

        let authorization = if token.starts_with("Bearer ") {
            token.to_string()
        } else {
            format!("Bearer {token}")
        };

        let client = http::build_client(config.timeout)?;

        Ok(Self {
            client,
            authorization,
            endpoint: config.endpoint,
        })
    }

    async fn get(&self, url: &str) -> Result<Response, ProviderError> {
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, &self.authorization)
            .send()
            .await
            .map_err(|e| ProviderError::network(url, e))?;

        http::check_status(GOFAST_PROVIDER_NAME, url, response)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordId {
    Number(i64),
    Text(String),
}

impl RecordId {
    fn into_string(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoFastRecord {
    id: RecordId,
    download_name: String,
    download_url: String,
    #[serde(default)]
    creation_date: Option<String>,
    #[serde(default)]
    updated_date: Option<String>,
    #[serde(default)]
    ver: Option<String>,
    #[serde(default)]
    setup_ver: Option<String>,
    #[serde(default)]
    cat: Option<String>,
    #[serde(default)]
    series: Option<String>,
}

impl GoFastRecord {
    fn into_item(self) -> Option<AcquirableItem> {
        let (subject, location) = split_download_name(&self.download_name)?;
        let revision = [self.updated_date, self.creation_date, self.setup_ver]
            .into_iter()
            .flatten()
            .find(|value| !value.trim().is_empty())
            .unwrap_or_default();

        Some(AcquirableItem {
            provider: GOFAST_PROVIDER_NAME.to_string(),
            id: self.id.into_string(),
            subject,
            location,
            category_hint: self.cat.filter(|c| !c.trim().is_empty()),
            revision,
            series: self.series.filter(|s| !s.trim().is_empty()),
            season: self
                .ver
                .map(|v| v.replace(' ', ""))
                .filter(|v| !v.is_empty()),
            handle: FetchHandle::new(self.download_url),
        })
    }
}

/// Splits `"IR - V1 - <car> - <track>"` into `(car, track)`.
///
/// Hyphens inside the track survive (`"Spa - GP"` stays intact).
fn split_download_name(download_name: &str) -> Option<(String, String)> {
    let trimmed = download_name.trim();
    if let Some(caps) = DOWNLOAD_NAME_PATTERN
        .as_ref()
        .and_then(|re| re.captures(trimmed))
    {
        return Some((caps[1].trim().to_string(), caps[2].trim().to_string()));
    }

    for separator in [" - ", "-"] {
        let parts: Vec<&str> = trimmed.split(separator).map(str::trim).collect();
        if parts.len() >= 4 && !parts[2].is_empty() {
            return Some((parts[2].to_string(), parts[3..].join(separator)));
        }
    }

    None
}

fn extract_records(body: Value) -> Result<Vec<Value>, ProviderError> {
    match body {
        Value::Object(mut map) => {
            let ok = map.get("status").is_some_and(|status| match status {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_i64() != Some(0),
                Value::String(s) => !s.is_empty(),
                _ => false,
            });
            if !ok {
                let msg = map
                    .get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                return Err(ProviderError::invalid_response(
                    GOFAST_PROVIDER_NAME,
                    format!("API returned error: {msg}"),
                ));
            }
            match map.remove("data").and_then(|mut data| data.get_mut("records").map(Value::take)) {
                Some(Value::Array(records)) => Ok(records),
                Some(_) => Err(ProviderError::invalid_response(
                    GOFAST_PROVIDER_NAME,
                    "records is not an array",
                )),
                None => Ok(Vec::new()),
            }
        }
        Value::Array(records) => Ok(records),
        other => Err(ProviderError::invalid_response(
            GOFAST_PROVIDER_NAME,
            format!("unexpected response shape: {}", value_kind(&other)),
        )),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl Provider for GoFastProvider {
    fn name(&self) -> &str {
        GOFAST_PROVIDER_NAME
    }

    #[instrument(skip(self), fields(provider = GOFAST_PROVIDER_NAME))]
    async fn list(&self) -> Result<Vec<AcquirableItem>, ProviderError> {
        let response = self.get(&self.endpoint).await?;
        let body = http::read_json(GOFAST_PROVIDER_NAME, response).await?;

        let mut items = Vec::new();
        let mut other_sims = 0usize;
        for raw in extract_records(body)? {
            let is_iracing = raw
                .get("download_name")
                .and_then(Value::as_str)
                .is_some_and(|name| name.starts_with(IRACING_PREFIX));
            if !is_iracing {
                other_sims += 1;
                continue;
            }

            let record = match serde_json::from_value::<GoFastRecord>(raw) {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed GoFast record");
                    continue;
                }
            };
            let name = record.download_name.clone();
            match record.into_item() {
                Some(item) => items.push(item),
                None => warn!(download_name = %name, "Could not parse car and track, skipping"),
            }
        }

        if other_sims > 0 {
            info!(skipped = other_sims, "Skipped non-iRacing setups");
        }
        info!(count = items.len(), "Fetched GoFast setup list");
        Ok(items)
    }

    #[instrument(skip(self, item), fields(item_id = %item.id))]
    async fn fetch(&self, item: &AcquirableItem) -> Result<FetchedAsset, ProviderError> {
        let url = item.handle.as_str();
        let response = self.get(url).await?;

        let archive_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_disposition)
            .or_else(|| filename_from_url(url))
            .unwrap_or_else(|| format!("{}.zip", item.id));
        debug!(archive = %archive_name, "Fetching setup bundle");

        Ok(FetchedAsset {
            suggested_filename: archive_name,
            content_length: response.content_length(),
            packaging: Packaging::Zip,
            body: http::body_stream(response, url),
        })
    }

    /// Members keep the car folder they sit under; root-level members fall
    /// back to the listing's car. The stored name follows the GoFast
    /// convention with the setup type taken from the member's own name.
    fn place_member(&self, item: &AcquirableItem, member: &str) -> Option<MemberPlacement> {
        let (folder, file_name) = split_member(member);
        let setup_type = setup_type_from_filename(file_name).unwrap_or_default();
        Some(MemberPlacement {
            subject: folder.map_or_else(|| item.subject.clone(), str::to_string),
            filename: build_gofast_filename(
                item.series.as_deref().unwrap_or_default(),
                item.season.as_deref().unwrap_or_default(),
                &item.location,
                &setup_type,
            ),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::StreamExt;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::provider::archive::zip_bytes;

    fn provider_for(server: &MockServer) -> GoFastProvider {
        let config = GoFastConfig {
            endpoint: format!("{}/api/list", server.uri()),
            timeout: Duration::from_secs(5),
        };
        GoFastProvider::new("secret", config).unwrap()
    }

    fn record(id: i64, name: &str, url: &str) -> Value {
        serde_json::json!({
            "id": id,
            "download_name": name,
            "download_url": url,
            "creation_date": "2026-01-01T00:00:00Z",
            "updated_date": "2026-01-05T10:00:00Z",
            "ver": "26 S1 W3",
            "setup_ver": "1.0",
            "changelog": "",
            "cat": "GTP",
            "series": "IMSA",
        })
    }

    // ==================== Name Parsing Tests ====================

    #[test]
    fn test_split_download_name_standard() {
        let (car, track) = split_download_name("IR - V1 - Porsche 963 GTP - Spa Francorchamps").unwrap();
        assert_eq!(car, "Porsche 963 GTP");
        assert_eq!(track, "Spa Francorchamps");
    }

    #[test]
    fn test_split_download_name_keeps_track_hyphens() {
        let (car, track) = split_download_name("IR - V2 - Ferrari 296 GT3 - Road America - Full").unwrap();
        assert_eq!(car, "Ferrari 296 GT3");
        assert_eq!(track, "Road America - Full");
    }

    #[test]
    fn test_split_download_name_bare_hyphen_fallback() {
        let (car, track) = split_download_name("IR-Vx-Mazda MX5-Okayama").unwrap();
        assert_eq!(car, "Mazda MX5");
        assert_eq!(track, "Okayama");
        assert!(split_download_name("IR - Spa").is_none());
    }

    #[test]
    fn test_new_adds_bearer_prefix_and_rejects_empty() {
        let provider = GoFastProvider::new("abc", GoFastConfig::default()).unwrap();
        assert_eq!(provider.authorization, "Bearer abc");
        let provider = GoFastProvider::new("Bearer abc", GoFastConfig::default()).unwrap();
        assert_eq!(provider.authorization, "Bearer abc");
        assert!(GoFastProvider::new("  ", GoFastConfig::default()).unwrap_err().is_auth());
    }

    // ==================== Listing Tests ====================

    #[tokio::test]
    async fn test_list_filters_other_sims_and_maps_fields() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "status": true,
            "msg": "ok",
            "data": {"records": [
                record(7, "IR - V1 - Porsche 963 GTP - Spa Francorchamps", "https://cdn/x.sto"),
                record(8, "AMS2 - V1 - Some Car - Interlagos", "https://cdn/y.sto"),
            ]}
        });
        Mock::given(method("GET"))
            .and(path("/api/list"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let items = provider_for(&server).list().await.unwrap();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.id, "7");
        assert_eq!(item.provider, "gofast");
        assert_eq!(item.subject, "Porsche 963 GTP");
        assert_eq!(item.location, "Spa Francorchamps");
        assert_eq!(item.category_hint.as_deref(), Some("GTP"));
        assert_eq!(item.revision, "2026-01-05T10:00:00Z");
        assert_eq!(item.season.as_deref(), Some("26S1W3"));
    }

    #[tokio::test]
    async fn test_list_accepts_bare_array() {
        let server = MockServer::start().await;
        let body = serde_json::json!([record(1, "IR - V1 - Dallara IR18 - Indianapolis", "u")]);
        Mock::given(method("GET"))
            .and(path("/api/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let items = provider_for(&server).list().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].location, "Indianapolis");
    }

    #[tokio::test]
    async fn test_list_status_false_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/list"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": false, "msg": "subscription expired"})),
            )
            .mount(&server)
            .await;

        let err = provider_for(&server).list().await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse { .. }));
        assert!(err.to_string().contains("subscription expired"));
    }

    #[tokio::test]
    async fn test_list_unauthorized_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = provider_for(&server).list().await.unwrap_err();
        assert!(err.is_auth());
    }

    // ==================== Fetch Tests ====================

    fn item_at(server: &MockServer, p: &str) -> AcquirableItem {
        AcquirableItem {
            provider: GOFAST_PROVIDER_NAME.to_string(),
            id: p.to_string(),
            subject: "Porsche 963 GTP".to_string(),
            location: "Spa Francorchamps".to_string(),
            category_hint: None,
            revision: "2026-01-05T10:00:00Z".to_string(),
            series: Some("IMSA".to_string()),
            season: Some("26S1W3".to_string()),
            handle: FetchHandle::new(format!("{}/{p}", server.uri())),
        }
    }

    #[tokio::test]
    async fn test_fetch_streams_zip_bundle() {
        let server = MockServer::start().await;
        let bundle = zip_bytes(&[("porsche963gtp/GO 26S1 963 Spa Race.sto", b"race")]);
        Mock::given(method("GET"))
            .and(path("/files/7"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-disposition", r#"attachment; filename="963 Spa.zip""#)
                    .set_body_bytes(bundle.clone()),
            )
            .mount(&server)
            .await;

        let asset = provider_for(&server)
            .fetch(&item_at(&server, "files/7"))
            .await
            .unwrap();
        assert_eq!(asset.packaging, Packaging::Zip);
        assert_eq!(asset.suggested_filename, "963 Spa.zip");
        let chunks: Vec<_> = asset.body.collect().await;
        let bytes: Vec<u8> = chunks.into_iter().flat_map(Result::unwrap).collect();
        assert_eq!(bytes, bundle);
    }

    // ==================== Member Placement Tests ====================

    #[test]
    fn test_place_member_uses_archive_car_folder_and_member_type() {
        let provider = GoFastProvider::new("abc", GoFastConfig::default()).unwrap();
        let item = AcquirableItem {
            provider: GOFAST_PROVIDER_NAME.to_string(),
            id: "7".to_string(),
            subject: "Porsche 963 GTP".to_string(),
            location: "Spa Francorchamps".to_string(),
            category_hint: None,
            revision: String::new(),
            series: Some("IMSA".to_string()),
            season: Some("26S1W3".to_string()),
            handle: FetchHandle::new("u"),
        };

        let nested = provider
            .place_member(&item, "porsche963gtp/GO 26S1 963 Spa Qualifying.sto")
            .unwrap();
        assert_eq!(nested.subject, "porsche963gtp");
        assert_eq!(nested.filename, "GoFast_IMSA_26S1W3_SpaFrancorchamps_Qualifying.sto");

        let flat = provider.place_member(&item, "GO_Race.sto").unwrap();
        assert_eq!(flat.subject, "Porsche 963 GTP");
        assert_eq!(flat.filename, "GoFast_IMSA_26S1W3_SpaFrancorchamps_Race.sto");
    }

    #[tokio::test]
    async fn test_fetch_maps_status_codes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let at = |p: &str| item_at(&server, p);

        assert!(matches!(
            provider.fetch(&at("gone")).await.unwrap_err(),
            ProviderError::NotFound { .. }
        ));
        match provider.fetch(&at("slow")).await.unwrap_err() {
            ProviderError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after.as_deref(), Some("7"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            provider.fetch(&at("broken")).await.unwrap_err(),
            ProviderError::HttpStatus { status: 503, .. }
        ));
    }
}
