//! HTTP plumbing shared by the bundled providers.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;

use super::{ByteStream, ProviderError};
use crate::user_agent::default_user_agent;

/// Default request timeout in seconds.
pub(super) const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connect timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Builds a client with the crate's user agent and `timeout` per request.
pub(super) fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(timeout)
        .gzip(true)
        .user_agent(default_user_agent())
        .build()
        .map_err(|e| ProviderError::transient(format!("failed to build HTTP client: {e}")))
}

/// Maps a non-success status onto the provider error kinds.
pub(super) fn check_status(
    provider: &str,
    url: &str,
    response: Response,
) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED => Err(ProviderError::auth(
            provider,
            "authentication failed: invalid or expired credentials",
        )),
        StatusCode::FORBIDDEN => Err(ProviderError::auth(
            provider,
            "access forbidden: insufficient permissions",
        )),
        StatusCode::NOT_FOUND => Err(ProviderError::NotFound {
            url: url.to_string(),
        }),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            Err(ProviderError::RateLimited {
                url: url.to_string(),
                retry_after,
            })
        }
        other => Err(ProviderError::http_status(url, other.as_u16())),
    }
}

/// Turns a response body into the provider chunk stream.
pub(super) fn body_stream(response: Response, url: &str) -> ByteStream {
    let owned_url = url.to_string();
    response
        .bytes_stream()
        .map(move |chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| ProviderError::network(owned_url.clone(), e))
        })
        .boxed()
}

/// Reads a JSON body, reporting parse failures as invalid responses.
pub(super) async fn read_json(provider: &str, response: Response) -> Result<Value, ProviderError> {
    response
        .json()
        .await
        .map_err(|e| ProviderError::invalid_response(provider, format!("invalid JSON: {e}")))
}

/// A JSON string or integer as text; ids arrive as either.
pub(super) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
