//! Setup providers.
//!
//! The orchestrator depends only on the [`Provider`] capability: list the
//! acquirable items, then fetch one item's bytes. Each remote service is a
//! separate implementation ([`GoFastProvider`], [`CdaProvider`] and
//! [`TrackTitanProvider`] ship with the crate; tests plug in simulated ones).
//!
//! A fetched body is either one setup file or a ZIP bundle
//! ([`Packaging`]). Bundles are unpacked by the engine, which asks the
//! provider where each `.sto` member goes ([`Provider::place_member`]).
//!
//! Providers must report failures with distinguishable kinds so retry
//! decisions can be made: authentication, not found, rate limiting, and
//! transient network trouble are separate [`ProviderError`] variants.

pub mod archive;
mod cda;
mod gofast;
mod http;
mod tracktitan;

pub use cda::{CDA_ENDPOINT, CDA_PROVIDER_NAME, CdaConfig, CdaProvider};
pub use gofast::{GOFAST_ENDPOINT, GOFAST_PROVIDER_NAME, GoFastConfig, GoFastProvider};
pub use tracktitan::{
    TRACKTITAN_API_BASE, TRACKTITAN_PROVIDER_NAME, TrackTitanConfig, TrackTitanProvider,
};

use std::fmt;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use thiserror::Error;

/// Opaque per-item value only the owning provider interprets (e.g. a URL).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct FetchHandle(String);

impl FetchHandle {
    /// Wraps a provider-specific handle.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw handle.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FetchHandle {
    // Handles can embed signed URLs; keep them out of logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FetchHandle(..)")
    }
}

/// One asset a provider offers.
///
/// `(provider, id)` is unique within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquirableItem {
    /// Provider name (ledger key prefix).
    pub provider: String,
    /// Provider-scoped item id.
    pub id: String,
    /// Subject the asset belongs to (the car); becomes the top-level folder.
    pub subject: String,
    /// Free-text location name, resolved against the catalog.
    pub location: String,
    /// Free-text category hint (`GT3`, `oval`, ...).
    pub category_hint: Option<String>,
    /// Source revision marker (timestamp or version token).
    pub revision: String,
    /// Series name, used for filenames.
    pub series: Option<String>,
    /// Season token, used for filenames.
    pub season: Option<String>,
    /// Provider-private fetch handle.
    pub handle: FetchHandle,
}

/// Stream of body chunks.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ProviderError>>;

/// How a fetched body is packaged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Packaging {
    /// The body is one setup file.
    #[default]
    Plain,
    /// The body is a ZIP archive; every safe `.sto` member is stored separately.
    Zip,
}

/// Where one archive member is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberPlacement {
    /// Top-level folder (the car), replacing the item's subject.
    pub subject: String,
    /// Filename to store the member under.
    pub filename: String,
}

/// A fetched asset: its suggested filename and a body stream.
pub struct FetchedAsset {
    /// Filename to store a plain asset under (sanitised by the caller).
    pub suggested_filename: String,
    /// Declared body length, when known.
    pub content_length: Option<u64>,
    /// Whether the body is a setup file or a bundle of them.
    pub packaging: Packaging,
    /// Body chunks.
    pub body: ByteStream,
}

impl FetchedAsset {
    /// Wraps an in-memory body.
    #[must_use]
    pub fn from_bytes(suggested_filename: impl Into<String>, data: Vec<u8>) -> Self {
        let length = u64::try_from(data.len()).ok();
        Self {
            suggested_filename: suggested_filename.into(),
            content_length: length,
            packaging: Packaging::Plain,
            body: stream::once(async move { Ok(data) }).boxed(),
        }
    }

    /// Marks the body as a ZIP bundle.
    #[must_use]
    pub fn zipped(mut self) -> Self {
        self.packaging = Packaging::Zip;
        self
    }
}

impl fmt::Debug for FetchedAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedAsset")
            .field("suggested_filename", &self.suggested_filename)
            .field("content_length", &self.content_length)
            .field("packaging", &self.packaging)
            .finish_non_exhaustive()
    }
}

/// Capability every provider implements.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider name, used as the ledger key prefix.
    fn name(&self) -> &str;

    /// Lists every item currently offered.
    async fn list(&self) -> Result<Vec<AcquirableItem>, ProviderError>;

    /// Fetches one item's bytes.
    async fn fetch(&self, item: &AcquirableItem) -> Result<FetchedAsset, ProviderError>;

    /// Decides where one `.sto` member of a fetched [`Packaging::Zip`] body
    /// goes. `member` uses `/` separators and has already passed the
    /// path-safety check. `None` skips the member.
    fn place_member(&self, item: &AcquirableItem, member: &str) -> Option<MemberPlacement> {
        Some(archive::default_placement(item, member))
    }
}

/// Errors reported by providers.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Credentials missing, invalid, or insufficient.
    #[error("[AUTH] {provider}: {message}")]
    Auth {
        /// Provider name.
        provider: String,
        /// What the service said.
        message: String,
    },

    /// The item no longer exists upstream.
    #[error("not found: {url}")]
    NotFound {
        /// Requested URL.
        url: String,
    },

    /// The service asked us to slow down.
    #[error("rate limited by {url}")]
    RateLimited {
        /// Requested URL.
        url: String,
        /// Raw Retry-After header value, if any.
        retry_after: Option<String>,
    },

    /// Any other non-success status.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Requested URL.
        url: String,
        /// Status code.
        status: u16,
    },

    /// Connection-level failure.
    #[error("network error fetching {url}: {source}")]
    Network {
        /// Requested URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The request timed out.
    #[error("timeout fetching {url}")]
    Timeout {
        /// Requested URL.
        url: String,
    },

    /// Temporary failure not tied to an HTTP exchange.
    #[error("transient failure: {message}")]
    Transient {
        /// Description.
        message: String,
    },

    /// The service answered with something we cannot interpret.
    #[error("invalid response from {provider}: {message}")]
    InvalidResponse {
        /// Provider name.
        provider: String,
        /// What was wrong.
        message: String,
    },
}

impl ProviderError {
    /// Creates an authentication error.
    pub fn auth(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Auth {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Maps a reqwest error, separating timeouts.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// Creates a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Creates an invalid-response error.
    pub fn invalid_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Returns true for authentication failures.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}
