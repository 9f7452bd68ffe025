//! Source adapters
//!
//! Each adapter wraps one external source behind a uniform `resolve` call and
//! reports ordinary failures through `SourceError` instead of aborting the
//! pipeline. Every adapter awaits the shared rate limiter before each network
//! call it makes.
//!
//! | Adapter               | Role     | Input                 | Output             |
//! |-----------------------|----------|-----------------------|--------------------|
//! | `MamScraper`          | scrape   | MAM torrent page URL  | `SourceIdentifier` |
//! | `AudnexClient`        | primary  | `SourceIdentifier`    | `ProviderPayload`  |
//! | `AudibleSearchClient` | fallback | `SearchQuery`         | `ProviderPayload`  |

pub mod audible_client;
pub mod audnex_client;
pub mod mam_scraper;
pub mod title_parser;

pub use audible_client::{AudibleProduct, AudibleSearchClient};
pub use audnex_client::{AudnexBook, AudnexClient};
pub use mam_scraper::MamScraper;
pub use title_parser::{parse_release_name, parse_request, ParsedName};

use crate::types::{SourceError, SourceIdentifier, SourceKind, SourceResult};
use async_trait::async_trait;
use std::time::Duration;

/// User-Agent sent to every external source
pub const USER_AGENT: &str = concat!("abr-meta/", env!("CARGO_PKG_VERSION"));

/// Provider-shaped data, not yet normalized
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderPayload {
    Audnex(AudnexBook),
    Audible(AudibleProduct),
}

impl ProviderPayload {
    /// Role of the source that produced this payload
    pub fn source_kind(&self) -> SourceKind {
        match self {
            ProviderPayload::Audnex(_) => SourceKind::Primary,
            ProviderPayload::Audible(_) => SourceKind::Fallback,
        }
    }
}

/// Text search input for the fallback adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub title: String,
    pub author: Option<String>,
}

impl From<&ParsedName> for SearchQuery {
    fn from(parsed: &ParsedName) -> Self {
        Self {
            title: parsed.title.clone(),
            author: parsed.author.clone(),
        }
    }
}

/// Extracts a catalog identifier from a scraped page
#[async_trait]
pub trait IdentifierScraper: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, source_url: &str) -> SourceResult<SourceIdentifier>;
}

/// Looks up rich metadata by identifier
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, identifier: &SourceIdentifier) -> SourceResult<ProviderPayload>;
}

/// Finds the best single match for a title/author query
#[async_trait]
pub trait MetadataSearch: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, query: &SearchQuery) -> SourceResult<ProviderPayload>;
}

/// Build the HTTP client an adapter uses
pub(crate) fn build_http_client(timeout: Duration) -> SourceResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| SourceError::Misconfigured(format!("HTTP client build failed: {}", e)))
}

/// Map a non-success HTTP status onto the failure taxonomy
pub(crate) fn classify_status(source: SourceKind, status: reqwest::StatusCode, what: &str) -> SourceError {
    match status.as_u16() {
        404 => SourceError::NotFound(format!("{} returned 404 for {}", source, what)),
        401 | 403 => SourceError::NotAuthenticated(format!("{} returned {} for {}", source, status, what)),
        _ => SourceError::Unavailable(format!("{} returned {} for {}", source, status, what)),
    }
}

/// Trim a configured base URL so paths can be appended with '/'
pub(crate) fn trim_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}
