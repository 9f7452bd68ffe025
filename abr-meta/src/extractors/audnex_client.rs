//! Audnex API client (primary metadata source)
//!
//! `GET {base}/books/{asin}?region={region}` returns the Audible catalog
//! record for an ASIN. Responses are returned as-is (`AudnexBook`); mapping
//! onto canonical fields happens in the normalizer.

use super::{build_http_client, classify_status, trim_base_url, MetadataLookup, ProviderPayload};
use crate::rate_limiter::RateLimiter;
use crate::types::{null_as_default, LooseNumber, SourceError, SourceIdentifier, SourceKind, SourceResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Audnex book record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudnexBook {
    pub asin: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub authors: Vec<AudnexPerson>,
    #[serde(deserialize_with = "null_as_default")]
    pub narrators: Vec<AudnexPerson>,
    pub publisher_name: Option<String>,
    /// HTML
    pub summary: Option<String>,
    /// Short plain-text blurb
    pub description: Option<String>,
    pub series_primary: Option<AudnexSeries>,
    pub series_secondary: Option<AudnexSeries>,
    #[serde(deserialize_with = "null_as_default")]
    pub genres: Vec<AudnexGenre>,
    pub runtime_length_min: Option<LooseNumber>,
    pub image: Option<String>,
    pub language: Option<String>,
    pub release_date: Option<String>,
    pub rating: Option<LooseNumber>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudnexPerson {
    pub asin: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudnexSeries {
    pub asin: Option<String>,
    pub name: String,
    pub position: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudnexGenre {
    pub asin: Option<String>,
    pub name: String,
    /// "genre" or "tag"
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Primary adapter: ASIN → Audnex book
pub struct AudnexClient {
    http: reqwest::Client,
    base_url: String,
    region: String,
    rate_limiter: Arc<RateLimiter>,
}

impl AudnexClient {
    pub fn new(
        base_url: &str,
        region: &str,
        timeout: Duration,
        rate_limiter: Arc<RateLimiter>,
    ) -> SourceResult<Self> {
        Ok(Self {
            http: build_http_client(timeout)?,
            base_url: trim_base_url(base_url),
            region: region.to_string(),
            rate_limiter,
        })
    }
}

#[async_trait]
impl MetadataLookup for AudnexClient {
    fn name(&self) -> &'static str {
        "Audnex"
    }

    async fn resolve(&self, identifier: &SourceIdentifier) -> SourceResult<ProviderPayload> {
        self.rate_limiter.await_slot(SourceKind::Primary).await;

        let url = format!("{}/books/{}", self.base_url, identifier);
        debug!(asin = %identifier, url = %url, "Querying Audnex");

        let response = self
            .http
            .get(&url)
            .query(&[("region", self.region.as_str())])
            .send()
            .await
            .map_err(SourceError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(SourceKind::Primary, status, identifier.as_str()));
        }

        let book: AudnexBook = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(format!("Audnex body for {}: {}", identifier, e.without_url())))?;

        if book.title.as_deref().map_or(true, |t| t.trim().is_empty()) {
            return Err(SourceError::Malformed(format!(
                "Audnex record for {} has no title",
                identifier
            )));
        }

        debug!(
            asin = %identifier,
            title = ?book.title,
            author = ?book.authors.first().map(|a| &a.name),
            "Audnex lookup complete"
        );

        Ok(ProviderPayload::Audnex(book))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_audnex_shape() {
        let json = r#"{
            "asin": "B08G9PRS1K",
            "authors": [{"asin": "B00G0WYW92", "name": "Andy Weir"}],
            "narrators": [{"name": "Ray Porter"}],
            "genres": [{"asin": "18580606011", "name": "Science Fiction & Fantasy", "type": "genre"}],
            "publisherName": "Audible Studios",
            "rating": "4.9",
            "releaseDate": "2021-05-04T00:00:00.000Z",
            "runtimeLengthMin": 970,
            "seriesPrimary": {"name": "Hail Mary", "position": "1"},
            "summary": "<p>Ryland Grace is the sole survivor</p>",
            "title": "Project Hail Mary",
            "unknownField": true
        }"#;

        let book: AudnexBook = serde_json::from_str(json).unwrap();
        assert_eq!(book.title.as_deref(), Some("Project Hail Mary"));
        assert_eq!(book.authors[0].name, "Andy Weir");
        assert_eq!(book.rating.as_ref().and_then(LooseNumber::as_f64), Some(4.9));
        assert_eq!(book.runtime_length_min.as_ref().and_then(LooseNumber::as_f64), Some(970.0));
        assert_eq!(book.series_primary.unwrap().position.as_deref(), Some("1"));
        assert_eq!(book.genres[0].kind.as_deref(), Some("genre"));
    }

    #[test]
    fn empty_object_still_deserializes() {
        let book: AudnexBook = serde_json::from_str("{}").unwrap();
        assert!(book.title.is_none());
        assert!(book.authors.is_empty());
    }
}
