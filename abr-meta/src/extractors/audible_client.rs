//! Audible catalog search client (fallback metadata source)
//!
//! Used when no ASIN could be scraped or the primary lookup failed:
//! 1. `GET {base}/1.0/catalog/products?title=..&author=..` (search)
//! 2. Pick the best match (the first product; Audible already orders by relevance)
//! 3. Optionally `GET {base}/1.0/catalog/products/{asin}` for the full record
//!
//! Both calls wait on the rate limiter independently.

use super::{
    build_http_client, classify_status, trim_base_url, MetadataSearch, ProviderPayload,
    SearchQuery,
};
use crate::rate_limiter::RateLimiter;
use crate::types::{null_as_default, LooseNumber, SourceError, SourceKind, SourceResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const RESPONSE_GROUPS: &str =
    "contributors,product_desc,product_attrs,product_extended_attrs,media,series,category_ladders,rating";

/// Audible catalog product
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudibleProduct {
    pub asin: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub authors: Vec<AudibleContributor>,
    #[serde(deserialize_with = "null_as_default")]
    pub narrators: Vec<AudibleContributor>,
    pub publisher_name: Option<String>,
    /// HTML
    pub publisher_summary: Option<String>,
    pub merchandising_summary: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub series: Vec<AudibleSeries>,
    pub runtime_length_min: Option<LooseNumber>,
    /// Size (px) → image URL
    #[serde(deserialize_with = "null_as_default")]
    pub product_images: BTreeMap<String, String>,
    pub language: Option<String>,
    pub release_date: Option<String>,
    pub issue_date: Option<String>,
    pub rating: Option<AudibleRating>,
    #[serde(deserialize_with = "null_as_default")]
    pub category_ladders: Vec<AudibleCategoryLadder>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudibleContributor {
    pub asin: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudibleSeries {
    pub asin: Option<String>,
    pub title: String,
    /// "1", "2.5", sometimes "Book 3"
    pub sequence: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudibleRating {
    pub overall_distribution: Option<AudibleRatingDistribution>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudibleRatingDistribution {
    pub average_rating: Option<LooseNumber>,
    pub display_average_rating: Option<LooseNumber>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudibleCategoryLadder {
    pub root: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub ladder: Vec<AudibleCategory>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudibleCategory {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    products: Vec<AudibleProduct>,
}

#[derive(Debug, Deserialize)]
struct ProductResponse {
    product: AudibleProduct,
}

/// Pick the best single match from search results.
///
/// Audible returns products ordered by relevance and exposes no score, so
/// the first product carrying a title wins.
pub fn select_match(products: Vec<AudibleProduct>) -> Option<AudibleProduct> {
    products
        .into_iter()
        .find(|p| p.title.as_deref().is_some_and(|t| !t.trim().is_empty()))
}

/// Fallback adapter: title/author → Audible product
pub struct AudibleSearchClient {
    http: reqwest::Client,
    base_url: String,
    num_results: u32,
    fetch_detail: bool,
    rate_limiter: Arc<RateLimiter>,
}

impl AudibleSearchClient {
    pub fn new(
        base_url: &str,
        num_results: u32,
        fetch_detail: bool,
        timeout: Duration,
        rate_limiter: Arc<RateLimiter>,
    ) -> SourceResult<Self> {
        Ok(Self {
            http: build_http_client(timeout)?,
            base_url: trim_base_url(base_url),
            num_results: num_results.max(1),
            fetch_detail,
            rate_limiter,
        })
    }

    async fn search(&self, query: &SearchQuery) -> SourceResult<Vec<AudibleProduct>> {
        self.rate_limiter.await_slot(SourceKind::Fallback).await;

        let num_results = self.num_results.to_string();
        let mut params = vec![
            ("title", query.title.as_str()),
            ("num_results", num_results.as_str()),
            ("products_sort_by", "Relevance"),
            ("response_groups", RESPONSE_GROUPS),
        ];
        if let Some(author) = &query.author {
            params.push(("author", author.as_str()));
        }

        let url = format!("{}/1.0/catalog/products", self.base_url);
        debug!(title = %query.title, author = ?query.author, "Searching Audible catalog");

        let response = self
            .http
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(SourceError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(SourceKind::Fallback, status, "catalog search"));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(format!("Audible search body: {}", e.without_url())))?;
        Ok(body.products)
    }

    async fn fetch_product(&self, asin: &str) -> SourceResult<AudibleProduct> {
        self.rate_limiter.await_slot(SourceKind::Fallback).await;

        let url = format!("{}/1.0/catalog/products/{}", self.base_url, asin);
        debug!(asin = %asin, "Fetching Audible product detail");

        let response = self
            .http
            .get(&url)
            .query(&[("response_groups", RESPONSE_GROUPS)])
            .send()
            .await
            .map_err(SourceError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(SourceKind::Fallback, status, asin));
        }

        let body: ProductResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(format!("Audible product body for {}: {}", asin, e.without_url())))?;
        Ok(body.product)
    }
}

#[async_trait]
impl MetadataSearch for AudibleSearchClient {
    fn name(&self) -> &'static str {
        "Audible"
    }

    async fn resolve(&self, query: &SearchQuery) -> SourceResult<ProviderPayload> {
        if query.title.trim().is_empty() {
            return Err(SourceError::NotFound("empty search title".to_string()));
        }

        let products = self.search(query).await?;
        let total = products.len();
        let hit = select_match(products).ok_or_else(|| {
            SourceError::NotFound(format!("no Audible results for {:?}", query.title))
        })?;

        debug!(
            results = total,
            asin = ?hit.asin,
            title = ?hit.title,
            "Audible search match selected"
        );

        if !self.fetch_detail {
            return Ok(ProviderPayload::Audible(hit));
        }

        let Some(asin) = hit.asin.clone() else {
            return Ok(ProviderPayload::Audible(hit));
        };

        match self.fetch_product(&asin).await {
            Ok(detail) if detail.title.is_some() => Ok(ProviderPayload::Audible(detail)),
            Ok(_) => {
                warn!(asin = %asin, "Audible detail had no title, keeping search result");
                Ok(ProviderPayload::Audible(hit))
            }
            Err(e) => {
                warn!(asin = %asin, error = %e, "Audible detail fetch failed, keeping search result");
                Ok(ProviderPayload::Audible(hit))
            }
        }
    }
}
