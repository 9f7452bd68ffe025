//! MAM torrent page scraper
//!
//! Loads a MyAnonamouse torrent page and pulls the Audible ASIN out of it.
//! Pages are fetched either directly with the `mam_id` session cookie or,
//! when a Browserless endpoint is configured, rendered through its
//! `/content` API.
//!
//! Identifier sources on the page, in order of trust:
//! 1. An explicit `ASIN: XXXXXXXXXX` label in the page text
//! 2. Audible product links (`audible.com/pd/<slug>/<ASIN>`)
//! 3. Amazon product links (`amazon.com/<slug>/dp/<ASIN>`)

use super::{build_http_client, classify_status, trim_base_url, IdentifierScraper};
use crate::rate_limiter::RateLimiter;
use crate::types::{SourceError, SourceIdentifier, SourceKind, SourceResult};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

static ASIN_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bASIN\s*[:#]?\s*([A-Z0-9]{10})\b").expect("ASIN label regex should compile")
});

static AUDIBLE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)audible\.[a-z.]+/pd/(?:[^/?#\s]+/)?([A-Z0-9]{10})\b")
        .expect("Audible link regex should compile")
});

static AMAZON_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)amazon\.[a-z.]+/(?:[^/?#\s]+/)?dp/([A-Z0-9]{10})\b")
        .expect("Amazon link regex should compile")
});

static LINKS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));

static LOGIN_MARKERS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"form[action*="takelogin"], input[type="password"]"#).expect("valid selector")
});

/// How to fetch pages
#[derive(Debug, Clone, PartialEq)]
pub enum FetchMode {
    /// Plain GET with the session cookie
    Direct { mam_id: String },
    /// Rendered through a Browserless instance
    Browserless {
        endpoint: String,
        token: Option<String>,
        mam_id: Option<String>,
    },
}

/// Scrape adapter for MAM torrent pages
pub struct MamScraper {
    http: reqwest::Client,
    base_url: String,
    mode: FetchMode,
    rate_limiter: Arc<RateLimiter>,
}

impl MamScraper {
    pub fn new(
        base_url: &str,
        mode: FetchMode,
        timeout: Duration,
        rate_limiter: Arc<RateLimiter>,
    ) -> SourceResult<Self> {
        Url::parse(base_url)
            .map_err(|e| SourceError::Misconfigured(format!("mam.base_url {:?}: {}", base_url, e)))?;

        Ok(Self {
            http: build_http_client(timeout)?,
            base_url: trim_base_url(base_url),
            mode,
            rate_limiter,
        })
    }

    /// Whether `source_url` points at the configured MAM host
    fn is_mam_url(&self, source_url: &str) -> bool {
        let (Ok(base), Ok(candidate)) = (Url::parse(&self.base_url), Url::parse(source_url)) else {
            return false;
        };
        let strip = |host: &str| host.trim_start_matches("www.").to_ascii_lowercase();
        match (base.host_str(), candidate.host_str()) {
            (Some(b), Some(c)) => strip(b) == strip(c),
            _ => false,
        }
    }

    async fn fetch_page(&self, source_url: &str) -> SourceResult<String> {
        let request = match &self.mode {
            FetchMode::Direct { mam_id } => self
                .http
                .get(source_url)
                .header(reqwest::header::COOKIE, format!("mam_id={}", mam_id)),
            FetchMode::Browserless {
                endpoint,
                token,
                mam_id,
            } => {
                let mut body = serde_json::json!({ "url": source_url });
                if let (Some(mam_id), Ok(page)) = (mam_id, Url::parse(source_url)) {
                    body["cookies"] = serde_json::json!([{
                        "name": "mam_id",
                        "value": mam_id,
                        "domain": page.host_str().unwrap_or_default(),
                    }]);
                }
                let request = self
                    .http
                    .post(format!("{}/content", trim_base_url(endpoint)))
                    .json(&body);
                match token {
                    Some(token) => request.query(&[("token", token.as_str())]),
                    None => request,
                }
            }
        };

        let response = request.send().await.map_err(SourceError::from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(SourceKind::Scrape, status, source_url));
        }

        response
            .text()
            .await
            .map_err(|e| {
                SourceError::Unavailable(format!("reading page body failed: {}", e.without_url()))
            })
    }
}

#[async_trait]
impl IdentifierScraper for MamScraper {
    fn name(&self) -> &'static str {
        "MAM"
    }

    async fn resolve(&self, source_url: &str) -> SourceResult<SourceIdentifier> {
        if !self.is_mam_url(source_url) {
            return Err(SourceError::NotFound(format!(
                "{} is not a MAM page",
                source_url
            )));
        }

        self.rate_limiter.await_slot(SourceKind::Scrape).await;

        debug!(url = %source_url, "Scraping MAM page for ASIN");
        let html = self.fetch_page(source_url).await?;
        let identifier = extract_identifier(&html)?;

        debug!(url = %source_url, asin = %identifier, "ASIN found on MAM page");
        Ok(identifier)
    }
}

/// Pull an ASIN out of a torrent page.
///
/// Login pages are reported as `NotAuthenticated` rather than `NotFound` so
/// an expired cookie shows up distinctly in the logs.
pub fn extract_identifier(html: &str) -> SourceResult<SourceIdentifier> {
    let document = Html::parse_document(html);

    if document.select(&LOGIN_MARKERS).next().is_some() {
        return Err(SourceError::NotAuthenticated(
            "MAM returned the login page; mam_id cookie missing or expired".to_string(),
        ));
    }

    let text: String = document.root_element().text().collect::<Vec<_>>().join(" ");
    if let Some(id) = ASIN_LABEL
        .captures_iter(&text)
        .find_map(|caps| SourceIdentifier::parse(&caps[1]))
    {
        return Ok(id);
    }

    let hrefs: Vec<&str> = document
        .select(&LINKS)
        .filter_map(|a| a.value().attr("href"))
        .collect();

    for pattern in [&*AUDIBLE_LINK, &*AMAZON_LINK] {
        if let Some(id) = hrefs
            .iter()
            .filter_map(|href| pattern.captures(href))
            .find_map(|caps| SourceIdentifier::parse(&caps[1]))
        {
            return Ok(id);
        }
    }

    Err(SourceError::NotFound("no ASIN on page".to_string()))
}
