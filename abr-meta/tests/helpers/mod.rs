//! Shared test helpers: scripted source adapters and payload builders
#![allow(dead_code)]

use abr_meta::extractors::audible_client::{AudibleContributor, AudibleProduct};
use abr_meta::extractors::audnex_client::{AudnexBook, AudnexPerson};
use abr_meta::extractors::{
    IdentifierScraper, MetadataLookup, MetadataSearch, ProviderPayload, SearchQuery,
};
use abr_meta::types::{IncomingRequest, SourceIdentifier, SourceResult};
use abr_meta::workflow::{CoordinatorTimeouts, MetadataCoordinator};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const WOLF_RELEASE: &str = "The Wolf's Advance by Shane Purdy [English / m4b]";
pub const MAM_URL: &str = "https://www.myanonamouse.net/t/1042";

/// Counts concurrent calls and remembers the peak
#[derive(Default)]
pub struct ActivityGauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ActivityGauge {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct StubScraper {
    pub result: SourceResult<SourceIdentifier>,
    pub delay: Duration,
    /// Panic instead of answering when the URL contains this marker
    pub panic_marker: Option<&'static str>,
    pub calls: AtomicUsize,
}

impl StubScraper {
    pub fn new(result: SourceResult<SourceIdentifier>) -> Self {
        Self {
            result,
            delay: Duration::ZERO,
            panic_marker: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentifierScraper for StubScraper {
    fn name(&self) -> &'static str {
        "stub-scraper"
    }

    async fn resolve(&self, source_url: &str) -> SourceResult<SourceIdentifier> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = self.panic_marker {
            if source_url.contains(marker) {
                panic!("boom: scraper exploded on {}", source_url);
            }
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }
}

pub struct StubLookup {
    pub result: SourceResult<ProviderPayload>,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl StubLookup {
    pub fn new(result: SourceResult<ProviderPayload>) -> Self {
        Self {
            result,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataLookup for StubLookup {
    fn name(&self) -> &'static str {
        "stub-lookup"
    }

    async fn resolve(&self, _identifier: &SourceIdentifier) -> SourceResult<ProviderPayload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }
}

pub struct StubSearch {
    pub result: SourceResult<ProviderPayload>,
    pub delay: Duration,
    pub queries: Mutex<Vec<SearchQuery>>,
    pub gauge: ActivityGauge,
}

impl StubSearch {
    pub fn new(result: SourceResult<ProviderPayload>) -> Self {
        Self {
            result,
            delay: Duration::ZERO,
            queries: Mutex::new(Vec::new()),
            gauge: ActivityGauge::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn queries(&self) -> Vec<SearchQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataSearch for StubSearch {
    fn name(&self) -> &'static str {
        "stub-search"
    }

    async fn resolve(&self, query: &SearchQuery) -> SourceResult<ProviderPayload> {
        self.gauge.enter();
        self.queries.lock().unwrap().push(query.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.gauge.exit();
        self.result.clone()
    }
}

pub fn asin(raw: &str) -> SourceIdentifier {
    SourceIdentifier::parse(raw).unwrap()
}

pub fn audnex_payload(title: &str, author: &str) -> ProviderPayload {
    ProviderPayload::Audnex(AudnexBook {
        asin: Some("B08G9PRS1K".to_string()),
        title: Some(title.to_string()),
        authors: vec![AudnexPerson {
            asin: None,
            name: author.to_string(),
        }],
        ..Default::default()
    })
}

pub fn audible_payload(title: &str, author: &str) -> ProviderPayload {
    ProviderPayload::Audible(AudibleProduct {
        asin: Some("B0CHYQ2RZ5".to_string()),
        title: Some(title.to_string()),
        authors: vec![AudibleContributor {
            asin: None,
            name: author.to_string(),
        }],
        ..Default::default()
    })
}

pub fn request(value: serde_json::Value) -> IncomingRequest {
    IncomingRequest::from_value(value).unwrap()
}

pub fn wolf_request() -> IncomingRequest {
    request(serde_json::json!({ "name": WOLF_RELEASE, "url": MAM_URL }))
}

pub fn short_timeouts() -> CoordinatorTimeouts {
    CoordinatorTimeouts {
        scrape: Duration::from_secs(2),
        primary: Duration::from_secs(2),
        fallback: Duration::from_secs(2),
    }
}

pub fn coordinator(
    scraper: Option<Arc<StubScraper>>,
    lookup: Arc<StubLookup>,
    search: Arc<StubSearch>,
    timeouts: CoordinatorTimeouts,
) -> MetadataCoordinator {
    MetadataCoordinator::new(
        scraper.map(|s| s as Arc<dyn IdentifierScraper>),
        lookup,
        search,
        timeouts,
    )
}

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn spawn_fixture_server(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}
