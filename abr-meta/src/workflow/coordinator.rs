//! Metadata Coordinator
//!
//! Runs one resolution through the source chain:
//!
//! ```text
//! START → Scrape → [id] → Primary(id) → [ok: DONE]
//!                                     → [fail: Fallback] → [ok: DONE] | [fail: DONE-with-partial]
//! START → [Scrape fails] → Fallback → [ok: DONE] | [fail: DONE-with-partial]
//! ```
//!
//! Every adapter call is bounded by its own timeout. Ordinary source
//! failures are logged and recorded in provenance, then the next source is
//! tried. Only misconfiguration aborts the resolution.
//!
//! The coordinator holds no per-request state; one instance is shared by the
//! queue worker and the admin lookup endpoint.

use crate::extractors::audible_client::AudibleSearchClient;
use crate::extractors::audnex_client::AudnexClient;
use crate::extractors::mam_scraper::{FetchMode, MamScraper};
use crate::extractors::{
    parse_request, IdentifierScraper, MetadataLookup, MetadataSearch, SearchQuery,
};
use crate::fusion::{finalize, normalize, MetadataDraft};
use crate::rate_limiter::RateLimiter;
use crate::types::{
    Attempt, CanonicalMetadata, FieldOrigin, IncomingRequest, ResolutionPath, ResolverError,
    SourceError, SourceIdentifier, SourceKind, SourceResult,
};
use abr_common::config::{secs_to_duration, TimeoutConfig, TomlConfig};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Per-adapter time budgets. A zero budget means no timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorTimeouts {
    pub scrape: Duration,
    pub primary: Duration,
    pub fallback: Duration,
}

impl CoordinatorTimeouts {
    pub fn from_config(config: &TimeoutConfig) -> Self {
        Self {
            scrape: secs_to_duration(config.scrape_secs),
            primary: secs_to_duration(config.primary_secs),
            fallback: secs_to_duration(config.fallback_secs),
        }
    }

    fn budget(&self, source: SourceKind) -> Duration {
        match source {
            SourceKind::Scrape => self.scrape,
            SourceKind::Primary => self.primary,
            SourceKind::Fallback => self.fallback,
        }
    }
}

impl Default for CoordinatorTimeouts {
    fn default() -> Self {
        Self::from_config(&TimeoutConfig::default())
    }
}

/// Source-chain orchestrator
pub struct MetadataCoordinator {
    scraper: Option<Arc<dyn IdentifierScraper>>,
    primary: Arc<dyn MetadataLookup>,
    fallback: Arc<dyn MetadataSearch>,
    timeouts: CoordinatorTimeouts,
}

impl MetadataCoordinator {
    pub fn new(
        scraper: Option<Arc<dyn IdentifierScraper>>,
        primary: Arc<dyn MetadataLookup>,
        fallback: Arc<dyn MetadataSearch>,
        timeouts: CoordinatorTimeouts,
    ) -> Self {
        Self {
            scraper,
            primary,
            fallback,
            timeouts,
        }
    }

    /// Build the production adapters from configuration.
    ///
    /// The scraper is only enabled when a `mam_id` cookie or a Browserless
    /// endpoint is configured; without either every request goes straight to
    /// the fallback search.
    pub fn from_config(
        config: &TomlConfig,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self, ResolverError> {
        let timeouts = CoordinatorTimeouts::from_config(&config.timeouts);

        let fetch_mode = match (&config.mam.browserless_url, &config.mam.mam_id) {
            (Some(endpoint), mam_id) => Some(FetchMode::Browserless {
                endpoint: endpoint.clone(),
                token: config.mam.browserless_token.clone(),
                mam_id: mam_id.clone(),
            }),
            (None, Some(mam_id)) => Some(FetchMode::Direct {
                mam_id: mam_id.clone(),
            }),
            (None, None) => None,
        };

        let scraper: Option<Arc<dyn IdentifierScraper>> = match fetch_mode {
            Some(mode) => {
                let scraper = MamScraper::new(
                    &config.mam.base_url,
                    mode,
                    timeouts.scrape,
                    Arc::clone(&rate_limiter),
                )
                .map_err(|e| configuration(SourceKind::Scrape, e))?;
                Some(Arc::new(scraper))
            }
            None => {
                warn!("No mam_id or browserless_url configured; MAM scraping disabled");
                None
            }
        };

        let primary = AudnexClient::new(
            &config.audnex.base_url,
            &config.audnex.region,
            timeouts.primary,
            Arc::clone(&rate_limiter),
        )
        .map_err(|e| configuration(SourceKind::Primary, e))?;

        let fallback = AudibleSearchClient::new(
            &config.audible.base_url,
            config.audible.num_results,
            config.audible.fetch_detail,
            timeouts.fallback,
            rate_limiter,
        )
        .map_err(|e| configuration(SourceKind::Fallback, e))?;

        Ok(Self::new(scraper, Arc::new(primary), Arc::new(fallback), timeouts))
    }

    /// Resolve one webhook payload into a canonical record.
    ///
    /// Never fails because a source failed; the worst case is a record built
    /// from the payload alone (`ResolutionPath::PayloadOnly`).
    pub async fn resolve(
        &self,
        request: &IncomingRequest,
    ) -> Result<CanonicalMetadata, ResolverError> {
        let mut attempts = Vec::new();
        let guess = parse_request(request);

        // Scrape
        let identifier = match (&self.scraper, request.source_url()) {
            (Some(scraper), Some(url)) => {
                self.call(
                    SourceKind::Scrape,
                    scraper.name(),
                    &mut attempts,
                    scraper.resolve(url),
                )
                .await?
            }
            (None, _) => {
                debug!("Scraper disabled, skipping identifier scrape");
                None
            }
            (Some(_), None) => {
                debug!("Payload has no source URL, skipping identifier scrape");
                None
            }
        };

        // Primary
        if let Some(id) = &identifier {
            if let Some(payload) = self
                .call(
                    SourceKind::Primary,
                    self.primary.name(),
                    &mut attempts,
                    self.primary.resolve(id),
                )
                .await?
            {
                let draft = normalize(&payload).with_identifier(id.clone(), FieldOrigin::Scrape);
                return Ok(self.complete(draft, request, ResolutionPath::Primary, attempts));
            }
        }

        // Fallback
        let query = SearchQuery::from(&guess);
        let fallback_payload = if query.title.is_empty() {
            debug!("No usable title in payload, skipping fallback search");
            None
        } else {
            self.call(
                SourceKind::Fallback,
                self.fallback.name(),
                &mut attempts,
                self.fallback.resolve(&query),
            )
            .await?
        };

        let (draft, path) = match fallback_payload {
            Some(payload) => {
                let path = if identifier.is_some() {
                    ResolutionPath::FallbackAfterPrimary
                } else {
                    ResolutionPath::FallbackAfterScrape
                };
                (normalize(&payload), path)
            }
            None => (MetadataDraft::default(), ResolutionPath::PayloadOnly),
        };

        let draft = match identifier {
            Some(id) => draft.with_identifier(id, FieldOrigin::Scrape),
            None => draft,
        };

        Ok(self.complete(draft, request, path, attempts))
    }

    /// Admin lookup: identifier → canonical record through the primary
    /// source only. Shares the rate limiter with queued resolutions.
    pub async fn lookup_identifier(
        &self,
        identifier: &SourceIdentifier,
    ) -> SourceResult<CanonicalMetadata> {
        let budget = self.timeouts.budget(SourceKind::Primary);
        let payload = with_budget(budget, self.primary.resolve(identifier)).await?;

        let attempts = vec![Attempt {
            source: SourceKind::Primary,
            adapter: self.primary.name().to_string(),
            outcome: "ok".to_string(),
        }];
        let empty = IncomingRequest::new(serde_json::Map::new());
        let draft = normalize(&payload).with_identifier(identifier.clone(), FieldOrigin::Primary);

        info!(asin = %identifier, "Manual lookup resolved");
        Ok(finalize(draft, &empty, ResolutionPath::Primary, attempts))
    }

    /// Run one adapter call under its budget and record the attempt.
    ///
    /// `Ok(None)` means the source failed in an ordinary way and the chain
    /// should continue.
    async fn call<T>(
        &self,
        source: SourceKind,
        adapter: &'static str,
        attempts: &mut Vec<Attempt>,
        fut: impl Future<Output = SourceResult<T>>,
    ) -> Result<Option<T>, ResolverError> {
        let outcome = with_budget(self.timeouts.budget(source), fut).await;

        attempts.push(Attempt {
            source,
            adapter: adapter.to_string(),
            outcome: match &outcome {
                Ok(_) => "ok".to_string(),
                Err(e) => e.kind().to_string(),
            },
        });

        match outcome {
            Ok(value) => {
                debug!(source = %source, adapter, "Source call succeeded");
                Ok(Some(value))
            }
            Err(e) if e.is_recoverable() => {
                warn!(
                    source = %source,
                    adapter,
                    error = %e,
                    "Source call failed, continuing with next source"
                );
                Ok(None)
            }
            Err(e) => {
                error!(source = %source, adapter, error = %e, "Source adapter misconfigured");
                Err(configuration(source, e))
            }
        }
    }

    fn complete(
        &self,
        draft: MetadataDraft,
        request: &IncomingRequest,
        path: ResolutionPath,
        attempts: Vec<Attempt>,
    ) -> CanonicalMetadata {
        let record = finalize(draft, request, path, attempts);
        info!(
            path = path.as_str(),
            confidence = record.provenance.confidence().as_str(),
            title = %record.title,
            author = %record.author,
            asin = ?record.source_identifier.as_ref().map(SourceIdentifier::as_str),
            "Resolution complete"
        );
        record
    }
}

async fn with_budget<T>(
    budget: Duration,
    fut: impl Future<Output = SourceResult<T>>,
) -> SourceResult<T> {
    if budget.is_zero() {
        return fut.await;
    }
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout(budget)),
    }
}

fn configuration(source_kind: SourceKind, err: SourceError) -> ResolverError {
    ResolverError::Configuration {
        source_kind,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_from_config() {
        let timeouts = CoordinatorTimeouts::from_config(&TimeoutConfig {
            scrape_secs: 2.0,
            primary_secs: 0.5,
            fallback_secs: 0.0,
        });
        assert_eq!(timeouts.budget(SourceKind::Scrape), Duration::from_secs(2));
        assert_eq!(timeouts.budget(SourceKind::Primary), Duration::from_millis(500));
        assert_eq!(timeouts.budget(SourceKind::Fallback), Duration::ZERO);
    }

    #[tokio::test]
    async fn zero_budget_never_times_out() {
        let result = with_budget(Duration::ZERO, async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, SourceError>(7)
        })
        .await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn exceeded_budget_is_timeout() {
        let result = with_budget(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, SourceError>(7)
        })
        .await;
        assert_eq!(result, Err(SourceError::Timeout(Duration::from_millis(10))));
    }

    #[test]
    fn scraper_disabled_without_credentials() {
        let config = TomlConfig::default();
        let coordinator =
            MetadataCoordinator::from_config(&config, Arc::new(RateLimiter::unlimited())).unwrap();
        assert!(coordinator.scraper.is_none());
    }

    #[test]
    fn scraper_enabled_with_cookie() {
        let mut config = TomlConfig::default();
        config.mam.mam_id = Some("cookie".to_string());
        let coordinator =
            MetadataCoordinator::from_config(&config, Arc::new(RateLimiter::unlimited())).unwrap();
        assert!(coordinator.scraper.is_some());
    }

    #[test]
    fn bad_mam_url_is_configuration_error() {
        let mut config = TomlConfig::default();
        config.mam.mam_id = Some("cookie".to_string());
        config.mam.base_url = "::not a url::".to_string();
        let result = MetadataCoordinator::from_config(&config, Arc::new(RateLimiter::unlimited()));
        assert!(matches!(
            result,
            Err(ResolverError::Configuration {
                source_kind: SourceKind::Scrape,
                ..
            })
        ));
    }
}
