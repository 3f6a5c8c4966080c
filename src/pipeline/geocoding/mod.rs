pub mod cache;
pub mod providers;
pub mod rate_limiter;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::GeoResult;
use crate::pipeline::geocoding::cache::GeocodeCache;
use crate::pipeline::geocoding::providers::{GeocodeError, GeocodeProvider, ProviderHit};
use crate::pipeline::geocoding::rate_limiter::RateLimiter;
use crate::pipeline::processing::normalize::NormalizedInstitution;
use crate::pipeline::processing::scoring::ConfidenceScorer;

/// Retry budget for transient provider failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

/// Outcome of resolving one record, with enough bookkeeping for the run
/// summary to count cache hits.
#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    pub result: GeoResult,
    pub cache_hit: bool,
}

/// Front door for geocoding: cache lookup, shared rate limiting, retry with
/// exponential backoff, provider fallback, and scoring of the raw hit. The
/// limiter and cache are injected so every call path in the process shares
/// one budget.
pub struct GeocodeClient {
    provider: Arc<dyn GeocodeProvider>,
    fallback: Option<Arc<dyn GeocodeProvider>>,
    limiter: RateLimiter,
    cache: Arc<GeocodeCache>,
    scorer: ConfidenceScorer,
    retry: RetryPolicy,
}

impl GeocodeClient {
    pub fn new(
        provider: Arc<dyn GeocodeProvider>,
        fallback: Option<Arc<dyn GeocodeProvider>>,
        limiter: RateLimiter,
        cache: Arc<GeocodeCache>,
        scorer: ConfidenceScorer,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            fallback,
            limiter,
            cache,
            scorer,
            retry,
        }
    }

    /// Resolve one normalized institution to a scored `GeoResult`. A cache
    /// hit short-circuits both the external call and re-scoring; everything
    /// else ends with the scored result written back to the cache, so
    /// duplicate addresses converge on one external call per process.
    pub async fn resolve(&self, item: &NormalizedInstitution) -> ResolveOutcome {
        let canonical = item.address.canonical();
        if canonical.is_empty() {
            return ResolveOutcome {
                result: GeoResult::failed(self.provider.name(), "empty address after normalization"),
                cache_hit: false,
            };
        }

        if let Some(cached) = self.cache.get(&canonical) {
            debug!(address = %canonical, "geocode cache hit");
            return ResolveOutcome {
                result: cached,
                cache_hit: true,
            };
        }

        let result = self.resolve_uncached(item, &canonical).await;
        self.cache.insert(&canonical, result.clone());
        ResolveOutcome {
            result,
            cache_hit: false,
        }
    }

    async fn resolve_uncached(&self, item: &NormalizedInstitution, canonical: &str) -> GeoResult {
        match self.lookup_with_variants(self.provider.as_ref(), item, canonical).await {
            Ok(hit) => self.score(item, &hit, self.provider.name()),
            Err(primary_err) => {
                if let Some(fallback) = &self.fallback {
                    info!(
                        address = %canonical,
                        error = %primary_err,
                        "primary provider failed, trying fallback"
                    );
                    match self.lookup_with_variants(fallback.as_ref(), item, canonical).await {
                        Ok(hit) => return self.score(item, &hit, fallback.name()),
                        Err(fallback_err) => {
                            warn!(address = %canonical, error = %fallback_err, "fallback provider failed");
                        }
                    }
                }
                warn!(address = %canonical, error = %primary_err, "geocoding failed");
                GeoResult::failed(self.provider.name(), primary_err.to_string())
            }
        }
    }

    /// Full address first; on NoMatch, one simplified retry with just
    /// city/state/PIN before giving up.
    async fn lookup_with_variants(
        &self,
        provider: &dyn GeocodeProvider,
        item: &NormalizedInstitution,
        canonical: &str,
    ) -> Result<ProviderHit, GeocodeError> {
        match self.lookup_with_retry(provider, canonical).await {
            Err(GeocodeError::NoMatch) => match item.address.simplified() {
                Some(simplified) if simplified != canonical => {
                    debug!(address = %canonical, retry = %simplified, "no match, retrying simplified address");
                    self.lookup_with_retry(provider, &simplified).await
                }
                _ => Err(GeocodeError::NoMatch),
            },
            other => other,
        }
    }

    async fn lookup_with_retry(
        &self,
        provider: &dyn GeocodeProvider,
        address: &str,
    ) -> Result<ProviderHit, GeocodeError> {
        let mut attempt: u32 = 0;
        loop {
            let _permit = self.limiter.acquire().await;
            match provider.lookup(address).await {
                Ok(hit) => return Ok(hit),
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.backoff_base * 2u32.pow(attempt);
                    warn!(
                        address,
                        attempt = attempt + 1,
                        error = %e,
                        "transient geocoding failure, backing off {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn score(&self, item: &NormalizedInstitution, hit: &ProviderHit, service: &str) -> GeoResult {
        self.scorer.score(
            hit,
            &item.flags,
            item.address.postal_code.as_deref(),
            service,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::domain::{GeoStatus, InstitutionRecord, InstitutionType, RawAddress};
    use crate::pipeline::processing::normalize::AddressNormalizer;
    use async_trait::async_trait;
    use super::providers::MatchQuality;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted provider: counts calls and plays back a fixed sequence of
    /// responses, then repeats the last one.
    struct ScriptedProvider {
        calls: AtomicUsize,
        script: Vec<Result<ProviderHit, GeocodeError>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<ProviderHit, GeocodeError>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                script,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn clone_response(
        r: &Result<ProviderHit, GeocodeError>,
    ) -> Result<ProviderHit, GeocodeError> {
        match r {
            Ok(hit) => Ok(hit.clone()),
            Err(GeocodeError::RateLimitExceeded) => Err(GeocodeError::RateLimitExceeded),
            Err(GeocodeError::Timeout) => Err(GeocodeError::Timeout),
            Err(GeocodeError::NoMatch) => Err(GeocodeError::NoMatch),
            Err(GeocodeError::Provider { message, transient }) => Err(GeocodeError::Provider {
                message: message.clone(),
                transient: *transient,
            }),
        }
    }

    #[async_trait]
    impl GeocodeProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn lookup(&self, _address: &str) -> Result<ProviderHit, GeocodeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let idx = n.min(self.script.len() - 1);
            clone_response(&self.script[idx])
        }
    }

    fn delhi_hit() -> ProviderHit {
        ProviderHit {
            latitude: 28.6315,
            longitude: 77.2167,
            match_quality: MatchQuality::Rooftop,
            resolved_postal_code: Some("110001".to_string()),
            resolved_state: Some("Delhi".to_string()),
            display_name: Some("XYZ Institute, Connaught Place, New Delhi".to_string()),
        }
    }

    fn normalized_delhi() -> NormalizedInstitution {
        let record = InstitutionRecord::new(
            "XYZ Institute".to_string(),
            InstitutionType::Private,
            RawAddress {
                street: Some("Connaught Place".to_string()),
                city: Some("New Delhi".to_string()),
                state: Some("Delhi".to_string()),
                postal_code: Some("110001".to_string()),
            },
        );
        AddressNormalizer::new().normalize(&record)
    }

    fn client(provider: Arc<ScriptedProvider>) -> GeocodeClient {
        GeocodeClient::new(
            provider,
            None,
            RateLimiter::new(Duration::from_millis(1), None),
            Arc::new(GeocodeCache::new()),
            ConfidenceScorer::new(ScoringConfig::default()),
            RetryPolicy {
                max_retries: 2,
                backoff_base: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn test_second_resolve_is_a_cache_hit() {
        let provider = ScriptedProvider::new(vec![Ok(delhi_hit())]);
        let client = client(provider.clone());
        let item = normalized_delhi();

        let first = client.resolve(&item).await;
        let second = client.resolve(&item).await;

        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(provider.calls(), 1);
        assert_eq!(second.result.status, GeoStatus::Success);
    }

    #[tokio::test]
    async fn test_clean_delhi_address_scores_high() {
        let provider = ScriptedProvider::new(vec![Ok(delhi_hit())]);
        let client = client(provider);
        let outcome = client.resolve(&normalized_delhi()).await;

        assert_eq!(outcome.result.status, GeoStatus::Success);
        assert!(outcome.result.confidence >= 0.8);
        let lat = outcome.result.latitude.unwrap();
        let lon = outcome.result.longitude.unwrap();
        assert!((lat - 28.63).abs() < 0.05);
        assert!((lon - 77.22).abs() < 0.05);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_then_succeed() {
        let provider = ScriptedProvider::new(vec![
            Err(GeocodeError::Timeout),
            Err(GeocodeError::RateLimitExceeded),
            Ok(delhi_hit()),
        ]);
        let client = client(provider.clone());
        let outcome = client.resolve(&normalized_delhi()).await;

        assert_eq!(provider.calls(), 3);
        assert_eq!(outcome.result.status, GeoStatus::Success);
    }

    #[tokio::test]
    async fn test_exhausted_retry_budget_marks_failed() {
        let provider = ScriptedProvider::new(vec![Err(GeocodeError::Timeout)]);
        let client = client(provider.clone());
        let outcome = client.resolve(&normalized_delhi()).await;

        // initial attempt + max_retries
        assert_eq!(provider.calls(), 3);
        assert_eq!(outcome.result.status, GeoStatus::Failed);
        assert!(!outcome.result.has_coordinates());
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let provider = ScriptedProvider::new(vec![Err(GeocodeError::Provider {
            message: "HTTP 400".to_string(),
            transient: false,
        })]);
        let client = client(provider.clone());
        let outcome = client.resolve(&normalized_delhi()).await;

        assert_eq!(provider.calls(), 1);
        assert_eq!(outcome.result.status, GeoStatus::Failed);
    }

    #[tokio::test]
    async fn test_no_match_triggers_one_simplified_retry() {
        let provider = ScriptedProvider::new(vec![Err(GeocodeError::NoMatch), Ok(delhi_hit())]);
        let client = client(provider.clone());
        let outcome = client.resolve(&normalized_delhi()).await;

        assert_eq!(provider.calls(), 2);
        assert_eq!(outcome.result.status, GeoStatus::Success);
    }

    #[tokio::test]
    async fn test_fallback_provider_is_consulted() {
        let primary = ScriptedProvider::new(vec![Err(GeocodeError::Provider {
            message: "HTTP 403".to_string(),
            transient: false,
        })]);
        let fallback = ScriptedProvider::new(vec![Ok(delhi_hit())]);
        let client = GeocodeClient::new(
            primary.clone(),
            Some(fallback.clone()),
            RateLimiter::new(Duration::from_millis(1), None),
            Arc::new(GeocodeCache::new()),
            ConfidenceScorer::new(ScoringConfig::default()),
            RetryPolicy {
                max_retries: 0,
                backoff_base: Duration::from_millis(1),
            },
        );
        let outcome = client.resolve(&normalized_delhi()).await;

        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
        assert_eq!(outcome.result.status, GeoStatus::Success);
    }

    #[tokio::test]
    async fn test_failed_result_is_cached_too() {
        let provider = ScriptedProvider::new(vec![Err(GeocodeError::NoMatch)]);
        let client = client(provider.clone());
        let item = normalized_delhi();

        let first = client.resolve(&item).await;
        let second = client.resolve(&item).await;

        assert_eq!(first.result.status, GeoStatus::Failed);
        assert!(second.cache_hit);
        // one full attempt + one simplified retry, nothing more
        assert_eq!(provider.calls(), 2);
    }
}
