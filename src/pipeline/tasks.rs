use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::constants;
use crate::domain::GeoStatus;
use crate::error::{PipelineError, Result};
use crate::pipeline::export;
use crate::pipeline::geocoding::cache::GeocodeCache;
use crate::pipeline::geocoding::providers::google::GoogleProvider;
use crate::pipeline::geocoding::providers::nominatim::NominatimProvider;
use crate::pipeline::geocoding::providers::GeocodeProvider;
use crate::pipeline::geocoding::rate_limiter::RateLimiter;
use crate::pipeline::geocoding::{GeocodeClient, RetryPolicy};
use crate::pipeline::ingestion;
use crate::pipeline::processing::normalize::AddressNormalizer;
use crate::pipeline::processing::scoring::{ConfidenceBand, ConfidenceScorer};
use crate::pipeline::storage::{should_geocode, ResultStore};

#[derive(Debug, Clone)]
pub struct RunParams {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// Overrides the configured provider when set
    pub provider: Option<String>,
    /// Re-geocode settled records and start with a cold cross-run cache
    pub force_refresh: bool,
}

/// Aggregate counts reported at the end of each run. Partial success is the
/// steady state, so the run never aborts on per-record failures and these
/// numbers are the operator's main signal.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    pub total_rows: usize,
    pub skipped_invalid: usize,
    pub duplicates_removed: usize,
    pub skipped_settled: usize,
    pub cache_hits: usize,
    pub external_lookups: usize,
    pub success: usize,
    pub low_confidence: usize,
    pub failed: usize,
}

/// Run the full pipeline: ingest, normalize, dedupe, geocode (cached and
/// rate limited), score, store, and export.
pub async fn run_pipeline(
    config: &Config,
    params: RunParams,
    store: Arc<dyn ResultStore>,
) -> Result<RunSummary> {
    std::fs::create_dir_all(&params.output_dir)?;

    // Shared geocode cache, warmed from the previous run unless forced cold
    let cache = Arc::new(GeocodeCache::new());
    let cache_path = params.output_dir.join(constants::GEOCODE_CACHE_FILE);
    if params.force_refresh {
        info!("Force refresh requested; starting with a cold geocode cache");
    } else {
        cache.load_snapshot(&cache_path, config.geocoding.cache_max_age_days);
    }

    let client = build_client(config, params.provider.as_deref(), cache.clone())?;
    run_pipeline_with_client(config, params, store, client, cache).await
}

/// Same as [`run_pipeline`] but with the geocoding client supplied by the
/// caller, so tests can drive the whole flow against a scripted provider.
pub async fn run_pipeline_with_client(
    config: &Config,
    params: RunParams,
    store: Arc<dyn ResultStore>,
    client: GeocodeClient,
    cache: Arc<GeocodeCache>,
) -> Result<RunSummary> {
    std::fs::create_dir_all(&params.output_dir)?;

    // Ingest
    let ingested = ingestion::load_csv(&params.input)?;
    let mut summary = RunSummary {
        total_rows: ingested.records.len() + ingested.skipped_invalid,
        skipped_invalid: ingested.skipped_invalid,
        ..Default::default()
    };

    // Normalize and dedupe
    let normalizer = AddressNormalizer::new();
    let normalized: Vec<_> = ingested
        .records
        .iter()
        .map(|r| normalizer.normalize(r))
        .collect();
    let (normalized, duplicates_removed) = normalizer.dedupe(normalized);
    summary.duplicates_removed = duplicates_removed;

    let cache_path = params.output_dir.join(constants::GEOCODE_CACHE_FILE);
    let scorer = ConfidenceScorer::new(config.scoring.clone());

    // Geocode each institution, skipping records settled by earlier runs
    for item in &normalized {
        let existing = store.get(item.record.institution_id).await?;
        if !should_geocode(existing.as_ref(), params.force_refresh) {
            summary.skipped_settled += 1;
            continue;
        }

        let outcome = client.resolve(item).await;
        if outcome.cache_hit {
            summary.cache_hits += 1;
        } else {
            summary.external_lookups += 1;
        }
        match outcome.result.status {
            GeoStatus::Success => summary.success += 1,
            GeoStatus::LowConfidence => summary.low_confidence += 1,
            GeoStatus::Failed => summary.failed += 1,
            GeoStatus::NotAttempted => {}
        }

        let mut record = item.record.clone();
        record.geo = Some(outcome.result);
        store.upsert(&record).await?;
    }

    // Persist state before publishing exports
    store.flush().await?;
    if let Err(e) = cache.save_snapshot(&cache_path) {
        warn!("Failed to save geocode cache snapshot: {}", e);
    }

    let records = store.all().await?;
    export::export_all(
        &records,
        &scorer,
        &params.output_dir.join(constants::TABULAR_EXPORT_FILE),
        &params.output_dir.join(constants::GEOJSON_EXPORT_FILE),
    )?;

    info!(
        success = summary.success,
        low_confidence = summary.low_confidence,
        failed = summary.failed,
        cache_hits = summary.cache_hits,
        "pipeline run complete"
    );
    Ok(summary)
}

/// Re-export the stored dataset without touching any provider
pub async fn export_only(
    config: &Config,
    output_dir: &Path,
    store: Arc<dyn ResultStore>,
) -> Result<usize> {
    let scorer = ConfidenceScorer::new(config.scoring.clone());
    let records = store.all().await?;
    export::export_all(
        &records,
        &scorer,
        &output_dir.join(constants::TABULAR_EXPORT_FILE),
        &output_dir.join(constants::GEOJSON_EXPORT_FILE),
    )?;
    Ok(records.len())
}

/// Counts by status and confidence band over the stored dataset, the batch
/// equivalent of a quality report.
#[derive(Debug, Default, Serialize)]
pub struct DatasetStats {
    pub total: usize,
    pub success: usize,
    pub low_confidence: usize,
    pub failed: usize,
    pub not_attempted: usize,
    pub high_band: usize,
    pub medium_band: usize,
    pub low_band: usize,
}

pub async fn dataset_stats(config: &Config, store: Arc<dyn ResultStore>) -> Result<DatasetStats> {
    let scorer = ConfidenceScorer::new(config.scoring.clone());
    let records = store.all().await?;
    let mut stats = DatasetStats {
        total: records.len(),
        ..Default::default()
    };
    for record in &records {
        match record.status() {
            GeoStatus::Success => stats.success += 1,
            GeoStatus::LowConfidence => stats.low_confidence += 1,
            GeoStatus::Failed => stats.failed += 1,
            GeoStatus::NotAttempted => stats.not_attempted += 1,
        }
        if let Some(geo) = record.geo.as_ref().filter(|g| g.has_coordinates()) {
            match scorer.band(geo.confidence) {
                ConfidenceBand::High => stats.high_band += 1,
                ConfidenceBand::Medium => stats.medium_band += 1,
                ConfidenceBand::Low => stats.low_band += 1,
            }
        }
    }
    Ok(stats)
}

fn build_provider(name: &str, timeout: Duration) -> Result<Arc<dyn GeocodeProvider>> {
    match name {
        constants::NOMINATIM_PROVIDER => Ok(Arc::new(NominatimProvider::new(timeout)?)),
        constants::GOOGLE_PROVIDER => Ok(Arc::new(GoogleProvider::from_env(timeout)?)),
        other => Err(PipelineError::Config(format!(
            "Unknown geocoding provider '{}'",
            other
        ))),
    }
}

fn build_client(
    config: &Config,
    provider_override: Option<&str>,
    cache: Arc<GeocodeCache>,
) -> Result<GeocodeClient> {
    let timeout = Duration::from_secs(config.geocoding.timeout_seconds);
    let primary_name = provider_override.unwrap_or(&config.geocoding.provider);
    let primary = build_provider(primary_name, timeout)?;

    let fallback = if config.geocoding.fallback_enabled {
        let fallback_name = if primary_name == constants::NOMINATIM_PROVIDER {
            constants::GOOGLE_PROVIDER
        } else {
            constants::NOMINATIM_PROVIDER
        };
        match build_provider(fallback_name, timeout) {
            Ok(provider) => Some(provider),
            Err(e) => {
                // Typically a missing Google API key; run with primary only
                warn!("Fallback provider '{}' unavailable: {}", fallback_name, e);
                None
            }
        }
    } else {
        None
    };

    let limiter = RateLimiter::new(
        Duration::from_millis(config.geocoding.min_interval_ms),
        config.geocoding.max_concurrency,
    );
    let scorer = ConfidenceScorer::new(config.scoring.clone());
    let retry = RetryPolicy {
        max_retries: config.geocoding.max_retries,
        backoff_base: Duration::from_millis(config.geocoding.backoff_base_ms),
    };

    Ok(GeocodeClient::new(primary, fallback, limiter, cache, scorer, retry))
}
