use crate::constants;
use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub geocoding: GeocodingConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    /// Primary provider: "nominatim" or "google"
    pub provider: String,
    /// Consult the other provider before declaring a record failed
    pub fallback_enabled: bool,
    /// Minimum interval between external requests, shared process-wide
    pub min_interval_ms: u64,
    /// Optional cap on in-flight requests when workers run in parallel
    pub max_concurrency: Option<u32>,
    /// Per-call timeout
    pub timeout_seconds: u64,
    /// Retry budget for transient failures (timeouts, 429, 5xx)
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt
    pub backoff_base_ms: u64,
    /// Cache snapshot entries older than this are ignored on load
    pub cache_max_age_days: i64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            provider: constants::NOMINATIM_PROVIDER.to_string(),
            fallback_enabled: false,
            min_interval_ms: 1000,
            max_concurrency: Some(1),
            timeout_seconds: 10,
            max_retries: 3,
            backoff_base_ms: 500,
            cache_max_age_days: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Results at or above this confidence are Success
    pub success_threshold: f64,
    /// Results at or above this confidence are the "high" band
    pub high_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            success_threshold: 0.6,
            high_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: "output".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let config_content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file '{}': {}", path, e))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `config.toml` if present, otherwise fall back to defaults so the
    /// pipeline stays runnable without any configuration file.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Config::default())
        }
    }

    fn validate(&self) -> Result<()> {
        if !constants::get_supported_providers().contains(&self.geocoding.provider.as_str()) {
            return Err(PipelineError::Config(format!(
                "Unknown geocoding provider '{}'",
                self.geocoding.provider
            )));
        }
        if self.scoring.success_threshold > self.scoring.high_threshold {
            return Err(PipelineError::Config(
                "success_threshold must not exceed high_threshold".to_string(),
            ));
        }
        Ok(())
    }
}
