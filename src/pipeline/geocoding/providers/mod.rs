pub mod google;
pub mod nominatim;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Match quality reported by a provider, mapped from each provider's own
/// vocabulary so the scorer never sees provider-specific shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchQuality {
    /// Exact building/point match
    Rooftop,
    /// Interpolated along a road segment
    Interpolated,
    /// Locality or area centroid
    Approximate,
    Unknown,
}

/// Provider-agnostic geocoding hit
#[derive(Debug, Clone)]
pub struct ProviderHit {
    pub latitude: f64,
    pub longitude: f64,
    pub match_quality: MatchQuality,
    pub resolved_postal_code: Option<String>,
    pub resolved_state: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("request timed out")]
    Timeout,

    #[error("no match found for address")]
    NoMatch,

    #[error("provider error: {message}")]
    Provider { message: String, transient: bool },
}

impl GeocodeError {
    /// Transient failures are worth retrying with backoff; everything else
    /// (malformed address, provider 4xx, empty result) is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            GeocodeError::RateLimitExceeded | GeocodeError::Timeout => true,
            GeocodeError::Provider { transient, .. } => *transient,
            GeocodeError::NoMatch => false,
        }
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GeocodeError::Timeout
        } else {
            GeocodeError::Provider {
                message: e.to_string(),
                transient: e.is_connect(),
            }
        }
    }

    pub(crate) fn from_status(status: u16, provider: &str) -> Self {
        if status == 429 {
            GeocodeError::RateLimitExceeded
        } else {
            GeocodeError::Provider {
                message: format!("{} returned HTTP {}", provider, status),
                transient: status >= 500,
            }
        }
    }
}

/// One adapter per external geocoding service. Adding a provider means
/// implementing this trait; the scorer and store never change.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    /// Stable provider name, recorded in `GeoResult::source_service`
    fn name(&self) -> &'static str;

    /// Resolve a canonical address string to coordinates
    async fn lookup(&self, address: &str) -> Result<ProviderHit, GeocodeError>;
}
