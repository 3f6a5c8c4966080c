use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{GeocodeError, GeocodeProvider, MatchQuality, ProviderHit};
use crate::constants::GOOGLE_PROVIDER;
use crate::error::{PipelineError, Result as CrateResult};

const GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
pub const API_KEY_ENV: &str = "GOOGLE_MAPS_API_KEY";

pub struct GoogleProvider {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
    #[serde(default)]
    formatted_address: Option<String>,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
    #[serde(default)]
    location_type: String,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct AddressComponent {
    long_name: String,
    types: Vec<String>,
}

impl GoogleProvider {
    /// The key comes from the environment (loaded via dotenv in main), never
    /// from config files that might get committed.
    pub fn from_env(timeout: Duration) -> CrateResult<Self> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| {
            PipelineError::Config(format!(
                "Google provider selected but {} is not set",
                API_KEY_ENV
            ))
        })?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, api_key })
    }

    fn match_quality(location_type: &str) -> MatchQuality {
        match location_type {
            "ROOFTOP" => MatchQuality::Rooftop,
            "RANGE_INTERPOLATED" => MatchQuality::Interpolated,
            "GEOMETRIC_CENTER" | "APPROXIMATE" => MatchQuality::Approximate,
            _ => MatchQuality::Unknown,
        }
    }

    fn component<'a>(result: &'a GeocodeResult, wanted: &str) -> Option<&'a str> {
        result
            .address_components
            .iter()
            .find(|c| c.types.iter().any(|t| t == wanted))
            .map(|c| c.long_name.as_str())
    }
}

#[async_trait]
impl GeocodeProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        GOOGLE_PROVIDER
    }

    #[instrument(skip(self))]
    async fn lookup(&self, address: &str) -> Result<ProviderHit, GeocodeError> {
        let response = self
            .client
            .get(GEOCODE_URL)
            .query(&[
                ("address", address),
                ("key", self.api_key.as_str()),
                // Bias results to India
                ("region", "in"),
            ])
            .send()
            .await
            .map_err(GeocodeError::from_reqwest)?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(GeocodeError::from_status(status, GOOGLE_PROVIDER));
        }

        let body: GeocodeResponse = response.json().await.map_err(GeocodeError::from_reqwest)?;
        match body.status.as_str() {
            "OK" => {}
            "ZERO_RESULTS" => return Err(GeocodeError::NoMatch),
            "OVER_QUERY_LIMIT" => return Err(GeocodeError::RateLimitExceeded),
            other => {
                return Err(GeocodeError::Provider {
                    message: format!(
                        "google status {}: {}",
                        other,
                        body.error_message.unwrap_or_default()
                    ),
                    // UNKNOWN_ERROR is documented as retryable
                    transient: other == "UNKNOWN_ERROR",
                });
            }
        }

        let Some(top) = body.results.into_iter().next() else {
            return Err(GeocodeError::NoMatch);
        };

        let match_quality = Self::match_quality(&top.geometry.location_type);
        debug!(
            lat = top.geometry.location.lat,
            lon = top.geometry.location.lng,
            ?match_quality,
            "google hit"
        );

        Ok(ProviderHit {
            latitude: top.geometry.location.lat,
            longitude: top.geometry.location.lng,
            match_quality,
            resolved_postal_code: Self::component(&top, "postal_code").map(str::to_string),
            resolved_state: Self::component(&top, "administrative_area_level_1").map(str::to_string),
            display_name: top.formatted_address.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_quality_mapping() {
        assert_eq!(GoogleProvider::match_quality("ROOFTOP"), MatchQuality::Rooftop);
        assert_eq!(
            GoogleProvider::match_quality("RANGE_INTERPOLATED"),
            MatchQuality::Interpolated
        );
        assert_eq!(
            GoogleProvider::match_quality("APPROXIMATE"),
            MatchQuality::Approximate
        );
        assert_eq!(GoogleProvider::match_quality(""), MatchQuality::Unknown);
    }

    #[test]
    fn test_response_parsing_extracts_components() {
        let body = r#"{
            "status": "OK",
            "results": [{
                "geometry": {"location": {"lat": 28.6315, "lng": 77.2167}, "location_type": "ROOFTOP"},
                "formatted_address": "Connaught Place, New Delhi, Delhi 110001, India",
                "address_components": [
                    {"long_name": "110001", "short_name": "110001", "types": ["postal_code"]},
                    {"long_name": "Delhi", "short_name": "DL", "types": ["administrative_area_level_1", "political"]}
                ]
            }]
        }"#;
        let parsed: GeocodeResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.status, "OK");
        let top = &parsed.results[0];
        assert_eq!(GoogleProvider::component(top, "postal_code"), Some("110001"));
        assert_eq!(
            GoogleProvider::component(top, "administrative_area_level_1"),
            Some("Delhi")
        );
    }
}
