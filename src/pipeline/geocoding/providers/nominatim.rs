use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{GeocodeError, GeocodeProvider, MatchQuality, ProviderHit};
use crate::constants::NOMINATIM_PROVIDER;

const SEARCH_URL: &str = "https://nominatim.openstreetmap.org/search";
// Nominatim's usage policy requires an identifying User-Agent
const USER_AGENT: &str = "collegelinks/0.1 (institution geocoding pipeline)";

pub struct NominatimProvider {
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    lat: String,
    lon: String,
    #[serde(default)]
    class: String,
    #[serde(default, rename = "type")]
    osm_type: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    address: Option<SearchAddress>,
}

#[derive(Debug, Deserialize)]
struct SearchAddress {
    #[serde(default)]
    postcode: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

impl NominatimProvider {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// OSM tags carry the precision signal: a tagged amenity or building is
    /// a point match, a road is interpolated, a bare place is a centroid.
    fn match_quality(class: &str, osm_type: &str) -> MatchQuality {
        match class {
            "amenity" | "building" | "office" => MatchQuality::Rooftop,
            "highway" => MatchQuality::Interpolated,
            "place" | "boundary" => MatchQuality::Approximate,
            _ => {
                if osm_type == "university" || osm_type == "college" || osm_type == "school" {
                    MatchQuality::Rooftop
                } else {
                    MatchQuality::Unknown
                }
            }
        }
    }
}

#[async_trait]
impl GeocodeProvider for NominatimProvider {
    fn name(&self) -> &'static str {
        NOMINATIM_PROVIDER
    }

    #[instrument(skip(self))]
    async fn lookup(&self, address: &str) -> Result<ProviderHit, GeocodeError> {
        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("q", address),
                ("format", "jsonv2"),
                ("limit", "1"),
                ("countrycodes", "in"),
                ("addressdetails", "1"),
            ])
            .send()
            .await
            .map_err(GeocodeError::from_reqwest)?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(GeocodeError::from_status(status, NOMINATIM_PROVIDER));
        }

        let results: Vec<SearchResult> = response
            .json()
            .await
            .map_err(GeocodeError::from_reqwest)?;
        let Some(top) = results.into_iter().next() else {
            return Err(GeocodeError::NoMatch);
        };

        let latitude: f64 = top.lat.parse().map_err(|_| GeocodeError::Provider {
            message: format!("unparseable latitude '{}'", top.lat),
            transient: false,
        })?;
        let longitude: f64 = top.lon.parse().map_err(|_| GeocodeError::Provider {
            message: format!("unparseable longitude '{}'", top.lon),
            transient: false,
        })?;

        let match_quality = Self::match_quality(&top.class, &top.osm_type);
        debug!(lat = latitude, lon = longitude, ?match_quality, "nominatim hit");

        Ok(ProviderHit {
            latitude,
            longitude,
            match_quality,
            resolved_postal_code: top.address.as_ref().and_then(|a| a.postcode.clone()),
            resolved_state: top.address.as_ref().and_then(|a| a.state.clone()),
            display_name: top.display_name,
        })
    }
}
