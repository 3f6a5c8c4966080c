/// Provider name constants to ensure consistency across the codebase.
/// These are the values stored in `GeoResult::source_service` and accepted
/// by the `--provider` CLI flag.

pub const NOMINATIM_PROVIDER: &str = "nominatim";
pub const GOOGLE_PROVIDER: &str = "google";

/// India's bounding box, used by the validator to reject out-of-country
/// matches and provider placeholder coordinates like (0, 0).
pub const INDIA_MIN_LAT: f64 = 6.554_607_9;
pub const INDIA_MAX_LAT: f64 = 35.674_545_7;
pub const INDIA_MIN_LON: f64 = 68.111_378_7;
pub const INDIA_MAX_LON: f64 = 97.395_561;

// Default artifact names under the output directory
pub const RESULTS_SNAPSHOT_FILE: &str = "results.json";
pub const GEOCODE_CACHE_FILE: &str = "geocode_cache.json";
pub const TABULAR_EXPORT_FILE: &str = "institutions.csv";
pub const GEOJSON_EXPORT_FILE: &str = "institutions.geojson";

/// Get all supported provider names
pub fn get_supported_providers() -> Vec<&'static str> {
    vec![NOMINATIM_PROVIDER, GOOGLE_PROVIDER]
}
