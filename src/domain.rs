use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants;

/// An institution as ingested from a source file, plus the geocoding outcome
/// once the record has been through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstitutionRecord {
    /// Stable identifier, assigned at ingestion and immutable afterwards.
    /// Derived as a v5 UUID over the (name, raw address) pair so the same
    /// source row maps to the same id on every run.
    pub institution_id: Uuid,
    pub name: String,
    pub institution_type: InstitutionType,
    pub raw_address: RawAddress,
    /// Absent until the geocoding stage has seen this record
    pub geo: Option<GeoResult>,
}

impl InstitutionRecord {
    pub fn new(name: String, institution_type: InstitutionType, raw_address: RawAddress) -> Self {
        let seed = format!(
            "{}|{}|{}|{}|{}",
            name.trim().to_lowercase(),
            raw_address.street.as_deref().unwrap_or("").trim().to_lowercase(),
            raw_address.city.as_deref().unwrap_or("").trim().to_lowercase(),
            raw_address.state.as_deref().unwrap_or("").trim().to_lowercase(),
            raw_address.postal_code.as_deref().unwrap_or("").trim(),
        );
        let institution_id = Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes());
        Self {
            institution_id,
            name,
            institution_type,
            raw_address,
            geo: None,
        }
    }

    pub fn status(&self) -> GeoStatus {
        self.geo
            .as_ref()
            .map(|g| g.status.clone())
            .unwrap_or(GeoStatus::NotAttempted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstitutionType {
    Private,
    State,
    Central,
    Deemed,
    Other,
}

impl InstitutionType {
    /// Source files spell the type many ways; anything unrecognized is Other.
    pub fn parse(raw: &str) -> Self {
        let lower = raw.trim().to_lowercase();
        if lower.contains("private") {
            InstitutionType::Private
        } else if lower.contains("central") {
            InstitutionType::Central
        } else if lower.contains("deemed") {
            InstitutionType::Deemed
        } else if lower.contains("state") {
            InstitutionType::State
        } else {
            InstitutionType::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstitutionType::Private => "Private",
            InstitutionType::State => "State",
            InstitutionType::Central => "Central",
            InstitutionType::Deemed => "Deemed",
            InstitutionType::Other => "Other",
        }
    }
}

/// Address fields exactly as they appeared in the source file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAddress {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeoStatus {
    Success,
    LowConfidence,
    Failed,
    NotAttempted,
}

impl GeoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeoStatus::Success => "success",
            GeoStatus::LowConfidence => "low_confidence",
            GeoStatus::Failed => "failed",
            GeoStatus::NotAttempted => "not_attempted",
        }
    }
}

/// Outcome of geocoding one institution.
///
/// Constructed only through [`GeoResult::resolved`] and [`GeoResult::failed`]
/// so that a Failed result can never carry coordinates and a Success result
/// always carries in-bounds ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoResult {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub confidence: f64,
    pub source_service: String,
    pub status: GeoStatus,
    pub failure_reason: Option<String>,
    pub geocoded_at: DateTime<Utc>,
}

impl GeoResult {
    /// A result that carries coordinates; status must be Success or
    /// LowConfidence, decided by the scorer.
    pub fn resolved(
        latitude: f64,
        longitude: f64,
        confidence: f64,
        source_service: &str,
        status: GeoStatus,
    ) -> Self {
        debug_assert!(matches!(
            status,
            GeoStatus::Success | GeoStatus::LowConfidence
        ));
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            confidence,
            source_service: source_service.to_string(),
            status,
            failure_reason: None,
            geocoded_at: Utc::now(),
        }
    }

    pub fn failed(source_service: &str, reason: impl Into<String>) -> Self {
        Self {
            latitude: None,
            longitude: None,
            confidence: 0.0,
            source_service: source_service.to_string(),
            status: GeoStatus::Failed,
            failure_reason: Some(reason.into()),
            geocoded_at: Utc::now(),
        }
    }

    pub fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Check that coordinates fall within India's extent
pub fn within_india_bounds(lat: f64, lon: f64) -> bool {
    (constants::INDIA_MIN_LAT..=constants::INDIA_MAX_LAT).contains(&lat)
        && (constants::INDIA_MIN_LON..=constants::INDIA_MAX_LON).contains(&lon)
}
