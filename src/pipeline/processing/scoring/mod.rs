use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ScoringConfig;
use crate::domain::{within_india_bounds, GeoResult, GeoStatus};
use crate::pipeline::geocoding::providers::{MatchQuality, ProviderHit};
use crate::pipeline::processing::normalize::QualityFlag;

/// Confidence bands reported in the tabular export. High and Medium are
/// both Success; Low is retained for manual review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceBand::High => "high",
            ConfidenceBand::Medium => "medium",
            ConfidenceBand::Low => "low",
        }
    }
}

/// Keywords that mark a provider hit as an educational place, worth a small
/// confidence bonus (carried over from the source data's vocabulary).
const EDUCATION_KEYWORDS: &[&str] = &[
    "university",
    "college",
    "institute",
    "school",
    "campus",
    "polytechnic",
    "academy",
    "vishwavidyalaya",
    "mahavidyalaya",
    "vidyalaya",
    "vidyapeeth",
];

/// Computes a confidence score for a provider hit and validates the
/// coordinates, producing the final `GeoResult`.
pub struct ConfidenceScorer {
    config: ScoringConfig,
}

impl ConfidenceScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Score a raw provider hit against the record's data-quality flags.
    /// The bounds check runs first and overrides everything: out-of-country
    /// coordinates are a hard failure no matter what the provider claims.
    pub fn score(
        &self,
        hit: &ProviderHit,
        flags: &[QualityFlag],
        record_postal_code: Option<&str>,
        source_service: &str,
    ) -> GeoResult {
        if !within_india_bounds(hit.latitude, hit.longitude) {
            debug!(
                lat = hit.latitude,
                lon = hit.longitude,
                "coordinates outside India bounding box"
            );
            return GeoResult::failed(
                source_service,
                format!(
                    "coordinates ({:.4}, {:.4}) outside India bounding box",
                    hit.latitude, hit.longitude
                ),
            );
        }

        let mut confidence = self.base_confidence(hit.match_quality);

        // Provider echoing the record's PIN is strong agreement
        if let (Some(resolved), Some(expected)) = (hit.resolved_postal_code.as_deref(), record_postal_code) {
            if resolved == expected {
                confidence += 0.05;
            }
        }
        if self.mentions_education(hit) {
            confidence += 0.05;
        }

        for flag in flags {
            confidence -= self.penalty(*flag);
        }
        let confidence = confidence.clamp(0.0, 1.0);

        let status = if confidence >= self.config.success_threshold {
            GeoStatus::Success
        } else {
            GeoStatus::LowConfidence
        };

        GeoResult::resolved(hit.latitude, hit.longitude, confidence, source_service, status)
    }

    pub fn band(&self, confidence: f64) -> ConfidenceBand {
        if confidence >= self.config.high_threshold {
            ConfidenceBand::High
        } else if confidence >= self.config.success_threshold {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }

    fn base_confidence(&self, quality: MatchQuality) -> f64 {
        match quality {
            MatchQuality::Rooftop => 0.95,
            MatchQuality::Interpolated => 0.85,
            MatchQuality::Approximate => 0.70,
            MatchQuality::Unknown => 0.60,
        }
    }

    /// Penalty weights per data-quality flag. Weights chosen for this
    /// implementation; the rationale lives in DESIGN.md.
    fn penalty(&self, flag: QualityFlag) -> f64 {
        match flag {
            QualityFlag::MissingPostalCode => 0.10,
            QualityFlag::InvalidPostalCode => 0.10,
            QualityFlag::MissingCity => 0.10,
            QualityFlag::MissingDistrict => 0.05,
            QualityFlag::UnrecognizedState => 0.15,
            QualityFlag::AmbiguousName => 0.10,
            QualityFlag::NonStandardSeparators => 0.02,
        }
    }

    fn mentions_education(&self, hit: &ProviderHit) -> bool {
        let Some(display) = hit.display_name.as_deref() else {
            return false;
        };
        let lower = display.to_lowercase();
        EDUCATION_KEYWORDS.iter().any(|kw| lower.contains(kw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(lat: f64, lon: f64, quality: MatchQuality) -> ProviderHit {
        ProviderHit {
            latitude: lat,
            longitude: lon,
            match_quality: quality,
            resolved_postal_code: None,
            resolved_state: None,
            display_name: None,
        }
    }

    fn scorer() -> ConfidenceScorer {
        ConfidenceScorer::new(ScoringConfig::default())
    }

    #[test]
    fn test_exact_match_with_clean_address_is_high_confidence() {
        let result = scorer().score(&hit(28.63, 77.22, MatchQuality::Rooftop), &[], Some("110001"), "nominatim");
        assert_eq!(result.status, GeoStatus::Success);
        assert!(result.confidence >= 0.8);
        assert_eq!(result.latitude, Some(28.63));
    }

    #[test]
    fn test_flags_reduce_confidence_to_low_band() {
        let flags = [
            QualityFlag::MissingPostalCode,
            QualityFlag::AmbiguousName,
        ];
        let result = scorer().score(&hit(22.57, 88.36, MatchQuality::Approximate), &flags, None, "nominatim");
        // 0.70 - 0.10 - 0.10 = 0.50, below the success threshold
        assert_eq!(result.status, GeoStatus::LowConfidence);
        assert!(result.has_coordinates());
        assert!((result.confidence - 0.50).abs() < 1e-9);
    }

    #[test]
    fn test_placeholder_origin_coordinates_fail_bounds_check() {
        let result = scorer().score(&hit(0.0, 0.0, MatchQuality::Rooftop), &[], None, "google");
        assert_eq!(result.status, GeoStatus::Failed);
        assert!(!result.has_coordinates());
        assert!(result.failure_reason.unwrap().contains("bounding box"));
    }

    #[test]
    fn test_out_of_country_match_fails_regardless_of_quality() {
        // London, confidently wrong
        let result = scorer().score(&hit(51.5074, -0.1278, MatchQuality::Rooftop), &[], None, "google");
        assert_eq!(result.status, GeoStatus::Failed);
    }

    #[test]
    fn test_postal_code_agreement_adds_bonus() {
        let mut h = hit(12.97, 77.59, MatchQuality::Approximate);
        h.resolved_postal_code = Some("560001".to_string());
        let with_bonus = scorer().score(&h, &[], Some("560001"), "nominatim");
        let without = scorer().score(&hit(12.97, 77.59, MatchQuality::Approximate), &[], None, "nominatim");
        assert!(with_bonus.confidence > without.confidence);
    }

    #[test]
    fn test_education_keyword_adds_bonus() {
        let mut h = hit(12.97, 77.59, MatchQuality::Approximate);
        h.display_name = Some("Indian Institute of Science, Bengaluru".to_string());
        let result = scorer().score(&h, &[], None, "nominatim");
        assert!((result.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_bands() {
        let s = scorer();
        assert_eq!(s.band(0.9), ConfidenceBand::High);
        assert_eq!(s.band(0.7), ConfidenceBand::Medium);
        assert_eq!(s.band(0.5), ConfidenceBand::Low);
    }
}
