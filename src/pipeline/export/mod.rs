use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::domain::{GeoStatus, InstitutionRecord};
use crate::error::Result;
use crate::pipeline::processing::scoring::ConfidenceScorer;

/// GeoJSON output shapes. Only the subset of the format the map layer
/// consumes: point features with flat properties.
#[derive(Debug, Serialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    kind: &'static str,
    features: Vec<Feature>,
}

#[derive(Debug, Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
    geometry: Geometry,
    properties: FeatureProperties,
}

#[derive(Debug, Serialize)]
struct Geometry {
    #[serde(rename = "type")]
    kind: &'static str,
    /// GeoJSON ordering: [longitude, latitude]
    coordinates: [f64; 2],
}

#[derive(Debug, Serialize)]
struct FeatureProperties {
    id: String,
    name: String,
    #[serde(rename = "type")]
    institution_type: String,
    address: String,
    latitude: f64,
    longitude: f64,
    confidence: f64,
    low_confidence: bool,
}

/// Write both export artifacts. Each goes through a temp file and an atomic
/// rename so a failed run never publishes a partial dataset.
pub fn export_all(
    records: &[InstitutionRecord],
    scorer: &ConfidenceScorer,
    csv_path: &Path,
    geojson_path: &Path,
) -> Result<()> {
    export_tabular(records, scorer, csv_path)?;
    export_geojson(records, geojson_path)?;
    Ok(())
}

/// One row per institution with every record and geo field, for spreadsheet
/// review of the full dataset including failures.
pub fn export_tabular(
    records: &[InstitutionRecord],
    scorer: &ConfidenceScorer,
    path: &Path,
) -> Result<()> {
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record([
            "institution_id",
            "name",
            "type",
            "street",
            "city",
            "state",
            "postal_code",
            "latitude",
            "longitude",
            "confidence",
            "confidence_band",
            "status",
            "source_service",
            "failure_reason",
            "geocoded_at",
        ])?;

        for record in records {
            let geo = record.geo.as_ref();
            let fmt_coord = |c: Option<f64>| c.map(|v| format!("{:.7}", v)).unwrap_or_default();
            let band = geo
                .filter(|g| g.has_coordinates())
                .map(|g| scorer.band(g.confidence).as_str().to_string())
                .unwrap_or_default();
            writer.write_record([
                record.institution_id.to_string(),
                record.name.clone(),
                record.institution_type.as_str().to_string(),
                record.raw_address.street.clone().unwrap_or_default(),
                record.raw_address.city.clone().unwrap_or_default(),
                record.raw_address.state.clone().unwrap_or_default(),
                record.raw_address.postal_code.clone().unwrap_or_default(),
                fmt_coord(geo.and_then(|g| g.latitude)),
                fmt_coord(geo.and_then(|g| g.longitude)),
                geo.map(|g| format!("{:.2}", g.confidence)).unwrap_or_default(),
                band,
                record.status().as_str().to_string(),
                geo.map(|g| g.source_service.clone()).unwrap_or_default(),
                geo.and_then(|g| g.failure_reason.clone()).unwrap_or_default(),
                geo.map(|g| g.geocoded_at.to_rfc3339()).unwrap_or_default(),
            ])?;
        }
        writer.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    info!("Wrote tabular export: {} ({} rows)", path.display(), records.len());
    Ok(())
}

/// One point feature per geocoded institution. Failed and unattempted
/// records carry no coordinates and never appear here.
pub fn export_geojson(records: &[InstitutionRecord], path: &Path) -> Result<()> {
    let features: Vec<Feature> = records
        .iter()
        .filter_map(|record| {
            let geo = record.geo.as_ref()?;
            if !matches!(geo.status, GeoStatus::Success | GeoStatus::LowConfidence) {
                return None;
            }
            let (lat, lon) = (geo.latitude?, geo.longitude?);
            Some(Feature {
                kind: "Feature",
                geometry: Geometry {
                    kind: "Point",
                    coordinates: [lon, lat],
                },
                properties: FeatureProperties {
                    id: record.institution_id.to_string(),
                    name: record.name.clone(),
                    institution_type: record.institution_type.as_str().to_string(),
                    address: [
                        record.raw_address.street.as_deref(),
                        record.raw_address.city.as_deref(),
                        record.raw_address.state.as_deref(),
                        record.raw_address.postal_code.as_deref(),
                    ]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(", "),
                    latitude: lat,
                    longitude: lon,
                    confidence: geo.confidence,
                    low_confidence: geo.status == GeoStatus::LowConfidence,
                },
            })
        })
        .collect();

    let collection = FeatureCollection {
        kind: "FeatureCollection",
        features,
    };

    let tmp = path.with_extension("geojson.tmp");
    std::fs::write(&tmp, serde_json::to_string_pretty(&collection)?)?;
    std::fs::rename(&tmp, path)?;
    info!(
        "Wrote geospatial export: {} ({} features)",
        path.display(),
        collection.features.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::domain::{GeoResult, InstitutionType, RawAddress};

    fn record(name: &str, geo: Option<GeoResult>) -> InstitutionRecord {
        let mut r = InstitutionRecord::new(
            name.to_string(),
            InstitutionType::Private,
            RawAddress {
                street: Some("Connaught Place".to_string()),
                city: Some("New Delhi".to_string()),
                state: Some("Delhi".to_string()),
                postal_code: Some("110001".to_string()),
            },
        );
        r.geo = geo;
        r
    }

    #[test]
    fn test_failed_records_excluded_from_geojson() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.geojson");
        let records = vec![
            record(
                "Good College",
                Some(GeoResult::resolved(28.63, 77.22, 0.9, "nominatim", GeoStatus::Success)),
            ),
            record(
                "Flagged College",
                Some(GeoResult::resolved(22.57, 88.36, 0.5, "nominatim", GeoStatus::LowConfidence)),
            ),
            record("Bad College", Some(GeoResult::failed("nominatim", "no match"))),
            record("Untouched College", None),
        ];

        export_geojson(&records, &path).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let features = parsed["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);

        let names: Vec<&str> = features
            .iter()
            .map(|f| f["properties"]["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"Good College"));
        assert!(names.contains(&"Flagged College"));

        let flagged = features
            .iter()
            .find(|f| f["properties"]["name"] == "Flagged College")
            .unwrap();
        assert_eq!(flagged["properties"]["low_confidence"], true);
        // GeoJSON positions are [lon, lat]
        let good = features
            .iter()
            .find(|f| f["properties"]["name"] == "Good College")
            .unwrap();
        assert_eq!(good["geometry"]["coordinates"][0], 77.22);
    }

    #[test]
    fn test_tabular_export_includes_all_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let scorer = ConfidenceScorer::new(ScoringConfig::default());
        let records = vec![
            record(
                "Good College",
                Some(GeoResult::resolved(28.63, 77.22, 0.9, "nominatim", GeoStatus::Success)),
            ),
            record("Bad College", Some(GeoResult::failed("nominatim", "timed out"))),
        ];

        export_tabular(&records, &scorer, &path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3); // header + 2 rows
        assert!(lines[1].contains("high") || lines[2].contains("high"));
        let bad_line = lines.iter().find(|l| l.contains("Bad College")).unwrap();
        assert!(bad_line.contains("failed"));
        assert!(bad_line.contains("timed out"));
        // Failed rows carry no coordinates
        assert!(!bad_line.contains("28.63"));
    }
}
