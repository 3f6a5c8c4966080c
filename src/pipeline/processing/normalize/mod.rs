pub mod states;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::domain::{InstitutionRecord, RawAddress};

/// Data-quality observations made while cleaning an address. The scorer
/// turns each flag into a confidence penalty, so a record is never rejected
/// here for incomplete data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityFlag {
    MissingPostalCode,
    InvalidPostalCode,
    MissingCity,
    MissingDistrict,
    UnrecognizedState,
    NonStandardSeparators,
    AmbiguousName,
}

impl QualityFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityFlag::MissingPostalCode => "missing_postal_code",
            QualityFlag::InvalidPostalCode => "invalid_postal_code",
            QualityFlag::MissingCity => "missing_city",
            QualityFlag::MissingDistrict => "missing_district",
            QualityFlag::UnrecognizedState => "unrecognized_state",
            QualityFlag::NonStandardSeparators => "non_standard_separators",
            QualityFlag::AmbiguousName => "ambiguous_name",
        }
    }
}

/// The canonical structured form of an address, used both for geocoding
/// queries and as the cache key source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedAddress {
    pub street: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
}

impl NormalizedAddress {
    /// Canonical single-line form: "street, city, district, state, PIN".
    /// Segments equal to their predecessor are dropped so "New Delhi, New
    /// Delhi" style repetition does not reach the provider.
    pub fn canonical(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for part in [
            self.street.as_deref(),
            self.city.as_deref(),
            self.district.as_deref(),
            self.state.as_deref(),
            self.postal_code.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            if parts.last().map(|p| p.eq_ignore_ascii_case(part)) != Some(true) {
                parts.push(part);
            }
        }
        parts.join(", ")
    }

    /// Shortened form used for the one simplified retry after a NoMatch:
    /// drop the street and lean on city/state/PIN alone.
    pub fn simplified(&self) -> Option<String> {
        let parts: Vec<&str> = [
            self.city.as_deref(),
            self.state.as_deref(),
            self.postal_code.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect();
        if parts.len() < 2 {
            return None;
        }
        Some(parts.join(", "))
    }
}

/// An institution record together with its cleaned address and the quality
/// flags observed along the way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedInstitution {
    pub record: InstitutionRecord,
    pub address: NormalizedAddress,
    pub flags: Vec<QualityFlag>,
}

static PIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{6})\b").unwrap());
static ODD_SEPARATORS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\|+|::+|--+|_+").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static REPEAT_COMMA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*,[\s,]*").unwrap());
static DISTRICT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:district|distt\.?|dist\.?)\s*[:\-]?\s*([A-Za-z ]+)").unwrap());

pub struct AddressNormalizer;

impl AddressNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Clean one record's address into its canonical structured form,
    /// collecting data-quality flags as a side effect.
    pub fn normalize(&self, record: &InstitutionRecord) -> NormalizedInstitution {
        let mut flags = Vec::new();
        let raw = &record.raw_address;

        let street = self.clean_segment(raw.street.as_deref(), &mut flags);
        let mut city = self.clean_segment(raw.city.as_deref(), &mut flags);
        let state_raw = self.clean_segment(raw.state.as_deref(), &mut flags);

        // All text fields joined, for recovering components that landed in
        // the wrong column
        let haystack = [street.as_deref(), city.as_deref(), state_raw.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ");

        // Postal code: dedicated column first, then anywhere in the text
        let postal_code = match raw.postal_code.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(code) if PIN_RE.is_match(code) => {
                Some(PIN_RE.find(code).unwrap().as_str().to_string())
            }
            Some(_) => {
                flags.push(QualityFlag::InvalidPostalCode);
                None
            }
            None => match PIN_RE.find(&haystack) {
                Some(m) => Some(m.as_str().to_string()),
                None => {
                    flags.push(QualityFlag::MissingPostalCode);
                    None
                }
            },
        };

        // State: canonicalize the column value, fall back to scanning the
        // full text. Unrecognized values pass through unchanged but flagged.
        let state = match state_raw.as_deref() {
            Some(value) => match states::canonical_state(value) {
                Some(name) => Some(name.to_string()),
                None => match states::find_state_in_text(&haystack) {
                    Some(name) => Some(name.to_string()),
                    None => {
                        flags.push(QualityFlag::UnrecognizedState);
                        Some(value.to_string())
                    }
                },
            },
            None => match states::find_state_in_text(&haystack) {
                Some(name) => Some(name.to_string()),
                None => {
                    flags.push(QualityFlag::UnrecognizedState);
                    None
                }
            },
        };

        // Strip a PIN that leaked into the city column
        city = city.take().and_then(|c| {
            let stripped = PIN_RE.replace_all(&c, "");
            let cleaned = stripped.trim().trim_end_matches(',').trim().to_string();
            if cleaned.is_empty() {
                None
            } else {
                Some(cleaned)
            }
        });
        if city.is_none() {
            flags.push(QualityFlag::MissingCity);
        }

        // District: an explicitly marked segment wins; otherwise fall back
        // to the city (Indian addresses routinely use the district HQ as
        // the city). Flag only when both are absent.
        let district = match DISTRICT_RE.captures(&haystack) {
            Some(caps) => Some(caps[1].trim().to_string()),
            None => match &city {
                Some(c) => Some(c.clone()),
                None => {
                    flags.push(QualityFlag::MissingDistrict);
                    None
                }
            },
        };

        let address = NormalizedAddress {
            street,
            city,
            district,
            state,
            postal_code,
        };

        if !flags.is_empty() {
            debug!(
                institution = %record.name,
                flags = ?flags,
                "address normalized with quality flags"
            );
        }

        NormalizedInstitution {
            record: record.clone(),
            address,
            flags,
        }
    }

    /// Collapse duplicate institutions: records sharing a normalized
    /// (name, address) pair reduce to the one with the most complete fields.
    /// The key uses street and city only, so a duplicate that merely lost
    /// its PIN or state still collapses with its complete twin. Distinct
    /// addresses under a repeated name survive but are flagged ambiguous
    /// (multi-campus bodies confuse providers).
    pub fn dedupe(&self, mut records: Vec<NormalizedInstitution>) -> (Vec<NormalizedInstitution>, usize) {
        let before = records.len();
        let mut by_key: HashMap<(String, String, String), NormalizedInstitution> = HashMap::new();
        for item in records.drain(..) {
            let key = (
                item.record.name.trim().to_lowercase(),
                item.address.street.as_deref().unwrap_or("").to_lowercase(),
                item.address.city.as_deref().unwrap_or("").to_lowercase(),
            );
            match by_key.get(&key) {
                Some(existing) if completeness(existing) >= completeness(&item) => {}
                _ => {
                    by_key.insert(key, item);
                }
            }
        }

        let mut name_counts: HashMap<String, usize> = HashMap::new();
        for (name, _, _) in by_key.keys() {
            *name_counts.entry(name.clone()).or_insert(0) += 1;
        }

        let mut result: Vec<NormalizedInstitution> = by_key.into_values().collect();
        for item in result.iter_mut() {
            let name = item.record.name.trim().to_lowercase();
            if name_counts.get(&name).copied().unwrap_or(0) > 1
                && !item.flags.contains(&QualityFlag::AmbiguousName)
            {
                item.flags.push(QualityFlag::AmbiguousName);
            }
        }
        result.sort_by(|a, b| a.record.name.cmp(&b.record.name));
        let dropped = before - result.len();
        (result, dropped)
    }

    /// Trim a raw field, fold odd separators into commas, and collapse
    /// whitespace. Returns None for empty fields.
    fn clean_segment(&self, raw: Option<&str>, flags: &mut Vec<QualityFlag>) -> Option<String> {
        let raw = raw?.trim();
        if raw.is_empty() {
            return None;
        }
        let mut value = raw.to_string();
        if ODD_SEPARATORS_RE.is_match(&value) {
            if !flags.contains(&QualityFlag::NonStandardSeparators) {
                flags.push(QualityFlag::NonStandardSeparators);
            }
            value = ODD_SEPARATORS_RE.replace_all(&value, ", ").to_string();
        }
        value = WHITESPACE_RE.replace_all(&value, " ").to_string();
        value = REPEAT_COMMA_RE.replace_all(&value, ", ").to_string();
        let value = value.trim().trim_matches(',').trim().to_string();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

impl Default for AddressNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn completeness(item: &NormalizedInstitution) -> usize {
    [
        item.address.street.is_some(),
        item.address.city.is_some(),
        item.address.district.is_some(),
        item.address.state.is_some(),
        item.address.postal_code.is_some(),
    ]
    .iter()
    .filter(|present| **present)
    .count()
}
