use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::domain::GeoResult;
use crate::error::Result;

/// One cached geocoding outcome, keyed by normalized address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeCacheEntry {
    pub result: GeoResult,
    pub cached_at: DateTime<Utc>,
}

/// In-process cache of scored geocoding results. Entries never expire within
/// a run; a JSON snapshot carries them across runs, with stale entries
/// filtered out at load time.
#[derive(Debug, Default)]
pub struct GeocodeCache {
    entries: Mutex<HashMap<String, GeocodeCacheEntry>>,
}

/// Cache key: SHA-256 of the lowercased canonical address, so the snapshot
/// file never contains raw addresses as keys and casing differences collapse.
pub fn cache_key(canonical_address: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_address.trim().to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}

impl GeocodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, canonical_address: &str) -> Option<GeoResult> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(&cache_key(canonical_address))
            .map(|e| e.result.clone())
    }

    /// Last write wins; results for the same address are idempotent so
    /// concurrent writers are benign.
    pub fn insert(&self, canonical_address: &str, result: GeoResult) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            cache_key(canonical_address),
            GeocodeCacheEntry {
                result,
                cached_at: Utc::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load a snapshot written by a previous run, dropping entries older
    /// than `max_age_days`. A missing or unreadable snapshot is not fatal;
    /// the run just starts with a cold cache.
    pub fn load_snapshot(&self, path: &Path, max_age_days: i64) {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return,
        };
        let parsed: HashMap<String, GeocodeCacheEntry> = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Ignoring unreadable cache snapshot {}: {}", path.display(), e);
                return;
            }
        };
        let cutoff = Utc::now() - Duration::days(max_age_days);
        let mut entries = self.entries.lock().unwrap();
        let mut loaded = 0usize;
        for (key, entry) in parsed {
            if entry.cached_at >= cutoff {
                entries.insert(key, entry);
                loaded += 1;
            }
        }
        info!("Loaded {} cached geocoding results from {}", loaded, path.display());
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let entries = self.entries.lock().unwrap();
        let json = serde_json::to_string_pretty(&*entries)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GeoResult, GeoStatus};

    #[test]
    fn test_hit_after_insert() {
        let cache = GeocodeCache::new();
        let result = GeoResult::resolved(28.63, 77.22, 0.9, "nominatim", GeoStatus::Success);
        cache.insert("Connaught Place, New Delhi, Delhi, 110001", result);

        let hit = cache.get("Connaught Place, New Delhi, Delhi, 110001");
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().latitude, Some(28.63));
    }

    #[test]
    fn test_key_is_case_insensitive() {
        assert_eq!(cache_key("MG Road, Bengaluru"), cache_key("mg road, bengaluru"));
        assert_ne!(cache_key("MG Road, Bengaluru"), cache_key("MG Road, Mysuru"));
    }

    #[test]
    fn test_miss_for_unknown_address() {
        let cache = GeocodeCache::new();
        assert!(cache.get("nowhere").is_none());
    }

    #[test]
    fn test_snapshot_round_trip_and_staleness() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geocode_cache.json");

        let cache = GeocodeCache::new();
        cache.insert(
            "fresh address",
            GeoResult::resolved(20.0, 80.0, 0.8, "nominatim", GeoStatus::Success),
        );
        cache.save_snapshot(&path).unwrap();

        // Age one entry past the cutoff by editing the snapshot directly
        let mut parsed: HashMap<String, GeocodeCacheEntry> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let stale = GeocodeCacheEntry {
            result: GeoResult::resolved(21.0, 81.0, 0.8, "nominatim", GeoStatus::Success),
            cached_at: Utc::now() - Duration::days(45),
        };
        parsed.insert(cache_key("stale address"), stale);
        std::fs::write(&path, serde_json::to_string(&parsed).unwrap()).unwrap();

        let reloaded = GeocodeCache::new();
        reloaded.load_snapshot(&path, 30);
        assert!(reloaded.get("fresh address").is_some());
        assert!(reloaded.get("stale address").is_none());
    }
}
