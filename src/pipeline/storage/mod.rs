use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{GeoStatus, InstitutionRecord};
use crate::error::Result;

/// Store for the consolidated dataset. Records are upserted by
/// `institution_id`; nothing is ever deleted, re-runs supersede in place.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn upsert(&self, record: &InstitutionRecord) -> Result<()>;
    async fn get(&self, institution_id: Uuid) -> Result<Option<InstitutionRecord>>;
    async fn all(&self) -> Result<Vec<InstitutionRecord>>;
    /// Persist pending writes, if the backend has a durable form
    async fn flush(&self) -> Result<()>;
}

/// Re-run policy: Failed and never-attempted records are always worth
/// another try; Success and LowConfidence are settled unless the caller
/// forces a refresh.
pub fn should_geocode(existing: Option<&InstitutionRecord>, force_refresh: bool) -> bool {
    match existing {
        None => true,
        Some(record) => match record.status() {
            GeoStatus::Failed | GeoStatus::NotAttempted => true,
            GeoStatus::Success | GeoStatus::LowConfidence => force_refresh,
        },
    }
}

/// In-memory store for development and testing
pub struct InMemoryStore {
    records: Mutex<HashMap<Uuid, InstitutionRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultStore for InMemoryStore {
    async fn upsert(&self, record: &InstitutionRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        records.insert(record.institution_id, record.clone());
        debug!("Upserted institution {} ({})", record.name, record.institution_id);
        Ok(())
    }

    async fn get(&self, institution_id: Uuid) -> Result<Option<InstitutionRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records.get(&institution_id).cloned())
    }

    async fn all(&self) -> Result<Vec<InstitutionRecord>> {
        let records = self.records.lock().unwrap();
        let mut all: Vec<InstitutionRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// File-backed store: the whole dataset lives in one JSON snapshot that is
/// loaded on open and rewritten atomically on flush. Good enough for the
/// tens of thousands of records a national institution list holds.
pub struct JsonSnapshotStore {
    path: PathBuf,
    records: Mutex<HashMap<Uuid, InstitutionRecord>>,
}

impl JsonSnapshotStore {
    pub fn open(path: &Path) -> Result<Self> {
        let records = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            let list: Vec<InstitutionRecord> = serde_json::from_str(&raw)?;
            info!("Loaded {} institutions from {}", list.len(), path.display());
            list.into_iter().map(|r| (r.institution_id, r)).collect()
        } else {
            HashMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            records: Mutex::new(records),
        })
    }
}

#[async_trait]
impl ResultStore for JsonSnapshotStore {
    async fn upsert(&self, record: &InstitutionRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        records.insert(record.institution_id, record.clone());
        Ok(())
    }

    async fn get(&self, institution_id: Uuid) -> Result<Option<InstitutionRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records.get(&institution_id).cloned())
    }

    async fn all(&self) -> Result<Vec<InstitutionRecord>> {
        let records = self.records.lock().unwrap();
        let mut all: Vec<InstitutionRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    /// Write via a temp file and rename, so a crash mid-write never leaves
    /// a truncated snapshot behind.
    async fn flush(&self) -> Result<()> {
        let list = self.all().await?;
        let json = serde_json::to_string_pretty(&list)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("Flushed {} institutions to {}", list.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GeoResult, InstitutionType, RawAddress};

    fn record(name: &str) -> InstitutionRecord {
        InstitutionRecord::new(
            name.to_string(),
            InstitutionType::Private,
            RawAddress {
                street: Some("Main Road".to_string()),
                city: Some("Pune".to_string()),
                state: Some("Maharashtra".to_string()),
                postal_code: Some("411001".to_string()),
            },
        )
    }

    #[tokio::test]
    async fn test_upsert_supersedes_by_id() {
        let store = InMemoryStore::new();
        let mut r = record("ABC College");
        store.upsert(&r).await.unwrap();

        r.geo = Some(GeoResult::failed("nominatim", "timeout"));
        store.upsert(&r).await.unwrap();

        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status(), GeoStatus::Failed);
    }

    #[test]
    fn test_rerun_policy() {
        let fresh = record("A");
        assert!(should_geocode(None, false));
        assert!(should_geocode(Some(&fresh), false)); // never attempted

        let mut failed = record("B");
        failed.geo = Some(GeoResult::failed("nominatim", "no match"));
        assert!(should_geocode(Some(&failed), false));

        let mut ok = record("C");
        ok.geo = Some(GeoResult::resolved(28.6, 77.2, 0.9, "nominatim", GeoStatus::Success));
        assert!(!should_geocode(Some(&ok), false));
        assert!(should_geocode(Some(&ok), true));

        let mut low = record("D");
        low.geo = Some(GeoResult::resolved(28.6, 77.2, 0.5, "nominatim", GeoStatus::LowConfidence));
        assert!(!should_geocode(Some(&low), false));
    }

    #[tokio::test]
    async fn test_json_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");

        {
            let store = JsonSnapshotStore::open(&path).unwrap();
            let mut r = record("ABC College");
            r.geo = Some(GeoResult::resolved(18.52, 73.85, 0.85, "nominatim", GeoStatus::Success));
            store.upsert(&r).await.unwrap();
            store.flush().await.unwrap();
        }

        let reopened = JsonSnapshotStore::open(&path).unwrap();
        let all = reopened.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "ABC College");
        assert_eq!(all[0].status(), GeoStatus::Success);
    }
}
