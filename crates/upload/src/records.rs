//! Local store of uploaded records.
//!
//! Keeps, per server host, the records returned by successful non-duplicate
//! uploads so they can be deleted later with their token. Cached in memory
//! and persisted to a JSON file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use mediavault_protocol::FinalizeRecord;
use tracing::debug;

use crate::error::UploadError;

type RecordMap = BTreeMap<String, Vec<FinalizeRecord>>;

pub struct RecordStore {
    path: PathBuf,
    records: RwLock<RecordMap>,
}

impl RecordStore {
    /// Opens the store, loading existing records from disk.
    pub fn new(path: PathBuf) -> Result<Self, UploadError> {
        let records = load_records(&path)?;
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a record for `host`. An existing record with the same id is
    /// replaced in place.
    pub fn add(&self, host: &str, record: FinalizeRecord) -> Result<(), UploadError> {
        {
            let mut map = self.records.write().unwrap();
            let list = map.entry(host.to_string()).or_default();
            match list.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => list.push(record),
            }
        }
        self.persist()
    }

    /// Records for `host`, oldest first.
    pub fn list(&self, host: &str) -> Vec<FinalizeRecord> {
        self.records
            .read()
            .unwrap()
            .get(host)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get(&self, host: &str, id: &str) -> Option<FinalizeRecord> {
        self.records
            .read()
            .unwrap()
            .get(host)
            .and_then(|list| list.iter().find(|r| r.id == id).cloned())
    }

    /// Removes a record. Returns whether it existed.
    pub fn remove(&self, host: &str, id: &str) -> Result<bool, UploadError> {
        let removed = {
            let mut map = self.records.write().unwrap();
            let Some(list) = map.get_mut(host) else {
                return Ok(false);
            };
            let before = list.len();
            list.retain(|r| r.id != id);
            let removed = list.len() != before;
            if list.is_empty() {
                map.remove(host);
            }
            removed
        };
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Hosts with at least one record.
    pub fn hosts(&self) -> Vec<String> {
        self.records.read().unwrap().keys().cloned().collect()
    }

    /// Writes the current records to disk.
    fn persist(&self) -> Result<(), UploadError> {
        let map = self.records.read().unwrap();
        let json = serde_json::to_string_pretty(&*map)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)?;
        debug!("persisted records for {} host(s) to {:?}", map.len(), self.path);
        Ok(())
    }
}

fn load_records(path: &Path) -> Result<RecordMap, UploadError> {
    if !path.exists() {
        return Ok(RecordMap::new());
    }
    let data = std::fs::read_to_string(path)?;
    let records: RecordMap = serde_json::from_str(&data)?;
    debug!("loaded records for {} host(s) from {:?}", records.len(), path);
    Ok(records)
}

/// Returns the default record store path.
pub fn default_records_path() -> Option<PathBuf> {
    data_dir().map(|d| d.join("mediavault").join("records.json"))
}

/// Returns the platform-specific data directory.
fn data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_DATA_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".local").join("share"))
            })
    }
}
