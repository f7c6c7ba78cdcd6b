//! Document store over JSON collections

use super::{DocumentSource, RiskStore, StoreError};
use crate::data::{EventDocument, ProfileDocument, UserId};
use crate::error::Result;
use crate::fusion::RiskRecord;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

pub const EVENTS_FILE: &str = "events.json";
pub const PROFILES_FILE: &str = "profiles.json";
pub const RECORDS_FILE: &str = "risk_records.json";

/// Event, profile and risk-record collections
///
/// Without a root directory everything lives in memory. With one, each
/// collection is a JSON array file that is rewritten atomically after every
/// change.
///
/// Every record swap rewrites the whole `risk_records.json` under the
/// records write lock, so a batch of N users costs N full rewrites and the
/// parallel writers in a run serialize on that lock. A swap that returned
/// `Ok` is on disk. Suited to the corpus sizes of a single deployment; a
/// store for larger populations implements [`RiskStore`] with per-record
/// writes.
#[derive(Debug, Default)]
pub struct DocumentStore {
    root: Option<PathBuf>,
    events: RwLock<Vec<EventDocument>>,
    profiles: RwLock<Vec<ProfileDocument>>,
    records: RwLock<BTreeMap<UserId, RiskRecord>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn load_collection<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&content)?)
}

/// Write to a sibling temp file, then rename over the target
fn write_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> std::result::Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl DocumentStore {
    /// In-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or create) a store directory
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let events: Vec<EventDocument> = load_collection(&root.join(EVENTS_FILE))?;
        let profiles: Vec<ProfileDocument> = load_collection(&root.join(PROFILES_FILE))?;
        let records: Vec<RiskRecord> = load_collection(&root.join(RECORDS_FILE))?;

        info!(
            path = %root.display(),
            event_documents = events.len(),
            profiles = profiles.len(),
            records = records.len(),
            "Document store opened"
        );

        Ok(Self {
            root: Some(root),
            events: RwLock::new(events),
            profiles: RwLock::new(profiles),
            records: RwLock::new(
                records
                    .into_iter()
                    .map(|r| (r.user_id.clone(), r))
                    .collect(),
            ),
        })
    }

    fn flush<T: Serialize + ?Sized>(
        &self,
        file: &str,
        value: &T,
    ) -> std::result::Result<(), StoreError> {
        match &self.root {
            Some(root) => write_atomic(&root.join(file), value),
            None => Ok(()),
        }
    }

    /// Append an access-event document
    pub fn insert_event_document(&self, doc: EventDocument) -> Result<()> {
        let mut events = write(&self.events);
        events.push(doc);
        if let Err(e) = self.flush(EVENTS_FILE, &*events) {
            events.pop();
            return Err(e.into());
        }
        Ok(())
    }

    /// Insert or replace the profile document of a user
    pub fn upsert_profile(&self, doc: ProfileDocument) -> Result<()> {
        let mut profiles = write(&self.profiles);
        let previous = profiles.clone();
        profiles.retain(|p| p.user_id != doc.user_id);
        profiles.push(doc);
        if let Err(e) = self.flush(PROFILES_FILE, &*profiles) {
            *profiles = previous;
            return Err(e.into());
        }
        Ok(())
    }

    /// Record a satisfaction rating on a user's profile, creating a bare
    /// profile if the user has none
    pub fn set_satisfaction(&self, user_id: &UserId, rating: &str) -> Result<()> {
        let mut profiles = write(&self.profiles);
        let previous = profiles.clone();

        match profiles.iter_mut().rev().find(|p| &p.user_id == user_id) {
            Some(profile) => profile.satisfaction = Some(rating.to_string()),
            None => {
                let mut profile = ProfileDocument::with_answers(user_id.clone(), Vec::new());
                profile.satisfaction = Some(rating.to_string());
                profiles.push(profile);
            }
        }

        if let Err(e) = self.flush(PROFILES_FILE, &*profiles) {
            *profiles = previous;
            return Err(e.into());
        }

        debug!(user_id = %user_id, rating, "Satisfaction recorded");
        Ok(())
    }

    pub fn profile(&self, user_id: &UserId) -> Option<ProfileDocument> {
        read(&self.profiles)
            .iter()
            .rev()
            .find(|p| &p.user_id == user_id)
            .cloned()
    }
}

impl DocumentSource for DocumentStore {
    fn event_documents(&self) -> Result<Vec<EventDocument>> {
        Ok(read(&self.events).clone())
    }

    fn profile_documents(&self) -> Result<Vec<ProfileDocument>> {
        Ok(read(&self.profiles).clone())
    }
}

impl RiskStore for DocumentStore {
    fn get_record(&self, user_id: &UserId) -> std::result::Result<Option<RiskRecord>, StoreError> {
        Ok(read(&self.records).get(user_id).cloned())
    }

    fn compare_and_swap(
        &self,
        expected: Option<&RiskRecord>,
        record: RiskRecord,
    ) -> std::result::Result<(), StoreError> {
        let mut records = write(&self.records);
        let user_id = record.user_id.clone();

        if records.get(&user_id) != expected {
            return Err(StoreError::Conflict(user_id));
        }

        let previous = records.insert(user_id.clone(), record);
        let flushed = match &self.root {
            Some(_) => {
                let all: Vec<&RiskRecord> = records.values().collect();
                self.flush(RECORDS_FILE, &all)
            }
            None => Ok(()),
        };

        if let Err(e) = flushed {
            match previous {
                Some(old) => records.insert(user_id, old),
                None => records.remove(&user_id),
            };
            return Err(e);
        }

        Ok(())
    }

    fn records(&self) -> std::result::Result<Vec<RiskRecord>, StoreError> {
        Ok(read(&self.records).values().cloned().collect())
    }
}
