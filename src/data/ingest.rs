//! Event Ingestor: loads and validates the stored collections
//!
//! Everything downstream works on the strict types produced here. Single bad
//! events are dropped and counted; an empty corpus aborts the batch.

use super::documents::{EventDocument, ProfileDocument, UserId};
use super::events::{AccessEvent, EventRejection};
use super::profile::UserProfile;
use crate::error::{Result, RiskError};
use crate::store::DocumentSource;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Counters collected while validating the event collection
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub documents_rejected: usize,
    pub events_accepted: usize,
    pub events_rejected: usize,
    /// Events carrying a legacy-spelled label field instead of `simulated_anomaly_flag`
    pub legacy_flag_events: usize,
    pub unknown_fields: BTreeSet<String>,
}

/// All valid events of a batch, grouped by user and ordered by timestamp
#[derive(Debug, Clone, Default)]
pub struct EventBatch {
    pub by_user: BTreeMap<UserId, Vec<AccessEvent>>,
    pub report: IngestReport,
}

impl EventBatch {
    pub fn total_events(&self) -> usize {
        self.by_user.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_events() == 0
    }

    /// Events in user order, then time order. Row `i` of the feature matrix
    /// corresponds to the `i`-th event of this iterator.
    pub fn events(&self) -> impl Iterator<Item = &AccessEvent> {
        self.by_user.values().flatten()
    }
}

/// Validate raw event documents into a batch
pub fn ingest_events(documents: Vec<EventDocument>) -> Result<EventBatch> {
    let mut batch = EventBatch::default();
    batch.report.documents = documents.len();

    for doc in documents {
        if doc.user_id.is_blank() {
            warn!("Event document without user_id rejected");
            batch.report.documents_rejected += 1;
            continue;
        }

        for raw in &doc.events {
            let legacy: Vec<&str> = raw.legacy_flag_fields().collect();
            if !legacy.is_empty() {
                batch.report.legacy_flag_events += 1;
                debug!(
                    user_id = %doc.user_id,
                    fields = ?legacy,
                    "Legacy label field ignored; expected 'simulated_anomaly_flag'"
                );
            }
            batch
                .report
                .unknown_fields
                .extend(raw.unknown.keys().cloned());

            match raw.validate(&doc.user_id) {
                Ok(event) => {
                    batch.report.events_accepted += 1;
                    batch
                        .by_user
                        .entry(doc.user_id.clone())
                        .or_default()
                        .push(event);
                }
                Err(rejection) => {
                    batch.report.events_rejected += 1;
                    log_rejection(&doc.user_id, &rejection);
                }
            }
        }
    }

    for events in batch.by_user.values_mut() {
        events.sort_by_key(|event| event.timestamp);
    }

    if batch.report.legacy_flag_events > 0 {
        warn!(
            events = batch.report.legacy_flag_events,
            "Events carry a misspelled simulated-anomaly field; those labels are not used"
        );
    }

    if batch.is_empty() {
        return Err(RiskError::Data(format!(
            "event corpus has no valid events ({} documents, {} events rejected)",
            batch.report.documents, batch.report.events_rejected
        )));
    }

    info!(
        users = batch.by_user.len(),
        events = batch.report.events_accepted,
        rejected = batch.report.events_rejected,
        "Access events ingested"
    );

    Ok(batch)
}

fn log_rejection(user_id: &UserId, rejection: &EventRejection) {
    warn!(user_id = %user_id, reason = %rejection, "Access event rejected");
}

/// Validate profile documents; a later document for the same user replaces an earlier one
pub fn ingest_profiles(documents: Vec<ProfileDocument>) -> Result<BTreeMap<UserId, UserProfile>> {
    let total = documents.len();
    let mut profiles = BTreeMap::new();

    for doc in documents {
        if doc.user_id.is_blank() {
            warn!("Profile document without user_id rejected");
            continue;
        }
        let profile = UserProfile::from_document(&doc);
        if profiles.insert(doc.user_id.clone(), profile).is_some() {
            warn!(user_id = %doc.user_id, "Duplicate profile document; keeping the later one");
        }
    }

    if profiles.is_empty() {
        return Err(RiskError::Data(format!(
            "profile corpus has no valid documents ({} read)",
            total
        )));
    }

    info!(profiles = profiles.len(), "Profiles ingested");
    Ok(profiles)
}

/// Load and validate both collections from a document source
pub fn load_corpus<S: DocumentSource + ?Sized>(
    source: &S,
) -> Result<(EventBatch, BTreeMap<UserId, UserProfile>)> {
    let events = ingest_events(source.event_documents()?)?;
    let profiles = ingest_profiles(source.profile_documents()?)?;
    Ok((events, profiles))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::documents::RawAccessEvent;

    fn raw(time: &str, device: &str) -> RawAccessEvent {
        RawAccessEvent {
            login_time: Some(time.to_string()),
            device: Some(device.to_string()),
            location: Some("tlalpan".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_events_merged_and_sorted() {
        let docs = vec![
            EventDocument {
                user_id: UserId::from("b"),
                events: vec![raw("2024-02-01 10:00:00", "laptop")],
            },
            EventDocument {
                user_id: UserId::from("a"),
                events: vec![raw("2024-02-03 10:00:00", "tablet")],
            },
            EventDocument {
                user_id: UserId::from("a"),
                events: vec![raw("2024-02-02 10:00:00", "laptop"), raw("garbage", "laptop")],
            },
        ];

        let batch = ingest_events(docs).unwrap();
        assert_eq!(batch.total_events(), 3);
        assert_eq!(batch.report.events_rejected, 1);

        let a = &batch.by_user[&UserId::from("a")];
        assert_eq!(a[0].device, "laptop");
        assert_eq!(a[1].device, "tablet");

        let order: Vec<&str> = batch.events().map(|e| e.user_id.as_str()).collect();
        assert_eq!(order, vec!["a", "a", "b"]);
    }

    #[test]
    fn test_empty_corpus_is_data_error() {
        assert!(matches!(ingest_events(Vec::new()), Err(RiskError::Data(_))));

        let only_bad = vec![EventDocument {
            user_id: UserId::from("a"),
            events: vec![raw("never", "laptop")],
        }];
        assert!(matches!(ingest_events(only_bad), Err(RiskError::Data(_))));

        assert!(matches!(ingest_profiles(Vec::new()), Err(RiskError::Data(_))));
    }

    #[test]
    fn test_legacy_fields_counted() {
        let mut event = raw("2024-02-01 10:00:00", "laptop");
        event
            .unknown
            .insert("es_anomalia_simulada".to_string(), serde_json::Value::from(0));

        let batch = ingest_events(vec![EventDocument {
            user_id: UserId::from("a"),
            events: vec![event],
        }])
        .unwrap();

        assert_eq!(batch.report.legacy_flag_events, 1);
        assert!(batch.report.unknown_fields.contains("es_anomalia_simulada"));
        assert_eq!(batch.by_user[&UserId::from("a")][0].simulated_anomaly_flag, None);
    }

    #[test]
    fn test_duplicate_profile_keeps_later() {
        let mut first = ProfileDocument::with_answers("a", Vec::new());
        first.satisfaction = Some("buena".to_string());
        let second = ProfileDocument::with_answers("a", Vec::new());

        let profiles = ingest_profiles(vec![first, second]).unwrap();
        assert_eq!(profiles.len(), 1);
        assert!(profiles[&UserId::from("a")].satisfaction.is_none());
    }
}
