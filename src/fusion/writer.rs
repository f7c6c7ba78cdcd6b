//! Fusion Writer: merges the risk signals of one user and upserts the record

use super::record::{RiskRecord, RiskSource};
use crate::data::{UserId, UserProfile};
use crate::error::{Result, RiskError};
use crate::risk::{assess_questionnaire, RiskTier, UserAnomalySummary, YES_NO_QUESTIONS};
use crate::store::{RiskStore, StoreError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

/// What a write did to the stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Inserted,
    Updated,
    /// Stored assessment already matched; nothing was written
    Unchanged,
}

/// Everything known about one user in this batch
#[derive(Debug, Clone, Copy)]
pub struct UserSignals<'a> {
    pub user_id: &'a UserId,
    /// `None` when the user has no access events
    pub anomalies: Option<&'a UserAnomalySummary>,
    pub profile: Option<&'a UserProfile>,
    pub future_risk_tier: Option<RiskTier>,
}

/// Build the record for one user
///
/// With access events the current tier comes from the anomaly count.
/// Without, it comes from the questionnaire, and a user whose questionnaire
/// cannot be tiered gets no record at all.
pub fn fuse(signals: UserSignals<'_>, computed_at: DateTime<Utc>) -> Result<RiskRecord> {
    let answers = signals
        .profile
        .map(|p| p.answers.as_slice())
        .unwrap_or_default();
    let questionnaire = assess_questionnaire(answers);

    let (anomaly_count, current_risk_tier, current_risk_source) = match signals.anomalies {
        Some(summary) => (summary.anomaly_count, summary.tier, RiskSource::AccessEvents),
        None => {
            let assessment = questionnaire.as_ref().map_err(|_| {
                RiskError::IncompleteQuestionnaire {
                    answered: answers.len(),
                    required: YES_NO_QUESTIONS,
                }
            })?;
            (0, assessment.tier, RiskSource::Questionnaire)
        }
    };

    Ok(RiskRecord {
        user_id: signals.user_id.clone(),
        anomaly_count,
        current_risk_tier,
        current_risk_source,
        questionnaire_risk_tier: questionnaire.ok().map(|a| a.tier),
        future_risk_tier: signals.future_risk_tier,
        answers: answers.to_vec(),
        satisfaction: signals.profile.and_then(|p| p.satisfaction.clone()),
        last_computed_at: computed_at,
    })
}

/// Idempotent upsert of risk records
pub struct FusionWriter<'a, S: RiskStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: RiskStore + ?Sized> FusionWriter<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Write `record` unless the stored one already carries the same
    /// assessment. A conflicting concurrent write is retried once.
    pub fn write(&self, record: RiskRecord) -> Result<WriteOutcome> {
        let user_id = record.user_id.clone();
        let persistence = |e: StoreError| RiskError::Persistence {
            user_id: user_id.to_string(),
            reason: e.to_string(),
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            let current = self.store.get_record(&user_id).map_err(persistence)?;

            let outcome = match &current {
                Some(existing) if existing.same_assessment(&record) => {
                    debug!(user_id = %user_id, "Risk record unchanged");
                    return Ok(WriteOutcome::Unchanged);
                }
                Some(_) => WriteOutcome::Updated,
                None => WriteOutcome::Inserted,
            };

            match self.store.compare_and_swap(current.as_ref(), record.clone()) {
                Ok(()) => {
                    debug!(user_id = %user_id, outcome = ?outcome, "Risk record written");
                    return Ok(outcome);
                }
                Err(StoreError::Conflict(_)) if attempts < 2 => {
                    warn!(user_id = %user_id, "Write conflict on risk record; retrying");
                }
                Err(e) => return Err(persistence(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::QuestionAnswer;
    use crate::store::DocumentStore;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, day, 9, 0, 0).unwrap()
    }

    fn profile(user: &str, yes: usize, total: usize) -> UserProfile {
        UserProfile {
            user_id: UserId::from(user),
            habitual_area: None,
            typical_device: None,
            password_change_frequency: None,
            answers: (0..total)
                .map(|i| {
                    let answer = if i < yes { "Sí" } else { "No" };
                    QuestionAnswer::new(format!("q{}", i), answer)
                })
                .collect(),
            satisfaction: Some("Satisfecho".to_string()),
        }
    }

    fn summary(count: usize) -> UserAnomalySummary {
        UserAnomalySummary {
            event_count: 5,
            anomaly_count: count,
            tier: RiskTier::from_anomaly_count(count),
        }
    }

    #[test]
    fn test_fuse_from_events() {
        let user = UserId::from("u1");
        let p = profile("u1", 6, 10);
        let s = summary(2);
        let record = fuse(
            UserSignals {
                user_id: &user,
                anomalies: Some(&s),
                profile: Some(&p),
                future_risk_tier: None,
            },
            at(1),
        )
        .unwrap();

        assert_eq!(record.current_risk_tier, RiskTier::Medium);
        assert_eq!(record.current_risk_source, RiskSource::AccessEvents);
        assert_eq!(record.questionnaire_risk_tier, Some(RiskTier::High));
        assert_eq!(record.answers.len(), 10);
        assert_eq!(record.satisfaction.as_deref(), Some("Satisfecho"));
        assert!(record.future_risk_tier.is_none());
    }

    #[test]
    fn test_fuse_questionnaire_only() {
        let user = UserId::from("u2");
        let p = profile("u2", 4, 7);
        let record = fuse(
            UserSignals {
                user_id: &user,
                anomalies: None,
                profile: Some(&p),
                future_risk_tier: None,
            },
            at(1),
        )
        .unwrap();

        assert_eq!(record.anomaly_count, 0);
        assert_eq!(record.current_risk_tier, RiskTier::Medium);
        assert_eq!(record.current_risk_source, RiskSource::Questionnaire);
    }

    #[test]
    fn test_unclassifiable_user() {
        let user = UserId::from("u3");
        let p = profile("u3", 1, 3);
        let err = fuse(
            UserSignals {
                user_id: &user,
                anomalies: None,
                profile: Some(&p),
                future_risk_tier: None,
            },
            at(1),
        )
        .unwrap_err();
        assert!(matches!(err, RiskError::IncompleteQuestionnaire { answered: 3, .. }));
    }

    fn record(count: usize, day: u32) -> RiskRecord {
        let user = UserId::from("u1");
        let s = summary(count);
        fuse(
            UserSignals {
                user_id: &user,
                anomalies: Some(&s),
                profile: None,
                future_risk_tier: None,
            },
            at(day),
        )
        .unwrap()
    }

    #[test]
    fn test_repeat_write_is_noop() {
        let store = DocumentStore::new();
        let writer = FusionWriter::new(&store);

        assert_eq!(writer.write(record(2, 1)).unwrap(), WriteOutcome::Inserted);
        assert_eq!(writer.write(record(2, 2)).unwrap(), WriteOutcome::Unchanged);

        let stored = store.get_record(&UserId::from("u1")).unwrap().unwrap();
        assert_eq!(stored.last_computed_at, at(1));

        assert_eq!(writer.write(record(3, 3)).unwrap(), WriteOutcome::Updated);
        let stored = store.get_record(&UserId::from("u1")).unwrap().unwrap();
        assert_eq!((stored.anomaly_count, stored.last_computed_at), (3, at(3)));
    }

    /// Reports a conflict for the first `conflicts` swaps
    struct ContendedStore {
        inner: DocumentStore,
        conflicts: AtomicUsize,
    }

    impl RiskStore for ContendedStore {
        fn get_record(
            &self,
            user_id: &UserId,
        ) -> std::result::Result<Option<RiskRecord>, StoreError> {
            self.inner.get_record(user_id)
        }

        fn compare_and_swap(
            &self,
            expected: Option<&RiskRecord>,
            record: RiskRecord,
        ) -> std::result::Result<(), StoreError> {
            if self.conflicts.load(Ordering::SeqCst) > 0 {
                self.conflicts.fetch_sub(1, Ordering::SeqCst);
                return Err(StoreError::Conflict(record.user_id));
            }
            self.inner.compare_and_swap(expected, record)
        }

        fn records(&self) -> std::result::Result<Vec<RiskRecord>, StoreError> {
            self.inner.records()
        }
    }

    #[test]
    fn test_conflict_retried_once() {
        let store = ContendedStore {
            inner: DocumentStore::new(),
            conflicts: AtomicUsize::new(1),
        };
        let writer = FusionWriter::new(&store);
        assert_eq!(writer.write(record(1, 1)).unwrap(), WriteOutcome::Inserted);
    }

    #[test]
    fn test_persistent_conflict_surfaces() {
        let store = ContendedStore {
            inner: DocumentStore::new(),
            conflicts: AtomicUsize::new(2),
        };
        let writer = FusionWriter::new(&store);

        let err = writer.write(record(1, 1)).unwrap_err();
        assert!(matches!(err, RiskError::Persistence { ref user_id, .. } if user_id == "u1"));
        assert!(store.records().unwrap().is_empty());
    }
}
