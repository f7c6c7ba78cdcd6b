//! Batch orchestration
//!
//! One run ingests both collections, fits the encoder, detector and
//! regressor once, then fuses and writes one record per user in parallel.
//! All state flows through the store handle and the [`PipelineContext`].

use crate::anomaly::{AnomalyDetector, DetectionEvaluation};
use crate::data::{load_corpus, AccessEvent, UserId};
use crate::error::{Result, RiskError};
use crate::features::EventFeatureEncoder;
use crate::forecast::{ForecastInput, ForecastSet, FutureRiskRegressor};
use crate::fusion::{fuse, FusionWriter, UserSignals, WriteOutcome};
use crate::risk::aggregate_anomalies;
use crate::store::{DocumentSource, RiskStore};
use crate::utils::PipelineConfig;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Per-run inputs that are not configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineContext {
    /// Seed for every stochastic stage
    pub seed: u64,
    /// Stamped on every record written in this run
    pub computed_at: DateTime<Utc>,
}

impl PipelineContext {
    pub fn new(seed: u64, computed_at: DateTime<Utc>) -> Self {
        Self { seed, computed_at }
    }

    pub fn now(seed: u64) -> Self {
        Self::new(seed, Utc::now())
    }
}

/// What a run did
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub seed: u64,
    pub computed_at: DateTime<Utc>,
    pub events_ingested: usize,
    pub events_rejected: usize,
    pub legacy_flag_events: usize,
    pub anomalies_flagged: usize,
    pub users_scored: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Users without a forecast, with the reason
    pub forecast_failures: BTreeMap<UserId, String>,
    /// Users with no events and no usable questionnaire; no record written
    pub unclassifiable: Vec<UserId>,
    pub persistence_failures: BTreeMap<UserId, String>,
    pub evaluation: Option<DetectionEvaluation>,
    /// Fitted event feature space of this batch
    pub encoder: EventFeatureEncoder,
}

impl RunSummary {
    /// Turn persistence failures into an error
    pub fn into_result(self) -> Result<Self> {
        match self.persistence_failures.iter().next() {
            None => Ok(self),
            Some((user_id, reason)) => Err(RiskError::Persistence {
                user_id: user_id.to_string(),
                reason: format!(
                    "{} ({} user(s) failed in total)",
                    reason,
                    self.persistence_failures.len()
                ),
            }),
        }
    }
}

enum UserOutcome {
    Written(WriteOutcome),
    Unclassifiable,
    Failed(RiskError),
}

/// The scoring pipeline over one store
pub struct RiskPipeline<'a, S: ?Sized> {
    store: &'a S,
    config: PipelineConfig,
}

impl<'a, S> RiskPipeline<'a, S>
where
    S: DocumentSource + RiskStore + ?Sized,
{
    pub fn new(store: &'a S, config: PipelineConfig) -> Self {
        Self { store, config }
    }

    /// Run the whole batch
    ///
    /// Fails only on batch-level problems (empty corpus, invalid
    /// configuration). Per-user forecast and persistence failures are
    /// reported in the summary.
    pub fn run(&self, ctx: &PipelineContext) -> Result<RunSummary> {
        self.config.validate()?;
        info!(seed = ctx.seed, "Starting risk scoring run");

        let (batch, profiles) = load_corpus(self.store)?;

        // Encode and detect
        let events: Vec<&AccessEvent> = batch.events().collect();
        let (encoder, features) =
            EventFeatureEncoder::fit_transform(&events, self.config.encoder.unknown_category)?;

        let group_sizes: Vec<usize> = batch.by_user.values().map(Vec::len).collect();
        let detection = AnomalyDetector::new(self.config.detector.clone()).detect(
            &features,
            &group_sizes,
            ctx.seed,
        )?;

        let evaluation = DetectionEvaluation::from_pairs(
            events
                .iter()
                .map(|e| e.simulated_anomaly_flag)
                .zip(detection.flags.iter().copied()),
        );
        if let Some(eval) = &evaluation {
            info!(
                labelled = eval.total(),
                precision = eval.precision(),
                recall = eval.recall(),
                "Detector compared with simulated labels"
            );
        }

        let anomalies = aggregate_anomalies(&batch, &detection.flags)?;

        // Forecast
        let mut forecast_failures = BTreeMap::new();
        let forecasts = if self.config.forecast.enabled {
            let mut inputs = Vec::new();
            for (user_id, summary) in &anomalies {
                match profiles.get(user_id).and_then(|p| p.attributes()) {
                    Some(attributes) => inputs.push(ForecastInput {
                        user_id: user_id.clone(),
                        attributes,
                        anomaly_count: summary.anomaly_count,
                    }),
                    None => {
                        forecast_failures
                            .insert(user_id.clone(), "profile attributes incomplete".to_string());
                    }
                }
            }

            let set = FutureRiskRegressor::new(self.config.forecast.clone()).fit_predict(&inputs);
            for (user_id, err) in &set.failures {
                forecast_failures.insert(user_id.clone(), err.to_string());
            }
            set
        } else {
            ForecastSet::default()
        };

        // Fuse and write
        let users: Vec<&UserId> = anomalies
            .keys()
            .chain(profiles.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let writer = FusionWriter::new(self.store);
        let outcomes: Vec<(&UserId, UserOutcome)> = users
            .par_iter()
            .map(|&user_id| {
                let signals = UserSignals {
                    user_id,
                    anomalies: anomalies.get(user_id),
                    profile: profiles.get(user_id),
                    future_risk_tier: forecasts.tier(user_id),
                };

                let outcome = match fuse(signals, ctx.computed_at) {
                    Ok(record) => match writer.write(record) {
                        Ok(written) => UserOutcome::Written(written),
                        Err(e) => UserOutcome::Failed(e),
                    },
                    Err(RiskError::IncompleteQuestionnaire { .. }) => UserOutcome::Unclassifiable,
                    Err(e) => UserOutcome::Failed(e),
                };
                (user_id, outcome)
            })
            .collect();

        let mut summary = RunSummary {
            seed: ctx.seed,
            computed_at: ctx.computed_at,
            events_ingested: batch.report.events_accepted,
            events_rejected: batch.report.events_rejected,
            legacy_flag_events: batch.report.legacy_flag_events,
            anomalies_flagged: detection.anomaly_count(),
            users_scored: 0,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            forecast_failures,
            unclassifiable: Vec::new(),
            persistence_failures: BTreeMap::new(),
            evaluation,
            encoder,
        };

        for (user_id, outcome) in outcomes {
            match outcome {
                UserOutcome::Written(written) => {
                    summary.users_scored += 1;
                    match written {
                        WriteOutcome::Inserted => summary.inserted += 1,
                        WriteOutcome::Updated => summary.updated += 1,
                        WriteOutcome::Unchanged => summary.unchanged += 1,
                    }
                }
                UserOutcome::Unclassifiable => {
                    warn!(user_id = %user_id, "No events and no complete questionnaire; user not scored");
                    summary.unclassifiable.push(user_id.clone());
                }
                UserOutcome::Failed(e) => {
                    warn!(user_id = %user_id, error = %e, "Risk record not persisted");
                    summary.persistence_failures.insert(user_id.clone(), e.to_string());
                }
            }
        }

        info!(
            users = summary.users_scored,
            inserted = summary.inserted,
            updated = summary.updated,
            unchanged = summary.unchanged,
            anomalies = summary.anomalies_flagged,
            forecast_failures = summary.forecast_failures.len(),
            persistence_failures = summary.persistence_failures.len(),
            "Risk scoring run finished"
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{EventDocument, ProfileDocument, QuestionAnswer, RawAccessEvent};
    use crate::store::DocumentStore;
    use chrono::TimeZone;

    fn event(day: u32, hour: u32) -> RawAccessEvent {
        RawAccessEvent {
            login_time: Some(format!("2024-03-{:02} {:02}:15:00", day, hour)),
            ip: Some("10.0.0.1".to_string()),
            device: Some("laptop".to_string()),
            location: Some("tlalpan".to_string()),
            ..Default::default()
        }
    }

    fn ctx() -> PipelineContext {
        PipelineContext::new(7, Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_empty_profiles_abort_run() {
        let store = DocumentStore::new();
        store
            .insert_event_document(EventDocument {
                user_id: UserId::from("u1"),
                events: vec![event(1, 9), event(2, 9)],
            })
            .unwrap();

        let pipeline = RiskPipeline::new(&store, PipelineConfig::default());
        assert!(matches!(pipeline.run(&ctx()), Err(RiskError::Data(_))));
        assert!(store.records().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let store = DocumentStore::new();
        let mut config = PipelineConfig::default();
        config.detector.contamination = 0.0;

        let pipeline = RiskPipeline::new(&store, config);
        assert!(matches!(pipeline.run(&ctx()), Err(RiskError::Config(_))));
    }

    #[test]
    fn test_summary_counts() {
        let store = DocumentStore::new();
        store
            .insert_event_document(EventDocument {
                user_id: UserId::from("u1"),
                events: (1..=6).map(|d| event(d, 9)).collect(),
            })
            .unwrap();
        store
            .upsert_profile(ProfileDocument::with_answers(
                "u2",
                vec![QuestionAnswer::new("q1", "Sí")],
            ))
            .unwrap();

        let pipeline = RiskPipeline::new(&store, PipelineConfig::default());
        let summary = pipeline.run(&ctx()).unwrap();

        assert_eq!(summary.events_ingested, 6);
        assert_eq!(summary.anomalies_flagged, 0);
        assert_eq!(summary.users_scored, 1);
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.unclassifiable, vec![UserId::from("u2")]);
        assert_eq!(
            summary.forecast_failures[&UserId::from("u1")],
            "profile attributes incomplete"
        );
        assert!(summary.evaluation.is_none());
        assert!(summary.into_result().is_ok());
    }
}
