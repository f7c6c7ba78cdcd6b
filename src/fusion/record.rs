//! Persisted per-user risk record

use crate::data::{QuestionAnswer, UserId};
use crate::risk::RiskTier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which signal the current tier was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSource {
    /// Anomaly count of the user's access events
    AccessEvents,
    /// Questionnaire only; the user has no access events yet
    Questionnaire,
}

impl fmt::Display for RiskSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskSource::AccessEvents => f.write_str("access_events"),
            RiskSource::Questionnaire => f.write_str("questionnaire"),
        }
    }
}

/// One record per user, overwritten in place on recomputation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRecord {
    pub user_id: UserId,
    pub anomaly_count: usize,
    pub current_risk_tier: RiskTier,
    pub current_risk_source: RiskSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questionnaire_risk_tier: Option<RiskTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub future_risk_tier: Option<RiskTier>,
    #[serde(default)]
    pub answers: Vec<QuestionAnswer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satisfaction: Option<String>,
    pub last_computed_at: DateTime<Utc>,
}

impl RiskRecord {
    /// Equal in everything but `last_computed_at`
    pub fn same_assessment(&self, other: &RiskRecord) -> bool {
        self.user_id == other.user_id
            && self.anomaly_count == other.anomaly_count
            && self.current_risk_tier == other.current_risk_tier
            && self.current_risk_source == other.current_risk_source
            && self.questionnaire_risk_tier == other.questionnaire_risk_tier
            && self.future_risk_tier == other.future_risk_tier
            && self.answers == other.answers
            && self.satisfaction == other.satisfaction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> RiskRecord {
        RiskRecord {
            user_id: UserId::from("u1"),
            anomaly_count: 2,
            current_risk_tier: RiskTier::Medium,
            current_risk_source: RiskSource::AccessEvents,
            questionnaire_risk_tier: None,
            future_risk_tier: None,
            answers: vec![QuestionAnswer::new("q1", "Sí")],
            satisfaction: None,
            last_computed_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_same_assessment_ignores_timestamp() {
        let a = record();
        let mut b = record();
        b.last_computed_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert!(a.same_assessment(&b));

        b.future_risk_tier = Some(RiskTier::Low);
        assert!(!a.same_assessment(&b));
    }

    #[test]
    fn test_absent_fields_not_serialized() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["current_risk_tier"], "Medium");
        assert_eq!(json["current_risk_source"], "access_events");
        assert!(json.get("future_risk_tier").is_none());
        assert!(json.get("satisfaction").is_none());

        let parsed: RiskRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record());
    }
}
