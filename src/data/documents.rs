//! Persisted document shapes, exactly as they sit in the source collections
//!
//! These types are deliberately loose (every field optional where the
//! collection does not guarantee it). Validation into the strict domain
//! types happens in [`super::events`] and [`super::profile`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Stable user identifier
///
/// Source collections key users either by a string or by a numeric chat id;
/// both deserialize into the same textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => UserId(text),
            RawId::Number(n) => UserId(n.to_string()),
        })
    }
}

/// One question/answer pair of the questionnaire, in asking order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question: String,
    pub answer: String,
}

impl QuestionAnswer {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Access-event collection document: all stored events of one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDocument {
    pub user_id: UserId,
    #[serde(default)]
    pub events: Vec<RawAccessEvent>,
}

/// An access event before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAccessEvent {
    #[serde(default)]
    pub login_time: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Ground-truth label attached by synthetic data generators (0 or 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulated_anomaly_flag: Option<u8>,
    /// Any field this schema does not know about
    #[serde(flatten)]
    pub unknown: BTreeMap<String, Value>,
}

/// Profile/questionnaire collection document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileDocument {
    pub user_id: UserId,
    #[serde(default)]
    pub answers: Vec<QuestionAnswer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satisfaction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub habitual_area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typical_device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_change_frequency: Option<String>,
}

impl ProfileDocument {
    /// Bare profile carrying only answers
    pub fn with_answers(user_id: impl Into<UserId>, answers: Vec<QuestionAnswer>) -> Self {
        Self {
            user_id: user_id.into(),
            answers,
            satisfaction: None,
            habitual_area: None,
            typical_device: None,
            password_change_frequency: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_from_number_or_string() {
        let doc: EventDocument =
            serde_json::from_str(r#"{"user_id": 5512345678, "events": []}"#).unwrap();
        assert_eq!(doc.user_id.as_str(), "5512345678");

        let doc: EventDocument = serde_json::from_str(r#"{"user_id": "u-1"}"#).unwrap();
        assert_eq!(doc.user_id, UserId::from("u-1"));
        assert!(doc.events.is_empty());
    }

    #[test]
    fn test_unknown_event_fields_are_kept() {
        let raw: RawAccessEvent = serde_json::from_str(
            r#"{"login_time": "2024-03-01 10:00:00", "device": "laptop",
                "location": "coyoacan", "es_anomalia_simulda": 1}"#,
        )
        .unwrap();

        assert_eq!(raw.simulated_anomaly_flag, None);
        assert_eq!(raw.unknown.get("es_anomalia_simulda"), Some(&Value::from(1)));
    }

    #[test]
    fn test_profile_optional_fields() {
        let doc: ProfileDocument = serde_json::from_str(
            r#"{"user_id": 1, "answers": [{"question": "q1", "answer": "Sí"}]}"#,
        )
        .unwrap();
        assert_eq!(doc.answers.len(), 1);
        assert!(doc.satisfaction.is_none());
        assert!(doc.habitual_area.is_none());
    }
}
