//! User profiles built from questionnaire documents

use super::documents::{ProfileDocument, QuestionAnswer, UserId};
use serde::{Deserialize, Serialize};

/// Positions of the single-choice questions in the fixed question list
const HABITUAL_AREA_ANSWER: usize = 7;
const TYPICAL_DEVICE_ANSWER: usize = 8;
const PASSWORD_FREQUENCY_ANSWER: usize = 9;

/// Static attributes the future-risk regressor is trained on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileAttributes {
    pub habitual_area: String,
    pub typical_device: String,
    pub password_change_frequency: String,
}

impl ProfileAttributes {
    /// Values in encoder column order
    pub fn values(&self) -> [&str; 3] {
        [
            &self.habitual_area,
            &self.typical_device,
            &self.password_change_frequency,
        ]
    }
}

/// One onboarded user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub habitual_area: Option<String>,
    pub typical_device: Option<String>,
    pub password_change_frequency: Option<String>,
    pub answers: Vec<QuestionAnswer>,
    pub satisfaction: Option<String>,
}

fn normalize_category(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_lowercase())
    }
}

impl UserProfile {
    /// Build from a stored document. Explicit attribute fields win; otherwise
    /// the single-choice answers of the questionnaire are used.
    pub fn from_document(doc: &ProfileDocument) -> Self {
        let pick = |explicit: &Option<String>, position: usize| {
            explicit
                .as_deref()
                .or_else(|| doc.answers.get(position).map(|qa| qa.answer.as_str()))
                .and_then(normalize_category)
        };

        Self {
            user_id: doc.user_id.clone(),
            habitual_area: pick(&doc.habitual_area, HABITUAL_AREA_ANSWER),
            typical_device: pick(&doc.typical_device, TYPICAL_DEVICE_ANSWER),
            password_change_frequency: pick(
                &doc.password_change_frequency,
                PASSWORD_FREQUENCY_ANSWER,
            ),
            answers: doc.answers.clone(),
            satisfaction: doc.satisfaction.clone(),
        }
    }

    /// All three regressor attributes, if the profile has them
    pub fn attributes(&self) -> Option<ProfileAttributes> {
        Some(ProfileAttributes {
            habitual_area: self.habitual_area.clone()?,
            typical_device: self.typical_device.clone()?,
            password_change_frequency: self.password_change_frequency.clone()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answers(values: &[&str]) -> Vec<QuestionAnswer> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| QuestionAnswer::new(format!("q{}", i + 1), *v))
            .collect()
    }

    #[test]
    fn test_attributes_from_answers() {
        let doc = ProfileDocument::with_answers(
            "u1",
            answers(&["Sí", "No", "No", "Sí", "No", "No", "Sí", "Coyoacán", "Laptop", "Mensual"]),
        );
        let profile = UserProfile::from_document(&doc);
        let attrs = profile.attributes().unwrap();

        assert_eq!(attrs.habitual_area, "coyoacán");
        assert_eq!(attrs.typical_device, "laptop");
        assert_eq!(attrs.password_change_frequency, "mensual");
    }

    #[test]
    fn test_explicit_fields_win() {
        let mut doc = ProfileDocument::with_answers(
            "u1",
            answers(&["No", "No", "No", "No", "No", "No", "No", "Tlalpan", "Tablet", "Anual"]),
        );
        doc.typical_device = Some("smartphone".to_string());

        let profile = UserProfile::from_document(&doc);
        assert_eq!(profile.typical_device.as_deref(), Some("smartphone"));
        assert_eq!(profile.habitual_area.as_deref(), Some("tlalpan"));
    }

    #[test]
    fn test_missing_attributes() {
        let doc = ProfileDocument::with_answers("u1", answers(&["Sí", "No"]));
        let profile = UserProfile::from_document(&doc);
        assert!(profile.attributes().is_none());
    }
}
