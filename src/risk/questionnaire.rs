//! Questionnaire-only risk tiering
//!
//! Counts affirmative answers among the leading yes/no questions. This scale
//! is unrelated to the anomaly-count table and has its own thresholds.

use super::tier::RiskTier;
use crate::data::QuestionAnswer;
use crate::error::{Result, RiskError};
use serde::{Deserialize, Serialize};

/// Number of leading yes/no questions in the fixed question list
pub const YES_NO_QUESTIONS: usize = 7;

/// Affirmative-answer thresholds, checked highest first
pub const QUESTIONNAIRE_TIER_THRESHOLDS: [(usize, RiskTier); 2] =
    [(5, RiskTier::High), (3, RiskTier::Medium)];

const AFFIRMATIVE: [&str; 3] = ["sí", "si", "yes"];

/// Whether an answer counts as "yes"
pub fn is_affirmative(answer: &str) -> bool {
    let answer = answer.trim().to_lowercase();
    AFFIRMATIVE.contains(&answer.as_str())
}

/// Tier for a number of affirmative answers
pub fn tier_for_affirmative_count(affirmative: usize) -> RiskTier {
    QUESTIONNAIRE_TIER_THRESHOLDS
        .iter()
        .find(|(min, _)| affirmative >= *min)
        .map(|(_, tier)| *tier)
        .unwrap_or(RiskTier::Low)
}

/// Result handed back to the conversational front-end and report renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionnaireAssessment {
    pub affirmative: usize,
    pub tier: RiskTier,
}

impl QuestionnaireAssessment {
    /// `(tier_code, tier_label, tier_color)`
    pub fn triple(&self) -> (u8, &'static str, &'static str) {
        (self.tier.code(), self.tier.label(), self.tier.color())
    }
}

/// Tier an ordered answer list; needs at least the yes/no block
pub fn assess_questionnaire(answers: &[QuestionAnswer]) -> Result<QuestionnaireAssessment> {
    if answers.len() < YES_NO_QUESTIONS {
        return Err(RiskError::IncompleteQuestionnaire {
            answered: answers.len(),
            required: YES_NO_QUESTIONS,
        });
    }

    let affirmative = answers[..YES_NO_QUESTIONS]
        .iter()
        .filter(|qa| is_affirmative(&qa.answer))
        .count();

    Ok(QuestionnaireAssessment {
        affirmative,
        tier: tier_for_affirmative_count(affirmative),
    })
}
