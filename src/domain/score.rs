//! Score types: the nine-dimension enrichment breakdown, the model's
//! verdict, and the per-attempt validation result.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Maximum weight of each enrichment dimension. The total never exceeds
/// 100 and always equals the component sum.
pub mod weights {
    pub const NAME_MATCH: u8 = 25;
    pub const ADDRESS_ACCURACY: u8 = 20;
    pub const GEOLOCATION: u8 = 15;
    pub const PHONE: u8 = 10;
    pub const HOURS: u8 = 10;
    pub const WEBSITE: u8 = 5;
    pub const BUSINESS_STATUS: u8 = 5;
    pub const POSTAL_CODE: u8 = 5;
    pub const VEGAN_RELEVANCE: u8 = 5;
}

/// Nine-dimension decomposition of field-level agreement between the
/// submitted record and the looked-up place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub name_match: u8,
    pub address_accuracy: u8,
    pub geolocation: u8,
    pub phone: u8,
    pub hours: u8,
    pub website: u8,
    pub business_status: u8,
    pub postal_code: u8,
    pub vegan_relevance: u8,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u8 {
        self.name_match
            + self.address_accuracy
            + self.geolocation
            + self.phone
            + self.hours
            + self.website
            + self.business_status
            + self.postal_code
            + self.vegan_relevance
    }

    /// Stable, named map for serialization into history rows and prompts.
    pub fn to_map(&self) -> BTreeMap<String, i64> {
        BTreeMap::from([
            ("name_match".to_string(), self.name_match as i64),
            ("address_accuracy".to_string(), self.address_accuracy as i64),
            ("geolocation".to_string(), self.geolocation as i64),
            ("phone".to_string(), self.phone as i64),
            ("hours".to_string(), self.hours as i64),
            ("website".to_string(), self.website as i64),
            ("business_status".to_string(), self.business_status as i64),
            ("postal_code".to_string(), self.postal_code as i64),
            ("vegan_relevance".to_string(), self.vegan_relevance as i64),
        ])
    }
}

/// Terminal state of one validation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Approved,
    Rejected,
    ManualReview,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Approved => "approved",
            Outcome::Rejected => "rejected",
            Outcome::ManualReview => "manual_review",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value {
            "approved" => Outcome::Approved,
            "rejected" => Outcome::Rejected,
            _ => Outcome::ManualReview,
        }
    }
}

/// The model's three-part breakdown, capped at 35/30/35.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelBreakdown {
    pub legitimacy: i64,
    pub completeness: i64,
    pub relevance: i64,
}

/// Structured score as the model is instructed to emit it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelScore {
    pub score: i64,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub breakdown: ModelBreakdown,
}

/// Outcome of parsing the model response. The raw payload of a malformed
/// response is preserved so the fallback parser and the audit trail can see
/// exactly what came back; callers can never dereference missing keys.
#[derive(Debug, Clone)]
pub enum ModelVerdict {
    Parsed(ModelScore),
    Malformed(String),
}

/// Result of scoring one venue: what gets persisted to the history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub venue_id: i64,
    /// Final integer score in 0..=100.
    pub score: u8,
    pub outcome: Outcome,
    pub notes: String,
    pub breakdown: BTreeMap<String, i64>,
    /// Raw model output, kept verbatim for auditability.
    pub raw_model_output: Option<String>,
    pub prompt_version: Option<String>,
}

impl ValidationResult {
    /// Derive the terminal status from a raw score, before any
    /// decision-engine adjustment: >= 85 approved, < 50 rejected,
    /// manual review in between.
    pub fn outcome_from_raw_score(score: u8) -> Outcome {
        if score >= 85 {
            Outcome::Approved
        } else if score < 50 {
            Outcome::Rejected
        } else {
            Outcome::ManualReview
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_equals_component_sum() {
        let breakdown = ScoreBreakdown {
            name_match: 25,
            address_accuracy: 18,
            geolocation: 15,
            phone: 8,
            hours: 10,
            website: 4,
            business_status: 5,
            postal_code: 5,
            vegan_relevance: 5,
        };
        assert_eq!(breakdown.total(), 95);
        let map_sum: i64 = breakdown.to_map().values().sum();
        assert_eq!(map_sum, breakdown.total() as i64);
    }

    #[test]
    fn test_full_marks_cap_at_100() {
        let breakdown = ScoreBreakdown {
            name_match: weights::NAME_MATCH,
            address_accuracy: weights::ADDRESS_ACCURACY,
            geolocation: weights::GEOLOCATION,
            phone: weights::PHONE,
            hours: weights::HOURS,
            website: weights::WEBSITE,
            business_status: weights::BUSINESS_STATUS,
            postal_code: weights::POSTAL_CODE,
            vegan_relevance: weights::VEGAN_RELEVANCE,
        };
        assert_eq!(breakdown.total(), 100);
    }

    #[test]
    fn test_outcome_from_raw_score_thresholds() {
        assert_eq!(
            ValidationResult::outcome_from_raw_score(85),
            Outcome::Approved
        );
        assert_eq!(
            ValidationResult::outcome_from_raw_score(84),
            Outcome::ManualReview
        );
        assert_eq!(
            ValidationResult::outcome_from_raw_score(50),
            Outcome::ManualReview
        );
        assert_eq!(
            ValidationResult::outcome_from_raw_score(49),
            Outcome::Rejected
        );
    }

    #[test]
    fn test_outcome_string_round_trip() {
        for outcome in [Outcome::Approved, Outcome::Rejected, Outcome::ManualReview] {
            assert_eq!(Outcome::from_str(outcome.as_str()), outcome);
        }
        assert_eq!(Outcome::from_str("garbage"), Outcome::ManualReview);
    }
}
