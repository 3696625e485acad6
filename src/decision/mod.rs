//! Decision engine: a pure function from the validation attempt to a
//! terminal state, plus event emission.
//!
//! Precedence, first match wins: authority auto-approval (venue admin,
//! then in-region high ambassador, both gated on the critical-data
//! specification), region-language review, hard quality/suspicion gates,
//! the new-business guard, then the score thresholds.

pub mod events;

use serde::{Deserialize, Serialize};

use crate::config::{Config, SpecConfig};
use crate::domain::{
    AuthorityAssessment, AuthorityTier, Outcome, QualityFlags, SpecialFlags, Submitter,
    ValidationResult, Venue,
};

pub use events::{DomainEvent, EventSink, LogEventSink, MemoryEventSink};

#[derive(Debug, Clone)]
pub struct DecisionConfig {
    /// Final-score floor for auto-approval. Code default is 85; deployments
    /// commonly run 75 via `APPROVAL_THRESHOLD`. The configuration value
    /// always wins.
    pub approval_threshold: u8,
    pub rejection_threshold: u8,
    /// When enabled, the authority bonus is added to the base score.
    pub authority_mode: bool,
    pub spec: SpecConfig,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            approval_threshold: 85,
            rejection_threshold: 50,
            authority_mode: true,
            spec: SpecConfig::default(),
        }
    }
}

impl DecisionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            approval_threshold: config.approval_threshold,
            spec: config.spec.clone(),
            ..Self::default()
        }
    }
}

/// Everything `decide` looks at. The critical-data verdict is computed by
/// the caller from the combined view so the function stays pure.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub venue: &'a Venue,
    pub submitter: &'a Submitter,
    pub authority: &'a AuthorityAssessment,
    pub result: &'a ValidationResult,
    pub special: &'a SpecialFlags,
    pub quality: &'a QualityFlags,
    pub critical_data_ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub outcome: Outcome,
    pub reason: String,
    pub requires_review: bool,
    pub review_reason: Option<String>,
    /// Base score plus authority bonus, capped at 100.
    pub final_score: u8,
}

impl Decision {
    fn approved(reason: String, final_score: u8) -> Self {
        Self {
            outcome: Outcome::Approved,
            reason,
            requires_review: false,
            review_reason: None,
            final_score,
        }
    }

    fn rejected(reason: String, final_score: u8) -> Self {
        Self {
            outcome: Outcome::Rejected,
            reason,
            requires_review: false,
            review_reason: None,
            final_score,
        }
    }

    fn manual(reason: String, final_score: u8) -> Self {
        Self {
            outcome: Outcome::ManualReview,
            reason: reason.clone(),
            requires_review: true,
            review_reason: Some(reason),
            final_score,
        }
    }
}

/// Deterministic decision function. No clocks, no randomness: identical
/// inputs always yield identical outputs.
pub fn decide(input: &DecisionInput<'_>, config: &DecisionConfig) -> Decision {
    let base = input.result.score;
    let final_score = if config.authority_mode {
        (base as u32 + input.authority.bonus).min(100) as u8
    } else {
        base
    };

    // 1. Venue admin with complete critical data.
    if input.authority.tier == AuthorityTier::VenueAdmin && input.critical_data_ok {
        return Decision::approved(
            format!(
                "Auto-approved: Venue admin submission with complete critical data (score {final_score})"
            ),
            final_score,
        );
    }

    // 2. High ambassador in a matching region with complete critical data.
    if input.authority.tier == AuthorityTier::HighAmbassador && input.critical_data_ok {
        return Decision::approved(
            format!(
                "Auto-approved: High ambassador in matching region with complete critical data (score {final_score})"
            ),
            final_score,
        );
    }

    // 3. Region-language barrier: everyone but the venue admin goes to a
    //    human who can read the listing.
    if input.special.region_language() && input.authority.tier != AuthorityTier::VenueAdmin {
        let language = if input.special.korean_venue {
            "Korean"
        } else {
            "Chinese"
        };
        return Decision::manual(
            format!("{language} venue requires language-capable review"),
            final_score,
        );
    }

    // 4. Hard quality gates.
    if input.quality.no_google_data {
        return Decision::manual(
            "no external place data found for this venue".to_string(),
            final_score,
        );
    }
    if input.quality.multiple_conflicts {
        return Decision::manual(
            "multiple field conflicts with looked-up place data".to_string(),
            final_score,
        );
    }
    if input.quality.location_mismatch {
        return Decision::manual(
            "looked-up location is more than 500m from submitted coordinates".to_string(),
            final_score,
        );
    }
    if input.special.suspicious_content {
        return Decision::manual(
            "description contains suspicious content".to_string(),
            final_score,
        );
    }

    // 5. Recently created venues never auto-approve below the threshold.
    if input.special.new_business && final_score < config.approval_threshold {
        return Decision::manual(
            format!(
                "new business with score {final_score} below approval threshold {}",
                config.approval_threshold
            ),
            final_score,
        );
    }

    // 6. Score-based approval.
    if final_score >= config.approval_threshold {
        return Decision::approved(
            format!(
                "Score {final_score} meets approval threshold {}",
                config.approval_threshold
            ),
            final_score,
        );
    }

    // 7. Score-based rejection, guarded by flags and trust.
    if final_score < config.rejection_threshold {
        if !input.special.any() && input.authority.trust < 0.7 {
            return Decision::rejected(
                format!(
                    "Score {final_score} below rejection threshold {}",
                    config.rejection_threshold
                ),
                final_score,
            );
        }
        return Decision::manual(
            format!(
                "score {final_score} below rejection threshold but submitter standing warrants review"
            ),
            final_score,
        );
    }

    // 8. The band between the thresholds.
    Decision::manual(
        format!(
            "score {final_score} between rejection ({}) and approval ({}) thresholds",
            config.rejection_threshold, config.approval_threshold
        ),
        final_score,
    )
}

/// Decide and publish the matching domain event.
pub fn decide_and_emit(
    input: &DecisionInput<'_>,
    config: &DecisionConfig,
    sink: &dyn EventSink,
) -> Decision {
    let decision = decide(input, config);
    let mut flags: Vec<String> = input
        .special
        .names()
        .into_iter()
        .map(str::to_string)
        .collect();
    flags.extend(input.quality.names().into_iter().map(str::to_string));

    let event = match decision.outcome {
        Outcome::Approved => DomainEvent::VenueApproved {
            venue_id: input.venue.id,
            reason: decision.reason.clone(),
            final_score: decision.final_score,
            flags,
        },
        Outcome::Rejected => DomainEvent::VenueRejected {
            venue_id: input.venue.id,
            reason: decision.reason.clone(),
            final_score: decision.final_score,
            flags,
        },
        Outcome::ManualReview => DomainEvent::VenueRequiresManualReview {
            venue_id: input.venue.id,
            reason: decision
                .review_reason
                .clone()
                .unwrap_or_else(|| decision.reason.clone()),
            final_score: decision.final_score,
            flags,
        },
    };
    sink.publish(event);
    decision
}
