//! Trust calculator: maps a submitter to an authority tier, a trust level
//! in [0, 1], and a bonus-point budget.

use serde::{Deserialize, Serialize};

use super::submitter::Submitter;

/// Authority tier, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityTier {
    VenueAdmin,
    HighAmbassador,
    Ambassador,
    Trusted,
    Regular,
}

impl AuthorityTier {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthorityTier::VenueAdmin => "venue_admin",
            AuthorityTier::HighAmbassador => "high_ambassador",
            AuthorityTier::Ambassador => "ambassador",
            AuthorityTier::Trusted => "trusted",
            AuthorityTier::Regular => "regular",
        }
    }
}

/// Derived authority assessment. Never persisted; recomputed per attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityAssessment {
    /// Trust level in [0, 1].
    pub trust: f64,
    pub tier: AuthorityTier,
    /// Bonus points added to the model score when authority mode is on.
    pub bonus: u32,
    pub reason: String,
}

impl AuthorityAssessment {
    /// High-trust submitters get their authored contact fields and
    /// coordinates preferred over looked-up data.
    pub fn is_high_trust(&self) -> bool {
        self.trust >= 0.8 || self.tier == AuthorityTier::VenueAdmin
    }
}

/// One-sided region check: the ambassador's region text must appear within
/// the venue location text, case-insensitively. The reverse containment is
/// deliberately not required.
pub fn matches_region(ambassador_region: &str, venue_location: &str) -> bool {
    let region = ambassador_region.trim().to_lowercase();
    if region.is_empty() {
        return false;
    }
    venue_location.to_lowercase().contains(&region)
}

/// Compute the authority assessment for a submitter against the venue's
/// location text. First matching tier wins, then contribution and
/// approved-venue boosts are added and the result is clamped to [0, 1].
pub fn assess(submitter: &Submitter, venue_location: &str) -> AuthorityAssessment {
    let (tier, base_trust, bonus, reason) = if submitter.is_venue_admin {
        (
            AuthorityTier::VenueAdmin,
            1.0,
            50,
            "Venue admin submission".to_string(),
        )
    } else if let (Some(level), Some(points)) =
        (submitter.ambassador_level, submitter.ambassador_points)
    {
        let region_match = submitter
            .ambassador_region
            .as_deref()
            .map(|r| matches_region(r, venue_location))
            .unwrap_or(false);
        if (level >= 3 || points >= 1000) && region_match {
            (
                AuthorityTier::HighAmbassador,
                0.8,
                30,
                format!("High ambassador (level {level}, {points} points) in matching region"),
            )
        } else {
            (
                AuthorityTier::Ambassador,
                0.6,
                15,
                format!("Ambassador (level {level}, {points} points)"),
            )
        }
    } else if submitter.trusted {
        (
            AuthorityTier::Trusted,
            0.7,
            10,
            "Trusted member".to_string(),
        )
    } else {
        (AuthorityTier::Regular, 0.3, 0, "Regular member".to_string())
    };

    let mut trust: f64 = base_trust;
    if submitter.contributions > 100 {
        trust += 0.1;
    }
    if submitter.contributions > 500 {
        trust += 0.1;
    }
    for threshold in [2, 5, 10] {
        if submitter.approved_venues >= threshold {
            trust += 0.15;
        }
    }

    AuthorityAssessment {
        trust: trust.clamp(0.0, 1.0),
        tier,
        bonus,
        reason,
    }
}
