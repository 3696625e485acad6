//! Submitter profile as assembled from the members, ambassadors, and
//! venue_admin tables.

use serde::{Deserialize, Serialize};

/// The user who created a venue record, with the standing that the trust
/// calculator consumes. Relationships are identifier-based; the venue keeps
/// only `member_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submitter {
    pub id: i64,
    pub display_name: String,
    pub trusted: bool,
    /// Cumulative contribution count across the platform.
    pub contributions: i64,
    pub ambassador_level: Option<i32>,
    pub ambassador_points: Option<i64>,
    pub ambassador_region: Option<String>,
    /// True when the submitter is an owner/steward of the venue being
    /// validated (per-venue, resolved against venue_admin).
    pub is_venue_admin: bool,
    /// Number of this submitter's venues that were ultimately approved.
    pub approved_venues: i64,
}

#[cfg(test)]
pub(crate) fn test_submitter(id: i64) -> Submitter {
    Submitter {
        id,
        display_name: "casey".to_string(),
        trusted: false,
        contributions: 12,
        ambassador_level: None,
        ambassador_points: None,
        ambassador_region: None,
        is_venue_admin: false,
        approved_venues: 0,
    }
}
