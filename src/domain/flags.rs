//! Special-case and quality flags feeding the decision engine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::score::ScoreBreakdown;
use super::venue::Venue;

const KOREAN_TOKENS: &[&str] = &["korea", "korean", "seoul", "서울", "한국"];
const CHINESE_TOKENS: &[&str] = &[
    "china", "chinese", "beijing", "shanghai", "中国", "北京", "上海",
];
const SUSPICIOUS_TOKENS: &[&str] = &["test", "fake", "spam", "promotional"];

/// Flags computed from the record alone, before any external call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialFlags {
    pub korean_venue: bool,
    pub chinese_venue: bool,
    /// Created less than six months ago.
    pub new_business: bool,
    /// Phone and URL are both missing.
    pub minimal_contact_info: bool,
    /// Description contains a suspicious token.
    pub suspicious_content: bool,
}

impl SpecialFlags {
    /// Compute the flags. `now` is passed in so the decision stays a pure
    /// function of its inputs.
    pub fn compute(venue: &Venue, now: DateTime<Utc>) -> Self {
        let haystack = format!("{} {}", venue.location, venue.name).to_lowercase();
        let description = venue
            .description
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();

        Self {
            korean_venue: KOREAN_TOKENS.iter().any(|t| haystack.contains(t)),
            chinese_venue: CHINESE_TOKENS.iter().any(|t| haystack.contains(t)),
            new_business: now.signed_duration_since(venue.created_at) < Duration::days(183),
            minimal_contact_info: venue.missing_contact_info(),
            suspicious_content: SUSPICIOUS_TOKENS.iter().any(|t| description.contains(t)),
        }
    }

    /// A region-language flag routes non-admin submissions to manual
    /// review before any external call is spent.
    pub fn region_language(&self) -> bool {
        self.korean_venue || self.chinese_venue
    }

    pub fn any(&self) -> bool {
        self.korean_venue
            || self.chinese_venue
            || self.new_business
            || self.minimal_contact_info
            || self.suspicious_content
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.korean_venue {
            names.push("korean_venue");
        }
        if self.chinese_venue {
            names.push("chinese_venue");
        }
        if self.new_business {
            names.push("new_business");
        }
        if self.minimal_contact_info {
            names.push("minimal_contact_info");
        }
        if self.suspicious_content {
            names.push("suspicious_content");
        }
        names
    }
}

/// Flags derived from enrichment and the score breakdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityFlags {
    pub no_google_data: bool,
    /// More than three field-level conflicts with the looked-up place.
    pub multiple_conflicts: bool,
    /// Submitted and looked-up coordinates more than 500 m apart.
    pub location_mismatch: bool,
    pub missing_name: bool,
    pub missing_location: bool,
    pub missing_coordinates: bool,
    pub zero_name_match: bool,
    pub zero_address_accuracy: bool,
    pub zero_geolocation: bool,
    pub zero_vegan_relevance: bool,
}

impl QualityFlags {
    pub fn compute(
        venue: &Venue,
        place_found: bool,
        distance_meters: Option<f64>,
        conflicts: u32,
        breakdown: &ScoreBreakdown,
    ) -> Self {
        Self {
            no_google_data: !place_found,
            multiple_conflicts: conflicts > 3,
            location_mismatch: distance_meters.map(|d| d > 500.0).unwrap_or(false),
            missing_name: venue.name.trim().is_empty(),
            missing_location: venue.location.trim().is_empty(),
            missing_coordinates: venue.coordinates().is_none(),
            zero_name_match: place_found && breakdown.name_match == 0,
            zero_address_accuracy: place_found && breakdown.address_accuracy == 0,
            zero_geolocation: place_found && breakdown.geolocation == 0,
            zero_vegan_relevance: place_found && breakdown.vegan_relevance == 0,
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.no_google_data {
            names.push("no_google_data");
        }
        if self.multiple_conflicts {
            names.push("multiple_conflicts");
        }
        if self.location_mismatch {
            names.push("location_mismatch");
        }
        if self.missing_name {
            names.push("missing_name");
        }
        if self.missing_location {
            names.push("missing_location");
        }
        if self.missing_coordinates {
            names.push("missing_coordinates");
        }
        if self.zero_name_match {
            names.push("zero_name_match");
        }
        if self.zero_address_accuracy {
            names.push("zero_address_accuracy");
        }
        if self.zero_geolocation {
            names.push("zero_geolocation");
        }
        if self.zero_vegan_relevance {
            names.push("zero_vegan_relevance");
        }
        names
    }
}
