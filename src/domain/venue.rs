//! Venue records pending editorial review.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tri-state approval status, stored as `active` in the venues table
/// (0 pending, 1 approved, -1 rejected).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn from_db(value: i16) -> Self {
        match value {
            1 => ApprovalStatus::Approved,
            -1 => ApprovalStatus::Rejected,
            _ => ApprovalStatus::Pending,
        }
    }

    pub fn to_db(self) -> i16 {
        match self {
            ApprovalStatus::Pending => 0,
            ApprovalStatus::Approved => 1,
            ApprovalStatus::Rejected => -1,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }
}

/// Entry classification: place to eat vs place to shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Eatery,
    Store,
}

impl EntryType {
    pub fn from_db(value: i16) -> Self {
        match value {
            1 => EntryType::Store,
            _ => EntryType::Eatery,
        }
    }

    pub fn to_db(self) -> i16 {
        match self {
            EntryType::Eatery => 0,
            EntryType::Store => 1,
        }
    }
}

/// A user-submitted venue entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Venue {
    pub id: i64,
    pub name: String,
    /// Free-form location text as authored ("123 Vegan St, Portland OR").
    pub location: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub zipcode: Option<String>,
    pub phone: Option<String>,
    pub url: Option<String>,
    pub social_url: Option<String>,
    pub hours: Option<String>,
    pub description: Option<String>,
    /// Geographic path, `continent|country|region|city`.
    pub path: Option<String>,
    pub entry_type: EntryType,
    pub vegan: bool,
    pub vegetarian_only: bool,
    pub category_id: Option<i32>,
    pub member_id: i64,
    pub admin_note: Option<String>,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub last_admin_update: Option<DateTime<Utc>>,
}

impl Venue {
    /// A record is eligible for automated processing iff it is still
    /// pending and carries no admin note (non-empty notes force manual
    /// review).
    pub fn automation_eligible(&self) -> bool {
        self.status == ApprovalStatus::Pending
            && self
                .admin_note
                .as_deref()
                .map(|n| n.trim().is_empty())
                .unwrap_or(true)
    }

    /// Coordinates, when both components are present and non-zero.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) if lat != 0.0 || lng != 0.0 => Some((lat, lng)),
            _ => None,
        }
    }

    /// True when neither a phone number nor any URL was submitted.
    pub fn missing_contact_info(&self) -> bool {
        is_blank(&self.phone) && is_blank(&self.url) && is_blank(&self.social_url)
    }
}

pub(crate) fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(|v| v.trim().is_empty()).unwrap_or(true)
}

#[cfg(test)]
pub(crate) fn test_venue(id: i64) -> Venue {
    Venue {
        id,
        name: "Green Leaf".to_string(),
        location: "123 Vegan St, Portland, OR".to_string(),
        lat: Some(40.0),
        lng: Some(-73.0),
        zipcode: Some("97201".to_string()),
        phone: Some("+1 503 555 0100".to_string()),
        url: Some("https://greenleaf.example.com".to_string()),
        social_url: None,
        hours: Some("Mon-11:00-21:00".to_string()),
        description: Some("Cozy plant-based bistro".to_string()),
        path: Some("north-america|usa|oregon|portland".to_string()),
        entry_type: EntryType::Eatery,
        vegan: true,
        vegetarian_only: false,
        category_id: Some(1),
        member_id: 7,
        admin_note: None,
        status: ApprovalStatus::Pending,
        created_at: chrono::Utc::now() - chrono::Duration::days(400),
        last_admin_update: None,
    }
}
