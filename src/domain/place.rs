//! Externally looked-up place data, normalized from the place-lookup
//! service responses and snapshotted into the validation history.

use serde::{Deserialize, Serialize};

/// Operating state reported by the place-lookup service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusinessStatus {
    Operational,
    TemporarilyClosed,
    PermanentlyClosed,
    Unknown,
}

impl Default for BusinessStatus {
    fn default() -> Self {
        BusinessStatus::Unknown
    }
}

impl BusinessStatus {
    pub fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some("OPERATIONAL") => BusinessStatus::Operational,
            Some("CLOSED_TEMPORARILY") => BusinessStatus::TemporarilyClosed,
            Some("CLOSED_PERMANENTLY") => BusinessStatus::PermanentlyClosed,
            _ => BusinessStatus::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BusinessStatus::Operational => "operational",
            BusinessStatus::TemporarilyClosed => "temporarily_closed",
            BusinessStatus::PermanentlyClosed => "permanently_closed",
            BusinessStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub northeast: LatLng,
    pub southwest: LatLng,
}

/// One structured address component with its type tags
/// (e.g. `street_number`, `route`, `postal_code`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressComponent {
    pub long_name: String,
    pub short_name: String,
    pub types: Vec<String>,
}

/// Normalized place record. Cached per venue after the first successful
/// fetch and snapshotted alongside each history entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaceRecord {
    pub place_id: String,
    pub name: String,
    pub formatted_address: String,
    pub formatted_phone: Option<String>,
    pub website: Option<String>,
    #[serde(default)]
    pub business_status: BusinessStatus,
    pub location: Option<LatLng>,
    pub viewport: Option<Viewport>,
    /// Human-readable opening hours, one entry per weekday
    /// ("Monday: 11:00 AM – 9:00 PM").
    #[serde(default)]
    pub weekday_text: Vec<String>,
    #[serde(default)]
    pub address_components: Vec<AddressComponent>,
    /// Place taxonomy tags ("restaurant", "food", ...).
    #[serde(default)]
    pub types: Vec<String>,
    pub rating: Option<f64>,
    pub user_ratings_total: Option<u32>,
}

impl PlaceRecord {
    /// First address component carrying the given type tag.
    pub fn component(&self, type_tag: &str) -> Option<&AddressComponent> {
        self.address_components
            .iter()
            .find(|c| c.types.iter().any(|t| t == type_tag))
    }

    pub fn postal_code(&self) -> Option<&str> {
        self.component("postal_code").map(|c| c.long_name.as_str())
    }
}

#[cfg(test)]
pub(crate) fn test_place() -> PlaceRecord {
    PlaceRecord {
        place_id: "pl_abc123".to_string(),
        name: "Green Leaf".to_string(),
        formatted_address: "123 Vegan Street, Portland, OR 97201".to_string(),
        formatted_phone: Some("(503) 555-0100".to_string()),
        website: Some("https://greenleaf.example.com/".to_string()),
        business_status: BusinessStatus::Operational,
        location: Some(LatLng {
            lat: 40.0003,
            lng: -73.0,
        }),
        viewport: None,
        weekday_text: vec![
            "Monday: 11:00 AM – 9:00 PM".to_string(),
            "Tuesday: 11:00 AM – 9:00 PM".to_string(),
        ],
        address_components: vec![
            AddressComponent {
                long_name: "123".to_string(),
                short_name: "123".to_string(),
                types: vec!["street_number".to_string()],
            },
            AddressComponent {
                long_name: "Vegan Street".to_string(),
                short_name: "Vegan St".to_string(),
                types: vec!["route".to_string()],
            },
            AddressComponent {
                long_name: "97201".to_string(),
                short_name: "97201".to_string(),
                types: vec!["postal_code".to_string()],
            },
        ],
        types: vec!["restaurant".to_string(), "food".to_string()],
        rating: Some(4.6),
        user_ratings_total: Some(211),
    }
}
