//! Combined-info builder: the deterministic merge of submitted and
//! looked-up venue data into a single canonical view, with every field
//! annotated by its source.

use serde::{Deserialize, Serialize};

use super::authority::AuthorityAssessment;
use super::place::PlaceRecord;
use super::submitter::Submitter;
use super::venue::{EntryType, Venue};
use crate::error::PipelineError;

/// Where a merged field's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Submitted,
    LookedUp,
    Empty,
}

/// A merged string field with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcedField {
    pub value: String,
    pub source: FieldSource,
}

impl SourcedField {
    fn submitted(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            source: FieldSource::Submitted,
        }
    }

    fn looked_up(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            source: FieldSource::LookedUp,
        }
    }

    fn empty() -> Self {
        Self {
            value: String::new(),
            source: FieldSource::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.trim().is_empty()
    }
}

/// Canonical merged view of a venue, used for prompting the model and for
/// building the approval-time replacement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedInfo {
    pub name: SourcedField,
    pub address: SourcedField,
    pub phone: SourcedField,
    pub website: SourcedField,
    pub hours: Vec<String>,
    pub hours_source: FieldSource,
    pub lat: f64,
    pub lng: f64,
    pub coords_source: FieldSource,
    /// Place taxonomy tags; looked-up is the source of truth.
    pub types: Vec<String>,
    pub description: String,
    pub path: String,
    pub venue_type: String,
    pub vegan_status: String,
    pub category: String,
    /// Looked-up type tags contain no member of the expected set for the
    /// derived category.
    pub type_mismatch: bool,
}

/// Fixed label table for the derived category.
pub fn category_label(category_id: Option<i32>) -> &'static str {
    match category_id {
        Some(1) => "restaurant",
        Some(2) => "health store",
        Some(3) => "veg store",
        Some(4) => "bakery",
        Some(5) => "juice bar",
        Some(6) => "catering",
        Some(7) => "delivery",
        Some(8) => "ice cream",
        Some(9) => "food truck",
        Some(10) => "market vendor",
        Some(11) => "farmers market",
        Some(12) => "other",
        _ => "uncategorized",
    }
}

fn vegan_status_label(venue: &Venue) -> &'static str {
    if venue.vegan {
        "vegan"
    } else if venue.vegetarian_only {
        "vegetarian"
    } else {
        "veg-options"
    }
}

/// Expected place-taxonomy tags per derived venue type. A looked-up tag
/// set disjoint from the expected set marks a type mismatch.
fn expected_types(entry_type: EntryType) -> &'static [&'static str] {
    match entry_type {
        EntryType::Eatery => &[
            "restaurant",
            "food",
            "meal_takeaway",
            "cafe",
            "establishment",
            "point_of_interest",
        ],
        EntryType::Store => &[
            "establishment",
            "store",
            "supermarket",
            "food",
            "cafe",
            "grocery_or_supermarket",
        ],
    }
}

/// Build the combined view.
///
/// Merge rules, in field order: name is editorial and submitted wins;
/// address is standardized and looked-up wins; phone/website/coordinates
/// follow trust (high-trust or venue-admin submitters keep their values);
/// hours prefer the submitted string; types come only from lookup;
/// description and path are submitted-only. Fails when the result has
/// neither an address nor valid coordinates.
pub fn build(
    venue: &Venue,
    place: Option<&PlaceRecord>,
    submitter: &Submitter,
    authority: &AuthorityAssessment,
) -> Result<CombinedInfo, PipelineError> {
    let prefer_submitted = authority.is_high_trust() || submitter.is_venue_admin;

    let name = if !venue.name.trim().is_empty() {
        SourcedField::submitted(venue.name.trim())
    } else if let Some(p) = place.filter(|p| !p.name.trim().is_empty()) {
        SourcedField::looked_up(p.name.trim())
    } else {
        SourcedField::empty()
    };

    let address = match place.filter(|p| !p.formatted_address.trim().is_empty()) {
        Some(p) => SourcedField::looked_up(p.formatted_address.trim()),
        None if !venue.location.trim().is_empty() => SourcedField::submitted(venue.location.trim()),
        None => SourcedField::empty(),
    };

    let phone = merge_contact_field(
        venue.phone.as_deref(),
        place.and_then(|p| p.formatted_phone.as_deref()),
        prefer_submitted,
    );
    let website = merge_contact_field(
        venue.url.as_deref(),
        place.and_then(|p| p.website.as_deref()),
        prefer_submitted,
    );

    let (hours, hours_source) = match venue.hours.as_deref().filter(|h| !h.trim().is_empty()) {
        Some(h) => (vec![h.trim().to_string()], FieldSource::Submitted),
        None => match place.filter(|p| !p.weekday_text.is_empty()) {
            Some(p) => (p.weekday_text.clone(), FieldSource::LookedUp),
            None => (Vec::new(), FieldSource::Empty),
        },
    };

    let submitted_coords = venue.coordinates();
    let looked_up_coords = place.and_then(|p| p.location).map(|l| (l.lat, l.lng));
    let (lat, lng, coords_source) = if prefer_submitted {
        match submitted_coords.or(looked_up_coords) {
            Some((lat, lng)) => (
                lat,
                lng,
                if submitted_coords.is_some() {
                    FieldSource::Submitted
                } else {
                    FieldSource::LookedUp
                },
            ),
            None => (0.0, 0.0, FieldSource::Empty),
        }
    } else {
        match looked_up_coords.or(submitted_coords) {
            Some((lat, lng)) => (
                lat,
                lng,
                if looked_up_coords.is_some() {
                    FieldSource::LookedUp
                } else {
                    FieldSource::Submitted
                },
            ),
            None => (0.0, 0.0, FieldSource::Empty),
        }
    };

    let types = place.map(|p| p.types.clone()).unwrap_or_default();
    let type_mismatch = match place {
        Some(p) if !p.types.is_empty() => {
            let expected = expected_types(venue.entry_type);
            !p.types.iter().any(|t| expected.contains(&t.as_str()))
        }
        _ => false,
    };

    let combined = CombinedInfo {
        name,
        address,
        phone,
        website,
        hours,
        hours_source,
        lat,
        lng,
        coords_source,
        types,
        description: venue
            .description
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_string(),
        path: venue.path.as_deref().unwrap_or_default().to_string(),
        venue_type: match venue.entry_type {
            EntryType::Eatery => "restaurant".to_string(),
            EntryType::Store => "store".to_string(),
        },
        vegan_status: vegan_status_label(venue).to_string(),
        category: category_label(venue.category_id).to_string(),
        type_mismatch,
    };

    if combined.address.is_empty() && combined.coords_source == FieldSource::Empty {
        return Err(PipelineError::validation(
            "combined_info",
            "record has neither an address nor valid coordinates",
        ));
    }

    Ok(combined)
}

/// Phone/website rule: empty-submitted is missing; missing falls back to
/// looked-up; otherwise trust decides which side wins.
fn merge_contact_field(
    submitted: Option<&str>,
    looked_up: Option<&str>,
    prefer_submitted: bool,
) -> SourcedField {
    let submitted = submitted.map(str::trim).filter(|v| !v.is_empty());
    let looked_up = looked_up.map(str::trim).filter(|v| !v.is_empty());
    match (submitted, looked_up) {
        (None, Some(l)) => SourcedField::looked_up(l),
        (Some(s), None) => SourcedField::submitted(s),
        (Some(s), Some(l)) => {
            if prefer_submitted {
                SourcedField::submitted(s)
            } else {
                SourcedField::looked_up(l)
            }
        }
        (None, None) => SourcedField::empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::authority::assess;
    use crate::domain::place::test_place;
    use crate::domain::submitter::test_submitter;
    use crate::domain::venue::test_venue;

    fn regular_inputs() -> (Venue, Submitter, AuthorityAssessment) {
        let venue = test_venue(1);
        let submitter = test_submitter(7);
        let authority = assess(&submitter, &venue.location);
        (venue, submitter, authority)
    }

    #[test]
    fn test_submitted_name_always_wins() {
        let (venue, submitter, authority) = regular_inputs();
        let place = test_place();
        let combined = build(&venue, Some(&place), &submitter, &authority).unwrap();
        assert_eq!(combined.name.source, FieldSource::Submitted);
        assert_eq!(combined.name.value, venue.name);
    }

    #[test]
    fn test_looked_up_address_always_wins() {
        let (venue, submitter, authority) = regular_inputs();
        let place = test_place();
        let combined = build(&venue, Some(&place), &submitter, &authority).unwrap();
        assert_eq!(combined.address.source, FieldSource::LookedUp);
        assert_eq!(combined.address.value, place.formatted_address);
    }

    #[test]
    fn test_regular_submitter_gets_looked_up_contact_and_coords() {
        let (venue, submitter, authority) = regular_inputs();
        let place = test_place();
        let combined = build(&venue, Some(&place), &submitter, &authority).unwrap();
        assert_eq!(combined.phone.source, FieldSource::LookedUp);
        assert_eq!(combined.website.source, FieldSource::LookedUp);
        assert_eq!(combined.coords_source, FieldSource::LookedUp);
    }

    #[test]
    fn test_venue_admin_keeps_submitted_contact_and_coords() {
        let venue = test_venue(1);
        let mut submitter = test_submitter(7);
        submitter.is_venue_admin = true;
        let authority = assess(&submitter, &venue.location);
        let place = test_place();
        let combined = build(&venue, Some(&place), &submitter, &authority).unwrap();
        assert_eq!(combined.phone.source, FieldSource::Submitted);
        assert_eq!(combined.website.source, FieldSource::Submitted);
        assert_eq!(combined.coords_source, FieldSource::Submitted);
        assert_eq!(combined.lat, venue.lat.unwrap());
    }

    #[test]
    fn test_admin_with_zero_coords_falls_back_to_looked_up() {
        let mut venue = test_venue(1);
        venue.lat = Some(0.0);
        venue.lng = Some(0.0);
        let mut submitter = test_submitter(7);
        submitter.is_venue_admin = true;
        let authority = assess(&submitter, &venue.location);
        let place = test_place();
        let combined = build(&venue, Some(&place), &submitter, &authority).unwrap();
        assert_eq!(combined.coords_source, FieldSource::LookedUp);
    }

    #[test]
    fn test_submitted_hours_win_over_weekday_text() {
        let (venue, submitter, authority) = regular_inputs();
        let place = test_place();
        let combined = build(&venue, Some(&place), &submitter, &authority).unwrap();
        assert_eq!(combined.hours_source, FieldSource::Submitted);
        assert_eq!(combined.hours, vec!["Mon-11:00-21:00".to_string()]);
    }

    #[test]
    fn test_types_come_from_lookup_only() {
        let (venue, submitter, authority) = regular_inputs();
        let combined = build(&venue, None, &submitter, &authority).unwrap();
        assert!(combined.types.is_empty());
        assert!(!combined.type_mismatch);
    }

    #[test]
    fn test_type_mismatch_for_unrelated_tags() {
        let (venue, submitter, authority) = regular_inputs();
        let mut place = test_place();
        place.types = vec!["car_repair".to_string(), "parking".to_string()];
        let combined = build(&venue, Some(&place), &submitter, &authority).unwrap();
        assert!(combined.type_mismatch);
    }

    #[test]
    fn test_no_address_and_no_coords_is_an_error() {
        let mut venue = test_venue(1);
        venue.location = String::new();
        venue.lat = None;
        venue.lng = None;
        let submitter = test_submitter(7);
        let authority = assess(&submitter, "");
        let err = build(&venue, None, &submitter, &authority).unwrap_err();
        assert!(err.to_string().contains("neither an address"));
    }

    #[test]
    fn test_derived_labels() {
        let (venue, submitter, authority) = regular_inputs();
        let combined = build(&venue, None, &submitter, &authority).unwrap();
        assert_eq!(combined.venue_type, "restaurant");
        assert_eq!(combined.vegan_status, "vegan");
        assert_eq!(combined.category, "restaurant");
    }
}
