//! Deterministic field-level agreement scoring between a submitted record
//! and its looked-up place, producing the nine-dimension breakdown.

use std::collections::BTreeSet;

use crate::domain::score::weights;
use crate::domain::{BusinessStatus, PlaceRecord, ScoreBreakdown, Venue};

use super::normalize::{
    normalize_address, normalize_phone, normalize_website, parse_hours, website_domain, DayHours,
};

/// Comparator output consumed by the quality flags and the decision
/// engine.
#[derive(Debug, Clone, Default)]
pub struct Comparison {
    pub breakdown: ScoreBreakdown,
    /// Haversine distance between submitted and looked-up coordinates,
    /// when both exist.
    pub distance_meters: Option<f64>,
    /// Number of dimensions in clear disagreement (fraction below 0.5).
    pub conflicts: u32,
}

/// Compare the originally submitted record against the looked-up place.
/// Back-filling must not happen before this call; agreement is measured
/// against what the submitter actually authored.
pub fn compare(venue: &Venue, place: &PlaceRecord) -> Comparison {
    let name = name_similarity(&venue.name, &place.name);
    let address = address_similarity(venue, place);
    let (geo, distance) = geolocation_score(venue, place);
    let phone = phone_similarity(venue.phone.as_deref(), place.formatted_phone.as_deref());
    let hours = hours_similarity(venue, place);
    let website = website_similarity(venue.url.as_deref(), place.website.as_deref());
    let status = business_status_score(place.business_status);
    let postal = postal_similarity(venue.zipcode.as_deref(), place.postal_code());
    let vegan = vegan_relevance(venue);

    let breakdown = ScoreBreakdown {
        name_match: scale(name, weights::NAME_MATCH),
        address_accuracy: scale(address, weights::ADDRESS_ACCURACY),
        geolocation: scale(geo, weights::GEOLOCATION),
        phone: scale(phone, weights::PHONE),
        hours: scale(hours, weights::HOURS),
        website: scale(website, weights::WEBSITE),
        business_status: scale(status, weights::BUSINESS_STATUS),
        postal_code: scale(postal, weights::POSTAL_CODE),
        vegan_relevance: scale(vegan, weights::VEGAN_RELEVANCE),
    };

    let conflicts = [name, address, phone, hours, website, postal]
        .iter()
        .filter(|f| **f < 0.5)
        .count() as u32;

    Comparison {
        breakdown,
        distance_meters: distance,
        conflicts,
    }
}

fn scale(fraction: f64, weight: u8) -> u8 {
    (fraction.clamp(0.0, 1.0) * weight as f64).round() as u8
}

/// Character-set overlap (Jaccard over lowercase alphanumerics).
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let set = |s: &str| -> BTreeSet<char> {
        s.to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect()
    };
    let (sa, sb) = (set(a), set(b));
    if sa.is_empty() && sb.is_empty() {
        return 1.0;
    }
    if sa.is_empty() || sb.is_empty() {
        return 0.0;
    }
    let intersection = sa.intersection(&sb).count() as f64;
    let union = sa.union(&sb).count() as f64;
    intersection / union
}

/// Weighted address comparison after abbreviation normalization:
/// street 60%, number 30%, zip 10%.
fn address_similarity(venue: &Venue, place: &PlaceRecord) -> f64 {
    let submitted = normalize_address(&venue.location);
    let looked_up = normalize_address(&place.formatted_address);
    if submitted.is_empty() || looked_up.is_empty() {
        return if submitted == looked_up { 1.0 } else { 0.0 };
    }

    let street = token_overlap(&street_tokens(&submitted), &street_tokens(&looked_up));
    let number = match (street_number(&submitted), street_number(&looked_up)) {
        (Some(a), Some(b)) if a == b => 1.0,
        (None, None) => 1.0,
        _ => 0.0,
    };
    let zip = {
        let submitted_zip = venue
            .zipcode
            .as_deref()
            .map(str::to_string)
            .or_else(|| zip_token(&submitted));
        let looked_up_zip = place
            .postal_code()
            .map(str::to_string)
            .or_else(|| zip_token(&looked_up));
        match (submitted_zip, looked_up_zip) {
            (Some(a), Some(b)) if a == b => 1.0,
            (None, None) => 1.0,
            _ => 0.0,
        }
    };

    0.6 * street + 0.3 * number + 0.1 * zip
}

fn street_tokens(address: &str) -> BTreeSet<String> {
    address
        .split_whitespace()
        .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}

fn street_number(address: &str) -> Option<String> {
    address
        .split_whitespace()
        .find(|t| !t.is_empty() && t.chars().all(|c| c.is_ascii_digit()) && t.len() < 5)
        .map(str::to_string)
}

fn zip_token(address: &str) -> Option<String> {
    address
        .split_whitespace()
        .find(|t| t.len() == 5 && t.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

fn token_overlap(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

/// Great-circle distance in meters.
pub fn haversine_meters(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Full marks within 50 m, linear decay to zero at 500 m.
fn geolocation_score(venue: &Venue, place: &PlaceRecord) -> (f64, Option<f64>) {
    let submitted = venue.coordinates();
    let looked_up = place.location;
    match (submitted, looked_up) {
        (Some((lat, lng)), Some(pl)) => {
            let distance = haversine_meters(lat, lng, pl.lat, pl.lng);
            let score = if distance <= 50.0 {
                1.0
            } else if distance >= 500.0 {
                0.0
            } else {
                1.0 - (distance - 50.0) / 450.0
            };
            (score, Some(distance))
        }
        // One side has no coordinates; nothing to compare.
        _ => (0.5, None),
    }
}

fn phone_similarity(submitted: Option<&str>, looked_up: Option<&str>) -> f64 {
    let submitted = submitted.map(normalize_phone).filter(|p| !p.is_empty());
    let looked_up = looked_up.map(normalize_phone).filter(|p| !p.is_empty());
    match (submitted, looked_up) {
        (Some(a), Some(b)) => {
            if a == b {
                1.0
            } else if last_digits(&a, 10) == last_digits(&b, 10) {
                0.8
            } else {
                0.0
            }
        }
        (None, None) => 1.0,
        _ => 0.5,
    }
}

fn last_digits(phone: &str, count: usize) -> String {
    let digits: Vec<char> = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    digits
        .iter()
        .skip(digits.len().saturating_sub(count))
        .collect()
}

/// Per-weekday range comparison with a two-hour linear tolerance per
/// endpoint. Both sides missing is neutral; exactly one side missing is
/// half credit.
fn hours_similarity(venue: &Venue, place: &PlaceRecord) -> f64 {
    let submitted_entries: Vec<String> = venue.hours.iter().map(|h| h.to_string()).collect();
    let submitted = parse_hours(&submitted_entries);
    let looked_up = parse_hours(&place.weekday_text);

    match (submitted.is_empty(), looked_up.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.5,
        (false, false) => {}
    }

    let days: BTreeSet<&str> = submitted
        .iter()
        .chain(looked_up.iter())
        .map(|h| h.day)
        .collect();
    let mut total = 0.0;
    for day in &days {
        let a = submitted.iter().find(|h| h.day == *day);
        let b = looked_up.iter().find(|h| h.day == *day);
        total += match (a, b) {
            (Some(a), Some(b)) => day_score(*a, *b),
            _ => 0.5,
        };
    }
    total / days.len() as f64
}

fn day_score(a: DayHours, b: DayHours) -> f64 {
    const TOLERANCE_MINUTES: f64 = 120.0;
    let endpoint = |x: u32, y: u32| -> f64 {
        let diff = (x as f64 - y as f64).abs();
        (1.0 - diff / TOLERANCE_MINUTES).max(0.0)
    };
    (endpoint(a.start_minutes, b.start_minutes) + endpoint(a.end_minutes, b.end_minutes)) / 2.0
}

fn website_similarity(submitted: Option<&str>, looked_up: Option<&str>) -> f64 {
    let submitted = submitted.map(normalize_website).filter(|u| !u.is_empty());
    let looked_up = looked_up.map(normalize_website).filter(|u| !u.is_empty());
    match (submitted, looked_up) {
        (Some(a), Some(b)) => {
            if a == b {
                1.0
            } else if website_domain(&a) == website_domain(&b) {
                0.8
            } else {
                0.0
            }
        }
        (None, None) => 1.0,
        _ => 0.5,
    }
}

fn business_status_score(status: BusinessStatus) -> f64 {
    match status {
        BusinessStatus::Operational => 1.0,
        BusinessStatus::TemporarilyClosed => 0.4,
        BusinessStatus::PermanentlyClosed => 0.0,
        BusinessStatus::Unknown => 0.4,
    }
}

fn postal_similarity(submitted: Option<&str>, looked_up: Option<&str>) -> f64 {
    let submitted = submitted.map(str::trim).filter(|z| !z.is_empty());
    let looked_up = looked_up.map(str::trim).filter(|z| !z.is_empty());
    match (submitted, looked_up) {
        (Some(a), Some(b)) => {
            if a.eq_ignore_ascii_case(b) {
                1.0
            } else if a.len() >= 3
                && b.len() >= 3
                && a.is_char_boundary(3)
                && b.is_char_boundary(3)
                && a[..3].eq_ignore_ascii_case(&b[..3])
            {
                0.6
            } else {
                0.0
            }
        }
        (None, None) => 1.0,
        _ => 0.4,
    }
}

const MEAT_INDICATORS: &[&str] = &[
    "steakhouse",
    "butcher",
    "bbq ribs",
    "meat lovers",
    "fried chicken",
];

/// Heuristic default of full relevance, reduced sharply when the
/// description reads meat-centric.
fn vegan_relevance(venue: &Venue) -> f64 {
    let description = venue
        .description
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();
    if MEAT_INDICATORS.iter().any(|t| description.contains(t)) {
        0.2
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::place::test_place;
    use crate::domain::venue::test_venue;

    #[test]
    fn test_name_similarity_identical_and_disjoint() {
        assert_eq!(name_similarity("Green Leaf", "green leaf"), 1.0);
        assert_eq!(name_similarity("", ""), 1.0);
        assert_eq!(name_similarity("abc", "xyz"), 0.0);
        let partial = name_similarity("Green Leaf", "Green Loft");
        assert!(partial > 0.0 && partial < 1.0);
    }

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude is roughly 111 km.
        let d = haversine_meters(40.0, -73.0, 41.0, -73.0);
        assert!((d - 111_000.0).abs() < 500.0);
        assert_eq!(haversine_meters(40.0, -73.0, 40.0, -73.0), 0.0);
    }

    #[test]
    fn test_geolocation_decay() {
        let mut venue = test_venue(1);
        let mut place = test_place();
        // ~40 m offset: full marks.
        venue.lat = Some(40.0);
        place.location = Some(crate::domain::LatLng {
            lat: 40.00036,
            lng: -73.0,
        });
        let (score, distance) = geolocation_score(&venue, &place);
        assert_eq!(score, 1.0);
        assert!(distance.unwrap() < 50.0);

        // ~700 m offset: zero.
        place.location = Some(crate::domain::LatLng {
            lat: 40.0063,
            lng: -73.0,
        });
        let (score, distance) = geolocation_score(&venue, &place);
        assert_eq!(score, 0.0);
        assert!(distance.unwrap() > 500.0);
    }

    #[test]
    fn test_phone_last_ten_digits() {
        assert_eq!(
            phone_similarity(Some("+1 503 555 0100"), Some("(503) 555-0100")),
            0.8
        );
        assert_eq!(
            phone_similarity(Some("(503) 555-0100"), Some("503.555.0100")),
            1.0
        );
        assert_eq!(phone_similarity(None, None), 1.0);
        assert_eq!(phone_similarity(Some("+15035550100"), None), 0.5);
    }

    #[test]
    fn test_website_same_domain() {
        assert_eq!(
            website_similarity(
                Some("https://greenleaf.example.com"),
                Some("http://www.greenleaf.example.com/")
            ),
            1.0
        );
        assert_eq!(
            website_similarity(
                Some("https://greenleaf.example.com/menu"),
                Some("https://greenleaf.example.com/about")
            ),
            0.8
        );
        assert_eq!(
            website_similarity(
                Some("https://greenleaf.example.com"),
                Some("https://other.example.org")
            ),
            0.0
        );
    }

    #[test]
    fn test_postal_prefix_match() {
        assert_eq!(postal_similarity(Some("97201"), Some("97201")), 1.0);
        assert_eq!(postal_similarity(Some("97201"), Some("97299")), 0.6);
        assert_eq!(postal_similarity(Some("97201"), Some("10001")), 0.0);
        assert_eq!(postal_similarity(None, None), 1.0);
        assert_eq!(postal_similarity(Some("97201"), None), 0.4);
    }

    #[test]
    fn test_hours_exact_match_and_tolerance() {
        let mut venue = test_venue(1);
        venue.hours = Some("Mon-11:00-21:00".to_string());
        let mut place = test_place();
        place.weekday_text = vec!["Monday: 11:00 AM – 9:00 PM".to_string()];
        assert_eq!(hours_similarity(&venue, &place), 1.0);

        // One hour off on each endpoint: half credit per endpoint.
        place.weekday_text = vec!["Monday: 12:00 PM – 10:00 PM".to_string()];
        let score = hours_similarity(&venue, &place);
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_hours_missing_sides() {
        let mut venue = test_venue(1);
        venue.hours = None;
        let mut place = test_place();
        place.weekday_text.clear();
        assert_eq!(hours_similarity(&venue, &place), 1.0);

        place.weekday_text = vec!["Monday: 11:00 AM – 9:00 PM".to_string()];
        assert_eq!(hours_similarity(&venue, &place), 0.5);
    }

    #[test]
    fn test_business_status_mapping() {
        assert_eq!(business_status_score(BusinessStatus::Operational), 1.0);
        assert_eq!(business_status_score(BusinessStatus::TemporarilyClosed), 0.4);
        assert_eq!(business_status_score(BusinessStatus::PermanentlyClosed), 0.0);
        assert_eq!(business_status_score(BusinessStatus::Unknown), 0.4);
    }

    #[test]
    fn test_vegan_relevance_meat_indicator() {
        let mut venue = test_venue(1);
        assert_eq!(vegan_relevance(&venue), 1.0);
        venue.description = Some("Formerly a steakhouse".to_string());
        assert_eq!(vegan_relevance(&venue), 0.2);
    }

    #[test]
    fn test_compare_total_is_component_sum() {
        let venue = test_venue(1);
        let place = test_place();
        let comparison = compare(&venue, &place);
        let map_sum: i64 = comparison.breakdown.to_map().values().sum();
        assert_eq!(map_sum, comparison.breakdown.total() as i64);
        assert!(comparison.breakdown.total() <= 100);
        // The fixture agrees on most fields; expect few conflicts.
        assert!(comparison.conflicts <= 1);
    }

    #[test]
    fn test_compare_conflict_count() {
        let mut venue = test_venue(1);
        venue.name = "Totally Different".to_string();
        venue.phone = Some("+19998887777".to_string());
        venue.url = Some("https://unrelated.example.org".to_string());
        venue.zipcode = Some("10001".to_string());
        let place = test_place();
        let comparison = compare(&venue, &place);
        assert!(comparison.conflicts >= 3);
    }
}
