//! Auditable data-replacement model: exactly which record fields change at
//! approval time, captured symmetrically as {original, replacement}.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::combined::{CombinedInfo, FieldSource};
use super::venue::Venue;

/// Candidate field values to apply at approval. Unset fields are left
/// untouched; set-but-blank values are treated as "no change".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalData {
    pub name: Option<String>,
    pub location: Option<String>,
    pub phone: Option<String>,
    pub url: Option<String>,
    pub social_url: Option<String>,
    pub hours: Option<String>,
    pub description: Option<String>,
    pub zipcode: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl ApprovalData {
    /// Candidate values keyed by venue column name. Coordinates are
    /// carried as canonical decimal strings so the diff stays uniform.
    pub fn fields(&self) -> BTreeMap<&'static str, String> {
        let mut fields = BTreeMap::new();
        let mut push = |key: &'static str, value: &Option<String>| {
            if let Some(v) = value {
                fields.insert(key, v.clone());
            }
        };
        push("name", &self.name);
        push("location", &self.location);
        push("phone", &self.phone);
        push("url", &self.url);
        push("social_url", &self.social_url);
        push("hours", &self.hours);
        push("description", &self.description);
        push("zipcode", &self.zipcode);
        if let Some(lat) = self.lat {
            fields.insert("lat", format_coord(lat));
        }
        if let Some(lng) = self.lng {
            fields.insert("lng", format_coord(lng));
        }
        fields
    }

    /// Merge the combined view into approval data, then apply editor
    /// overrides and AI rewrite suggestions on top (overrides win).
    pub fn from_combined(
        combined: &CombinedInfo,
        suggested_name: Option<&str>,
        suggested_description: Option<&str>,
        overrides: &BTreeMap<String, String>,
    ) -> Self {
        let mut data = Self {
            name: non_blank(&combined.name.value),
            location: non_blank(&combined.address.value),
            phone: non_blank(&combined.phone.value),
            url: non_blank(&combined.website.value),
            social_url: None,
            hours: if combined.hours.is_empty() {
                None
            } else {
                Some(combined.hours.join("; "))
            },
            description: non_blank(&combined.description),
            zipcode: None,
            lat: (combined.coords_source != FieldSource::Empty).then_some(combined.lat),
            lng: (combined.coords_source != FieldSource::Empty).then_some(combined.lng),
        };

        if let Some(name) = suggested_name.and_then(|s| non_blank(s)) {
            data.name = Some(name);
        }
        if let Some(description) = suggested_description.and_then(|s| non_blank(s)) {
            data.description = Some(description);
        }

        for (field, value) in overrides {
            match field.as_str() {
                "name" => data.name = non_blank(value),
                "location" => data.location = non_blank(value),
                "phone" => data.phone = non_blank(value),
                "url" => data.url = non_blank(value),
                "social_url" => data.social_url = non_blank(value),
                "hours" => data.hours = non_blank(value),
                "description" => data.description = non_blank(value),
                "zipcode" => data.zipcode = non_blank(value),
                "lat" => data.lat = value.trim().parse().ok(),
                "lng" => data.lng = value.trim().parse().ok(),
                _ => {}
            }
        }

        data
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn format_coord(value: f64) -> String {
    // Canonical form, no trailing zeros beyond six decimals.
    let s = format!("{value:.6}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// The {original, replacement} pair persisted to the audit log. Both maps
/// contain exactly the fields whose normalized values differ.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataReplacement {
    pub original: BTreeMap<String, String>,
    pub replacement: BTreeMap<String, String>,
}

impl DataReplacement {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "original": self.original,
            "replacement": self.replacement,
        })
    }
}

/// Build the replacement for applying `data` to `venue`.
///
/// Returns `None` iff every candidate field is blank after trimming or
/// equal to the record's current value after whitespace normalization;
/// otherwise the pair contains exactly the differing fields on both sides.
pub fn build_replacement(venue: &Venue, data: &ApprovalData) -> Option<DataReplacement> {
    let mut replacement = DataReplacement::default();

    for (field, candidate) in data.fields() {
        let candidate_norm = normalize_ws(&candidate);
        if candidate_norm.is_empty() {
            continue;
        }
        let current = venue_field(venue, field);
        if normalize_ws(&current) == candidate_norm {
            continue;
        }
        replacement
            .original
            .insert(field.to_string(), current.trim().to_string());
        replacement
            .replacement
            .insert(field.to_string(), candidate.trim().to_string());
    }

    if replacement.replacement.is_empty() {
        None
    } else {
        Some(replacement)
    }
}

fn venue_field(venue: &Venue, field: &str) -> String {
    match field {
        "name" => venue.name.clone(),
        "location" => venue.location.clone(),
        "phone" => venue.phone.clone().unwrap_or_default(),
        "url" => venue.url.clone().unwrap_or_default(),
        "social_url" => venue.social_url.clone().unwrap_or_default(),
        "hours" => venue.hours.clone().unwrap_or_default(),
        "description" => venue.description.clone().unwrap_or_default(),
        "zipcode" => venue.zipcode.clone().unwrap_or_default(),
        "lat" => venue.lat.map(format_coord).unwrap_or_default(),
        "lng" => venue.lng.map(format_coord).unwrap_or_default(),
        _ => String::new(),
    }
}

/// Collapse runs of whitespace and trim, so cosmetic differences never
/// count as changes.
fn normalize_ws(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
