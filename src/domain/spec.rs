//! Critical-data specification: the composable predicate gating
//! authority-based auto-approval.

use crate::config::SpecConfig;

use super::combined::CombinedInfo;
use super::venue::Venue;

/// Inputs the specification predicates evaluate against.
#[derive(Debug, Clone, Copy)]
pub struct CriticalDataInput<'a> {
    pub venue: &'a Venue,
    pub combined: &'a CombinedInfo,
    pub place_found: bool,
    pub distance_meters: Option<f64>,
}

/// A single composable predicate over the critical-data inputs.
pub trait Specification: Send + Sync {
    fn is_satisfied_by(&self, input: &CriticalDataInput<'_>) -> bool;

    /// Short name used when reporting which clause failed.
    fn name(&self) -> &'static str;
}

/// Conjunction of specifications; satisfied only when every part is.
pub struct AllOf {
    parts: Vec<Box<dyn Specification>>,
}

impl AllOf {
    pub fn new(parts: Vec<Box<dyn Specification>>) -> Self {
        Self { parts }
    }

    /// The first unsatisfied clause, if any.
    pub fn first_failure(&self, input: &CriticalDataInput<'_>) -> Option<&'static str> {
        self.parts
            .iter()
            .find(|p| !p.is_satisfied_by(input))
            .map(|p| p.name())
    }
}

impl Specification for AllOf {
    fn is_satisfied_by(&self, input: &CriticalDataInput<'_>) -> bool {
        self.parts.iter().all(|p| p.is_satisfied_by(input))
    }

    fn name(&self) -> &'static str {
        "critical_data"
    }
}

/// Name plus either an address or usable coordinates.
pub struct HasBasicGeoAndName;

impl Specification for HasBasicGeoAndName {
    fn is_satisfied_by(&self, input: &CriticalDataInput<'_>) -> bool {
        let has_name = !input.combined.name.is_empty();
        let has_geo = !input.combined.address.is_empty()
            || (input.combined.lat != 0.0 || input.combined.lng != 0.0);
        has_name && has_geo
    }

    fn name(&self) -> &'static str {
        "basic_geo_and_name"
    }
}

/// At least `min_fields` of {phone, website, hours} present in the merged
/// view.
pub struct HasCompleteContactInfo {
    pub min_fields: usize,
}

impl Specification for HasCompleteContactInfo {
    fn is_satisfied_by(&self, input: &CriticalDataInput<'_>) -> bool {
        let mut present = 0usize;
        if !input.combined.phone.is_empty() {
            present += 1;
        }
        if !input.combined.website.is_empty() {
            present += 1;
        }
        if !input.combined.hours.is_empty() {
            present += 1;
        }
        present >= self.min_fields
    }

    fn name(&self) -> &'static str {
        "complete_contact_info"
    }
}

/// The listing is plausibly vegan-relevant: flagged vegan/vegetarian, or
/// nothing in the description reads as meat-centric.
pub struct IsVeganRelevant;

const MEAT_INDICATORS: &[&str] = &[
    "steakhouse",
    "butcher",
    "bbq ribs",
    "meat lovers",
    "fried chicken",
];

impl Specification for IsVeganRelevant {
    fn is_satisfied_by(&self, input: &CriticalDataInput<'_>) -> bool {
        if input.venue.vegan || input.venue.vegetarian_only {
            return true;
        }
        let description = input.combined.description.to_lowercase();
        !MEAT_INDICATORS.iter().any(|t| description.contains(t))
    }

    fn name(&self) -> &'static str {
        "vegan_relevant"
    }
}

/// Lookup data exists and the looked-up location agrees with the
/// submitted one within `max_distance_meters`.
pub struct HasValidLookupData {
    pub max_distance_meters: f64,
}

impl Specification for HasValidLookupData {
    fn is_satisfied_by(&self, input: &CriticalDataInput<'_>) -> bool {
        if !input.place_found {
            return false;
        }
        match input.distance_meters {
            Some(d) => d <= self.max_distance_meters,
            // No submitted coordinates to compare against; lookup alone
            // suffices.
            None => true,
        }
    }

    fn name(&self) -> &'static str {
        "valid_lookup_data"
    }
}

/// Assemble the configured specification:
/// basic-geo-and-name ∧ contact(k) ∧ [vegan-relevant] ∧ [lookup ∧ distance(m)].
pub fn critical_data_spec(config: &SpecConfig) -> AllOf {
    let mut parts: Vec<Box<dyn Specification>> = vec![
        Box::new(HasBasicGeoAndName),
        Box::new(HasCompleteContactInfo {
            min_fields: config.min_contact_fields,
        }),
    ];
    if config.enable_vegan_relevance {
        parts.push(Box::new(IsVeganRelevant));
    }
    if config.require_lookup_data {
        parts.push(Box::new(HasValidLookupData {
            max_distance_meters: config.max_distance_meters,
        }));
    }
    AllOf::new(parts)
}
