//! Enrichment adapter: find the venue in the place-lookup service, fetch
//! details, back-fill missing submitted fields, and compute the
//! nine-dimension agreement breakdown.
//!
//! Failures never escape this module: a dead or empty lookup degrades to
//! `place_found = false` so the job continues to scoring.

pub mod client;
pub mod comparator;
pub mod normalize;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::breaker::CircuitBreaker;
use crate::domain::{PlaceRecord, ScoreBreakdown, Venue};

pub use client::{PlaceLookup, PlaceSummary, PlacesClient, PlacesConfig};
pub use comparator::{compare, Comparison};

/// Reason attached when the lookup finds nothing usable.
pub const NO_MATCHING_PLACE: &str = "no matching place";

/// Everything downstream stages need to know about one enrichment pass.
#[derive(Debug, Clone)]
pub struct EnrichmentOutcome {
    /// Submitted record with missing fields back-filled from the lookup.
    pub venue: Venue,
    pub place: Option<PlaceRecord>,
    pub breakdown: ScoreBreakdown,
    pub distance_meters: Option<f64>,
    pub conflicts: u32,
    pub place_found: bool,
    /// Auto-decision reason when the lookup came up empty.
    pub reason: Option<String>,
    /// Best-effort rating, populated from the search hit even when the
    /// details call failed.
    pub rating: Option<f64>,
}

impl EnrichmentOutcome {
    fn not_found(venue: &Venue, rating: Option<f64>) -> Self {
        Self {
            venue: venue.clone(),
            place: None,
            breakdown: ScoreBreakdown::default(),
            distance_meters: None,
            conflicts: 0,
            place_found: false,
            reason: Some(NO_MATCHING_PLACE.to_string()),
            rating,
        }
    }
}

/// Breaker-protected enrichment front end.
pub struct Enricher {
    lookup: Arc<dyn PlaceLookup>,
    breaker: Arc<CircuitBreaker>,
}

impl Enricher {
    pub fn new(lookup: Arc<dyn PlaceLookup>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { lookup, breaker }
    }

    /// Enrich one record. Infallible by design: lookup failures and empty
    /// results degrade to a `place_found = false` outcome.
    pub async fn enrich(&self, venue: &Venue) -> EnrichmentOutcome {
        let query = format!("{} {}", venue.name.trim(), venue.location.trim());

        let hits = match self
            .breaker
            .call(|| self.lookup.text_search(&query))
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(venue_id = venue.id, error = %e, "place search unavailable");
                return EnrichmentOutcome::not_found(venue, None);
            }
        };

        let Some(top) = hits.into_iter().next() else {
            debug!(venue_id = venue.id, "place search returned no results");
            return EnrichmentOutcome::not_found(venue, None);
        };

        let place = match self
            .breaker
            .call(|| self.lookup.details(&top.place_id))
            .await
        {
            Ok(Some(place)) => place,
            Ok(None) => {
                debug!(venue_id = venue.id, place_id = %top.place_id, "details empty");
                return EnrichmentOutcome::not_found(venue, top.rating);
            }
            Err(e) => {
                warn!(venue_id = venue.id, error = %e, "place details unavailable");
                return EnrichmentOutcome::not_found(venue, top.rating);
            }
        };

        // Agreement is always measured against what was authored, so the
        // comparison runs before back-filling.
        let comparison = comparator::compare(venue, &place);
        let filled = normalize::backfill_from_place(venue, &place);

        debug!(
            venue_id = venue.id,
            place_id = %place.place_id,
            total = comparison.breakdown.total(),
            conflicts = comparison.conflicts,
            "enrichment complete"
        );

        EnrichmentOutcome {
            venue: filled,
            rating: place.rating.or(top.rating),
            place: Some(place),
            breakdown: comparison.breakdown,
            distance_meters: comparison.distance_meters,
            conflicts: comparison.conflicts,
            place_found: true,
            reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerConfig;
    use crate::domain::place::test_place;
    use crate::domain::venue::test_venue;
    use crate::error::{ExternalSystem, PipelineError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubLookup {
        search_results: Vec<PlaceSummary>,
        place: Option<PlaceRecord>,
        fail_search: bool,
        fail_details: bool,
        search_calls: AtomicU32,
    }

    impl StubLookup {
        fn found() -> Self {
            Self {
                search_results: vec![PlaceSummary {
                    place_id: "pl_abc123".to_string(),
                    name: "Green Leaf".to_string(),
                    formatted_address: "123 Vegan Street".to_string(),
                    rating: Some(4.2),
                }],
                place: Some(test_place()),
                fail_search: false,
                fail_details: false,
                search_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl PlaceLookup for StubLookup {
        async fn text_search(&self, _query: &str) -> Result<Vec<PlaceSummary>, PipelineError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_search {
                return Err(PipelineError::external(
                    ExternalSystem::PlaceLookup,
                    "text_search",
                    anyhow::anyhow!("down"),
                ));
            }
            Ok(self.search_results.clone())
        }

        async fn details(&self, _place_id: &str) -> Result<Option<PlaceRecord>, PipelineError> {
            if self.fail_details {
                return Err(PipelineError::external(
                    ExternalSystem::PlaceLookup,
                    "details",
                    anyhow::anyhow!("down"),
                ));
            }
            Ok(self.place.clone())
        }
    }

    fn enricher(stub: StubLookup) -> Enricher {
        Enricher::new(
            Arc::new(stub),
            Arc::new(CircuitBreaker::new(BreakerConfig {
                name: "places-test",
                ..BreakerConfig::default()
            })),
        )
    }

    #[tokio::test]
    async fn test_successful_enrichment_backfills_and_scores() {
        let mut venue = test_venue(1);
        venue.phone = None;
        let e = enricher(StubLookup::found());
        let outcome = e.enrich(&venue).await;
        assert!(outcome.place_found);
        assert!(outcome.reason.is_none());
        assert!(outcome.breakdown.total() > 0);
        // Back-filled from the place record.
        assert!(outcome.venue.phone.is_some());
        assert!(outcome.distance_meters.is_some());
    }

    #[tokio::test]
    async fn test_empty_search_degrades() {
        let mut stub = StubLookup::found();
        stub.search_results.clear();
        let e = enricher(stub);
        let outcome = e.enrich(&test_venue(1)).await;
        assert!(!outcome.place_found);
        assert_eq!(outcome.reason.as_deref(), Some(NO_MATCHING_PLACE));
        assert_eq!(outcome.breakdown.total(), 0);
    }

    #[tokio::test]
    async fn test_search_failure_degrades() {
        let mut stub = StubLookup::found();
        stub.fail_search = true;
        let e = enricher(stub);
        let outcome = e.enrich(&test_venue(1)).await;
        assert!(!outcome.place_found);
        assert!(outcome.rating.is_none());
    }

    #[tokio::test]
    async fn test_details_failure_keeps_search_rating() {
        let mut stub = StubLookup::found();
        stub.fail_details = true;
        let e = enricher(stub);
        let outcome = e.enrich(&test_venue(1)).await;
        assert!(!outcome.place_found);
        assert_eq!(outcome.rating, Some(4.2));
        assert_eq!(outcome.reason.as_deref(), Some(NO_MATCHING_PLACE));
    }

    #[tokio::test]
    async fn test_open_breaker_short_circuits_search() {
        let stub = StubLookup::found();
        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
            name: "places-test",
            max_consecutive_failures: 1,
            ..BreakerConfig::default()
        }));
        // Trip the breaker.
        let tripped: Result<(), _> = breaker
            .call(|| async {
                Err::<(), PipelineError>(PipelineError::external(
                    ExternalSystem::PlaceLookup,
                    "text_search",
                    anyhow::anyhow!("down"),
                ))
            })
            .await;
        assert!(tripped.is_err());

        let lookup = Arc::new(stub);
        let e = Enricher::new(lookup.clone(), breaker);
        let outcome = e.enrich(&test_venue(1)).await;
        assert!(!outcome.place_found);
        // Rejected before dialing the stub.
        assert_eq!(lookup.search_calls.load(Ordering::SeqCst), 0);
    }
}
