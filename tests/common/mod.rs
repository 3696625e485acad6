//! Shared fixtures for integration tests: in-memory store, stub external
//! services, and record builders.
#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use venue_approval::breaker::{BreakerConfig, CircuitBreaker};
use venue_approval::config::PromptConfig;
use venue_approval::decision::{DecisionConfig, EventSink, MemoryEventSink};
use venue_approval::domain::{
    AddressComponent, ApprovalStatus, BusinessStatus, EntryType, LatLng, PlaceRecord, Submitter,
    Venue,
};
use venue_approval::enrichment::{Enricher, PlaceLookup, PlaceSummary};
use venue_approval::error::{PipelineError, PipelineResult};
use venue_approval::persistence::{
    HistoryEntry, NewHistoryEntry, ValidationStore, VenueApproval, VenueRejection,
};
use venue_approval::pipeline::{PipelineConfig, PipelineDeps, ValidationPipeline};
use venue_approval::scoring::{
    CacheConfig, ChatModel, ChatOutput, ChatUsage, PromptLibrary, ScoreCache, Scorer, ScorerConfig,
};

/// In-memory [`ValidationStore`] recording every write.
#[derive(Default)]
pub struct MemoryStore {
    pub histories: Mutex<Vec<HistoryEntry>>,
    pub approvals: Mutex<Vec<VenueApproval>>,
    pub rejections: Mutex<Vec<VenueRejection>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn history_count(&self) -> usize {
        self.histories.lock().unwrap().len()
    }

    pub fn histories_for(&self, venue_id: i64) -> Vec<HistoryEntry> {
        self.histories
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.venue_id == venue_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ValidationStore for MemoryStore {
    async fn save_history(&self, entry: &NewHistoryEntry) -> PipelineResult<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let row = HistoryEntry {
            id,
            venue_id: entry.venue_id,
            score: entry.score as i32,
            status: entry.outcome.as_str().to_string(),
            notes: entry.notes.clone(),
            breakdown: serde_json::to_value(&entry.breakdown).ok(),
            place_snapshot: entry
                .place_snapshot
                .as_ref()
                .and_then(|p| serde_json::to_value(p).ok()),
            place_found: entry.place_found,
            prompt_version: entry.prompt_version.clone(),
            processed_at: Utc::now(),
        };
        self.histories.lock().unwrap().push(row);
        Ok(id)
    }

    async fn has_history(&self, venue_id: i64) -> PipelineResult<bool> {
        Ok(self
            .histories
            .lock()
            .unwrap()
            .iter()
            .any(|h| h.venue_id == venue_id))
    }

    async fn latest_history(&self, venue_id: i64) -> PipelineResult<Option<HistoryEntry>> {
        Ok(self
            .histories
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.venue_id == venue_id)
            .last()
            .cloned())
    }

    async fn approve_with_replacement(&self, approval: &VenueApproval) -> PipelineResult<()> {
        self.approvals.lock().unwrap().push(approval.clone());
        Ok(())
    }

    async fn reject(&self, rejection: &VenueRejection) -> PipelineResult<()> {
        self.rejections.lock().unwrap().push(rejection.clone());
        Ok(())
    }
}

/// Stub place lookup with a fixed search result and place record.
pub struct StubLookup {
    pub summaries: Vec<PlaceSummary>,
    pub place: Option<PlaceRecord>,
    pub search_calls: Arc<AtomicU32>,
}

impl StubLookup {
    pub fn with_place(place: PlaceRecord) -> Self {
        Self {
            summaries: vec![PlaceSummary {
                place_id: place.place_id.clone(),
                name: place.name.clone(),
                formatted_address: place.formatted_address.clone(),
                rating: place.rating,
            }],
            place: Some(place),
            search_calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn empty() -> Self {
        Self {
            summaries: Vec::new(),
            place: None,
            search_calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait]
impl PlaceLookup for StubLookup {
    async fn text_search(&self, _query: &str) -> Result<Vec<PlaceSummary>, PipelineError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.summaries.clone())
    }

    async fn details(&self, _place_id: &str) -> Result<Option<PlaceRecord>, PipelineError> {
        Ok(self.place.clone())
    }
}

/// Stub chat model returning a fixed response, optionally slowly.
pub struct StubModel {
    pub response: String,
    pub calls: Arc<AtomicU32>,
    pub delay: Option<Duration>,
}

impl StubModel {
    pub fn scoring(score: u8) -> Self {
        Self {
            response: format!(
                r#"{{"score": {score}, "notes": "stubbed", "breakdown": {{"legitimacy": 30, "completeness": 20, "relevance": 25}}}}"#
            ),
            calls: Arc::new(AtomicU32::new(0)),
            delay: None,
        }
    }
}

#[async_trait]
impl ChatModel for StubModel {
    async fn chat_json(
        &self,
        _system: &str,
        _user: &str,
        _max_tokens: u32,
    ) -> Result<ChatOutput, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(ChatOutput {
            content: self.response.clone(),
            usage: Some(ChatUsage {
                prompt_tokens: 10,
                completion_tokens: 10,
                total_tokens: 20,
            }),
        })
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}

pub fn make_venue(id: i64) -> Venue {
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
        created_at: Utc::now() - ChronoDuration::days(400),
        last_admin_update: None,
    }
}

pub fn make_submitter(id: i64) -> Submitter {
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

/// Place record matching [`make_venue`] at the given coordinates.
pub fn make_place_at(lat: f64, lng: f64) -> PlaceRecord {
    PlaceRecord {
        place_id: "pl_abc123".to_string(),
        name: "Green Leaf".to_string(),
        formatted_address: "123 Vegan Street, Portland, OR 97201".to_string(),
        formatted_phone: Some("(503) 555-0100".to_string()),
        website: Some("https://greenleaf.example.com/".to_string()),
        business_status: BusinessStatus::Operational,
        location: Some(LatLng { lat, lng }),
        viewport: None,
        weekday_text: vec!["Monday: 11:00 AM – 9:00 PM".to_string()],
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

/// ~40 m north of the venue coordinates.
pub fn nearby_place() -> PlaceRecord {
    make_place_at(40.00036, -73.0)
}

/// ~700 m north of the venue coordinates.
pub fn distant_place() -> PlaceRecord {
    make_place_at(40.0063, -73.0)
}

/// Assemble a pipeline over stubs with default breaker settings.
pub fn build_pipeline(
    lookup: StubLookup,
    model: StubModel,
    store: Arc<MemoryStore>,
    events: Arc<MemoryEventSink>,
    config: PipelineConfig,
) -> Arc<ValidationPipeline> {
    let enricher = Enricher::new(
        Arc::new(lookup),
        Arc::new(CircuitBreaker::new(BreakerConfig {
            name: "places-test",
            ..BreakerConfig::default()
        })),
    );
    let scorer = Arc::new(Scorer::new(
        Arc::new(model),
        Arc::new(CircuitBreaker::new(BreakerConfig {
            name: "model-test",
            ..BreakerConfig::default()
        })),
        Arc::new(ScoreCache::new(CacheConfig::default())),
        Arc::new(PromptLibrary::load(&PromptConfig::default())),
        ScorerConfig::default(),
    ));
    let events: Arc<dyn EventSink> = events;
    Arc::new(ValidationPipeline::new(
        PipelineDeps {
            enricher,
            scorer,
            store,
            events,
            decision: DecisionConfig::default(),
            metrics: None,
        },
        config,
    ))
}

/// Poll until `count` history rows exist or two seconds elapse.
pub async fn wait_for_history(store: &MemoryStore, count: usize) {
    for _ in 0..200 {
        if store.history_count() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "timed out waiting for {count} history rows (have {})",
        store.history_count()
    );
}
