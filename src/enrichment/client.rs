//! Place-lookup HTTP client: one text search to find the venue, one
//! details call to fetch the full field set.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::{AddressComponent, BusinessStatus, LatLng, PlaceRecord, Viewport};
use crate::error::{ExternalSystem, PipelineError};

/// Fields requested from the details endpoint; fixed so responses stay
/// predictable and billable surface stays small.
const DETAILS_FIELDS: &str = "name,place_id,formatted_address,geometry,address_components,types,formatted_phone_number,website,business_status,opening_hours,rating,user_ratings_total";

#[derive(Debug, Clone)]
pub struct PlacesConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl PlacesConfig {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: "https://maps.googleapis.com/maps/api/place".to_string(),
            timeout: Duration::from_secs(12),
        }
    }
}

/// Top search hit, enough to decide whether to fetch details and to keep a
/// best-effort rating when details fail.
#[derive(Debug, Clone)]
pub struct PlaceSummary {
    pub place_id: String,
    pub name: String,
    pub formatted_address: String,
    pub rating: Option<f64>,
}

/// Seam for the place-lookup service so the pipeline can run against a
/// stub in tests.
#[async_trait]
pub trait PlaceLookup: Send + Sync {
    async fn text_search(&self, query: &str) -> Result<Vec<PlaceSummary>, PipelineError>;
    async fn details(&self, place_id: &str) -> Result<Option<PlaceRecord>, PipelineError>;
}

/// Google-Places-compatible client.
#[derive(Debug, Clone)]
pub struct PlacesClient {
    config: PlacesConfig,
    client: Client,
}

impl PlacesClient {
    pub fn new(config: PlacesConfig) -> Result<Self, PipelineError> {
        if config.api_key.is_empty() {
            return Err(PipelineError::validation(
                "places_client",
                "place-lookup API key is empty",
            ));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PipelineError::external(ExternalSystem::PlaceLookup, "places_client", e))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl PlaceLookup for PlacesClient {
    async fn text_search(&self, query: &str) -> Result<Vec<PlaceSummary>, PipelineError> {
        debug!(query, "place text search");
        let response = self
            .client
            .get(format!("{}/textsearch/json", self.config.base_url))
            .query(&[("query", query), ("key", self.config.api_key.as_str())])
            .send()
            .await
            .map_err(|e| PipelineError::external(ExternalSystem::PlaceLookup, "text_search", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::external(ExternalSystem::PlaceLookup, "text_search", e))?;
        if !status.is_success() {
            return Err(PipelineError::external(
                ExternalSystem::PlaceLookup,
                "text_search",
                anyhow::anyhow!("HTTP {status}: {body}"),
            ));
        }

        let parsed: SearchResponse = serde_json::from_str(&body)
            .map_err(|e| PipelineError::external(ExternalSystem::PlaceLookup, "text_search", e))?;

        match parsed.status.as_str() {
            "OK" => Ok(parsed
                .results
                .into_iter()
                .map(|r| PlaceSummary {
                    place_id: r.place_id,
                    name: r.name,
                    formatted_address: r.formatted_address.unwrap_or_default(),
                    rating: r.rating,
                })
                .collect()),
            "ZERO_RESULTS" => Ok(Vec::new()),
            other => Err(PipelineError::external(
                ExternalSystem::PlaceLookup,
                "text_search",
                anyhow::anyhow!(
                    "search status {other}: {}",
                    parsed.error_message.unwrap_or_default()
                ),
            )),
        }
    }

    async fn details(&self, place_id: &str) -> Result<Option<PlaceRecord>, PipelineError> {
        debug!(place_id, "place details lookup");
        let response = self
            .client
            .get(format!("{}/details/json", self.config.base_url))
            .query(&[
                ("place_id", place_id),
                ("fields", DETAILS_FIELDS),
                ("key", self.config.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PipelineError::external(ExternalSystem::PlaceLookup, "details", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::external(ExternalSystem::PlaceLookup, "details", e))?;
        if !status.is_success() {
            return Err(PipelineError::external(
                ExternalSystem::PlaceLookup,
                "details",
                anyhow::anyhow!("HTTP {status}: {body}"),
            ));
        }

        let parsed: DetailsResponse = serde_json::from_str(&body)
            .map_err(|e| PipelineError::external(ExternalSystem::PlaceLookup, "details", e))?;

        match parsed.status.as_str() {
            "OK" => Ok(parsed.result.map(PlaceDto::into_record)),
            "ZERO_RESULTS" | "NOT_FOUND" => {
                warn!(place_id, "place details returned no result");
                Ok(None)
            }
            other => Err(PipelineError::external(
                ExternalSystem::PlaceLookup,
                "details",
                anyhow::anyhow!(
                    "details status {other}: {}",
                    parsed.error_message.unwrap_or_default()
                ),
            )),
        }
    }
}

// --- wire types -----------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    status: String,
    #[serde(default)]
    results: Vec<SearchResult>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    place_id: String,
    name: String,
    formatted_address: Option<String>,
    rating: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    status: String,
    result: Option<PlaceDto>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaceDto {
    place_id: Option<String>,
    name: Option<String>,
    formatted_address: Option<String>,
    geometry: Option<GeometryDto>,
    #[serde(default)]
    address_components: Vec<AddressComponentDto>,
    #[serde(default)]
    types: Vec<String>,
    formatted_phone_number: Option<String>,
    website: Option<String>,
    business_status: Option<String>,
    opening_hours: Option<OpeningHoursDto>,
    rating: Option<f64>,
    user_ratings_total: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GeometryDto {
    location: Option<LatLngDto>,
    viewport: Option<ViewportDto>,
}

#[derive(Debug, Deserialize)]
struct LatLngDto {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct ViewportDto {
    northeast: LatLngDto,
    southwest: LatLngDto,
}

#[derive(Debug, Deserialize)]
struct AddressComponentDto {
    long_name: String,
    short_name: String,
    #[serde(default)]
    types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OpeningHoursDto {
    #[serde(default)]
    weekday_text: Vec<String>,
}

impl PlaceDto {
    fn into_record(self) -> PlaceRecord {
        PlaceRecord {
            place_id: self.place_id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            formatted_address: self.formatted_address.unwrap_or_default(),
            formatted_phone: self.formatted_phone_number,
            website: self.website,
            business_status: BusinessStatus::from_wire(self.business_status.as_deref()),
            location: self
                .geometry
                .as_ref()
                .and_then(|g| g.location.as_ref())
                .map(|l| LatLng {
                    lat: l.lat,
                    lng: l.lng,
                }),
            viewport: self.geometry.as_ref().and_then(|g| {
                g.viewport.as_ref().map(|v| Viewport {
                    northeast: LatLng {
                        lat: v.northeast.lat,
                        lng: v.northeast.lng,
                    },
                    southwest: LatLng {
                        lat: v.southwest.lat,
                        lng: v.southwest.lng,
                    },
                })
            }),
            weekday_text: self
                .opening_hours
                .map(|h| h.weekday_text)
                .unwrap_or_default(),
            address_components: self
                .address_components
                .into_iter()
                .map(|c| AddressComponent {
                    long_name: c.long_name,
                    short_name: c.short_name,
                    types: c.types,
                })
                .collect(),
            types: self.types,
            rating: self.rating,
            user_ratings_total: self.user_ratings_total,
        }
    }
}
