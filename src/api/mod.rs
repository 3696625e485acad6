//! HTTP trigger surface for the validation pipeline.
//!
//! Endpoints that enqueue validation work, apply admin decisions, and
//! expose health and metrics. The admin UI itself lives elsewhere and
//! only consumes this contract.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::Config;
use crate::domain::{assess, combined, ApprovalData, PlaceRecord, Venue};
use crate::drafts::DraftStore;
use crate::error::PipelineError;
use crate::metrics::Metrics;
use crate::persistence::{
    FeedbackKind, FeedbackRepository, HistoryRepository, MemberRepository, NewFeedback,
    ValidationStore, VenueApproval, VenueRejection, VenueRepository,
};
use crate::pipeline::{ValidationJob, ValidationPipeline};

/// Cap on one backlog sweep; the admin can run `/validate` again.
const BACKLOG_SWEEP_LIMIT: i64 = 1000;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ValidationPipeline>,
    pub venues: VenueRepository,
    pub members: MemberRepository,
    pub history: HistoryRepository,
    pub feedback: FeedbackRepository,
    pub drafts: Arc<DraftStore>,
    pub store: Arc<dyn ValidationStore>,
    pub metrics: Metrics,
    pub config: watch::Receiver<Arc<Config>>,
}

/// Build the router. The metrics route is mounted only when enabled.
pub fn router(state: AppState) -> Router {
    let config = state.config.borrow().clone();
    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route("/validate", post(validate_all))
        .route("/validate/batch", post(validate_batch))
        .route("/venues/:id/validate", post(validate_one))
        .route("/venues/:id/approve", post(approve_venue))
        .route("/venues/:id/reject", post(reject_venue))
        .route("/venues/:id/feedback", post(record_feedback))
        .route("/review-queue", get(review_queue));

    if config.metrics_enabled {
        router = router.route(&config.metrics_path, get(serve_metrics));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn serve_metrics(State(state): State<AppState>) -> String {
    state.metrics.gather()
}

/// Enqueue every pending record that has no validation history yet.
async fn validate_all(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let venues = match state
        .venues
        .list_pending_without_history(BACKLOG_SWEEP_LIMIT)
        .await
    {
        Ok(venues) => venues,
        Err(e) => return error_response(e),
    };

    enqueue_venues(&state, venues, false).await
}

#[derive(Debug, Deserialize)]
struct BatchRequest {
    venue_ids: Vec<i64>,
    #[serde(default)]
    force: bool,
}

/// Enqueue a selected id set, optionally forcing re-validation.
async fn validate_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> (StatusCode, Json<Value>) {
    let venues = match state.venues.list_by_ids(&request.venue_ids).await {
        Ok(venues) => venues,
        Err(e) => return error_response(e),
    };
    enqueue_venues(&state, venues, request.force).await
}

#[derive(Debug, Default, Deserialize)]
struct ForceQuery {
    #[serde(default)]
    force: bool,
}

/// Enqueue a single record.
async fn validate_one(
    State(state): State<AppState>,
    Path(venue_id): Path<i64>,
    Query(query): Query<ForceQuery>,
) -> (StatusCode, Json<Value>) {
    let venue = match state.venues.find_by_id(venue_id).await {
        Ok(Some(venue)) => venue,
        Ok(None) => return not_found(venue_id),
        Err(e) => return error_response(e),
    };
    enqueue_venues(&state, vec![venue], query.force).await
}

/// Shared enqueue path: per-record dedupe on history presence (unless
/// forced), submitter resolution, then a single batch accept.
async fn enqueue_venues(
    state: &AppState,
    venues: Vec<Venue>,
    force: bool,
) -> (StatusCode, Json<Value>) {
    let mut jobs = Vec::new();
    let mut skipped = 0usize;

    for venue in venues {
        if !force {
            match state.store.has_history(venue.id).await {
                Ok(true) => {
                    skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => return error_response(e),
            }
        }
        match state.members.load_submitter(venue.member_id, venue.id).await {
            Ok(Some(submitter)) => jobs.push(ValidationJob {
                venue,
                submitter,
                force,
            }),
            Ok(None) => {
                warn!(venue_id = venue.id, member_id = venue.member_id, "submitter not found, skipping");
                skipped += 1;
            }
            Err(e) => return error_response(e),
        }
    }

    match state.pipeline.enqueue(jobs).await {
        Ok(accepted) => (
            StatusCode::ACCEPTED,
            Json(json!({"enqueued": accepted, "skipped": skipped})),
        ),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Default, Deserialize)]
struct AdminActionRequest {
    admin_id: Option<i64>,
    reason: Option<String>,
}

/// Admin approval: merge the combined view (rebuilt from the latest
/// history snapshot) with any editor draft, then apply the replacement
/// transactionally.
async fn approve_venue(
    State(state): State<AppState>,
    Path(venue_id): Path<i64>,
    Json(request): Json<AdminActionRequest>,
) -> (StatusCode, Json<Value>) {
    let venue = match state.venues.find_by_id(venue_id).await {
        Ok(Some(venue)) => venue,
        Ok(None) => return not_found(venue_id),
        Err(e) => return error_response(e),
    };
    let submitter = match state.members.load_submitter(venue.member_id, venue.id).await {
        Ok(Some(submitter)) => submitter,
        Ok(None) => {
            return error_response(PipelineError::business(
                "approve",
                format!("submitter {} not found", venue.member_id),
            ))
        }
        Err(e) => return error_response(e),
    };

    let latest = match state.store.latest_history(venue.id).await {
        Ok(latest) => latest,
        Err(e) => return error_response(e),
    };
    let place: Option<PlaceRecord> = latest
        .as_ref()
        .and_then(|h| h.place_snapshot.clone())
        .and_then(|v| serde_json::from_value(v).ok());

    let authority = assess(&submitter, &venue.location);
    let overrides = state.drafts.overrides(venue.id).await;
    let replacement = match combined::build(&venue, place.as_ref(), &submitter, &authority) {
        Ok(merged) => {
            let data = ApprovalData::from_combined(&merged, None, None, &overrides);
            crate::domain::build_replacement(&venue, &data)
        }
        // No usable merged view (e.g. record without address or
        // coordinates): approve as-is without replacements.
        Err(_) => None,
    };

    let approval = VenueApproval {
        venue_id,
        history_id: latest.map(|h| h.id),
        admin_id: request.admin_id,
        reason: request
            .reason
            .unwrap_or_else(|| "approved by admin".to_string()),
        replacement,
    };
    match state.store.approve_with_replacement(&approval).await {
        Ok(()) => {
            state.drafts.discard(venue_id).await;
            (StatusCode::OK, Json(json!({"venue_id": venue_id, "status": "approved"})))
        }
        Err(e) => error_response(e),
    }
}

async fn reject_venue(
    State(state): State<AppState>,
    Path(venue_id): Path<i64>,
    Json(request): Json<AdminActionRequest>,
) -> (StatusCode, Json<Value>) {
    let latest = match state.store.latest_history(venue_id).await {
        Ok(latest) => latest,
        Err(e) => return error_response(e),
    };
    let rejection = VenueRejection {
        venue_id,
        history_id: latest.map(|h| h.id),
        admin_id: request.admin_id,
        reason: request
            .reason
            .unwrap_or_else(|| "rejected by admin".to_string()),
    };
    match state.store.reject(&rejection).await {
        Ok(()) => {
            state.drafts.discard(venue_id).await;
            (StatusCode::OK, Json(json!({"venue_id": venue_id, "status": "rejected"})))
        }
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct FeedbackRequest {
    kind: String,
    comment: Option<String>,
}

async fn record_feedback(
    State(state): State<AppState>,
    Path(venue_id): Path<i64>,
    Json(request): Json<FeedbackRequest>,
) -> (StatusCode, Json<Value>) {
    let Some(kind) = FeedbackKind::from_str(&request.kind) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("unknown feedback kind: {}", request.kind)})),
        );
    };
    let prompt_version = match state.store.latest_history(venue_id).await {
        Ok(latest) => latest.and_then(|h| h.prompt_version),
        Err(e) => return error_response(e),
    };

    let feedback = NewFeedback {
        venue_id,
        prompt_version,
        kind,
        comment: request.comment,
        source_ip: None,
    };
    match state.feedback.insert(&feedback).await {
        Ok(id) => (StatusCode::CREATED, Json(json!({"feedback_id": id}))),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct QueueQuery {
    #[serde(default = "default_queue_limit")]
    limit: i64,
}

fn default_queue_limit() -> i64 {
    100
}

/// Manual review queue, ranked score desc then recency.
async fn review_queue(
    State(state): State<AppState>,
    Query(query): Query<QueueQuery>,
) -> (StatusCode, Json<Value>) {
    match state.history.manual_review_queue(query.limit).await {
        Ok(entries) => {
            let items: Vec<Value> = entries
                .iter()
                .map(|e| {
                    json!({
                        "venue_id": e.venue_id,
                        "score": e.score,
                        "notes": e.notes,
                        "place_found": e.place_found,
                        "processed_at": e.processed_at,
                    })
                })
                .collect();
            (StatusCode::OK, Json(json!({"entries": items})))
        }
        Err(e) => error_response(e),
    }
}

fn not_found(venue_id: i64) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": format!("venue {venue_id} not found")})),
    )
}

fn error_response(error: PipelineError) -> (StatusCode, Json<Value>) {
    let status = match &error {
        PipelineError::QueueFull { .. } => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::Validation { .. } => StatusCode::BAD_REQUEST,
        PipelineError::Business { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::Storage { .. } | PipelineError::External { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    warn!(error = %error, "request failed");
    (status, Json(json!({"error": error.to_string()})))
}
