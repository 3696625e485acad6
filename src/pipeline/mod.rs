//! Concurrent validation pipeline: a bounded worker pool driving each
//! record through enrichment, scoring, decision, and persistence.
//!
//! Scheduling is multi-producer/multi-consumer over a bounded job channel;
//! `enqueue` never blocks on workers and reports back-pressure as a
//! distinguished error. Shutdown is cooperative: workers stop taking jobs
//! on the watch signal, in-flight jobs get the grace period, stragglers
//! are aborted.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::decision::{decide_and_emit, DecisionConfig, DecisionInput, EventSink};
use crate::domain::spec::critical_data_spec;
use crate::domain::{
    assess, build_replacement, combined, ApprovalData, AuthorityTier, CriticalDataInput, Outcome,
    QualityFlags, SpecialFlags, Submitter, Venue,
};
use crate::enrichment::Enricher;
use crate::error::{PipelineError, PipelineResult};
use crate::metrics::Metrics;
use crate::persistence::{NewHistoryEntry, ValidationStore, VenueApproval, VenueRejection};
use crate::scoring::{ScoreRequest, Scorer};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub job_timeout: Duration,
    /// When set, history is persisted but record status is never mutated.
    pub score_only: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: 10,
            queue_capacity: 256,
            job_timeout: Duration::from_secs(90),
            score_only: false,
        }
    }
}

/// One unit of work: the record snapshot and its submitter. The job owns
/// its snapshot for the pipeline's duration.
#[derive(Debug, Clone)]
pub struct ValidationJob {
    pub venue: Venue,
    pub submitter: Submitter,
    /// Re-validate even though history already exists.
    pub force: bool,
}

/// Shared collaborators for the worker loops.
pub struct PipelineDeps {
    pub enricher: Enricher,
    pub scorer: Arc<Scorer>,
    pub store: Arc<dyn ValidationStore>,
    pub events: Arc<dyn EventSink>,
    pub decision: DecisionConfig,
    pub metrics: Option<Metrics>,
}

pub struct ValidationPipeline {
    deps: Arc<PipelineDeps>,
    config: PipelineConfig,
    tx: mpsc::Sender<ValidationJob>,
    rx: Mutex<Option<mpsc::Receiver<ValidationJob>>>,
    workers: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    started: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    score_only: Arc<AtomicBool>,
}

impl ValidationPipeline {
    pub fn new(deps: PipelineDeps, config: PipelineConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            score_only: Arc::new(AtomicBool::new(config.score_only)),
            deps: Arc::new(deps),
            config,
            tx,
            rx: Mutex::new(Some(rx)),
            workers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Toggle score-only mode; used by on-demand re-validation so a fresh
    /// history row never flips an already-reviewed record.
    pub fn set_score_only(&self, score_only: bool) {
        self.score_only.store(score_only, Ordering::SeqCst);
    }

    pub fn score_only(&self) -> bool {
        self.score_only.load(Ordering::SeqCst)
    }

    /// Spawn the worker set. Idempotent: later calls are no-ops.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let rx = self
            .rx
            .lock()
            .await
            .take()
            .expect("receiver present before first start");
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = self.workers.lock().await;
        for worker_id in 0..self.config.worker_count.max(1) {
            workers.push(tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&rx),
                Arc::clone(&self.deps),
                self.shutdown_tx.subscribe(),
                self.config.job_timeout,
                Arc::clone(&self.score_only),
            )));
        }
        info!(workers = workers.len(), "validation pipeline started");
    }

    /// Accept a batch. Either every job is queued or a queue-full error is
    /// returned; acceptance never waits for workers.
    pub async fn enqueue(&self, jobs: Vec<ValidationJob>) -> PipelineResult<usize> {
        let mut accepted = 0usize;
        for job in jobs {
            match self.tx.try_send(job) {
                Ok(()) => accepted += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(accepted, "validation queue full, rejecting batch remainder");
                    self.publish_depth();
                    return Err(PipelineError::QueueFull {
                        capacity: self.config.queue_capacity,
                    });
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    return Err(PipelineError::business(
                        "pipeline.enqueue",
                        "pipeline is shut down",
                    ));
                }
            }
        }
        self.publish_depth();
        debug!(accepted, "jobs enqueued");
        Ok(accepted)
    }

    /// Signal shutdown and wait up to `grace` for in-flight jobs; workers
    /// still running afterwards are aborted.
    pub async fn stop(&self, grace: Duration) {
        info!(grace_secs = grace.as_secs(), "stopping validation pipeline");
        let _ = self.shutdown_tx.send(true);

        let mut workers = self.workers.lock().await;
        let drained = tokio::time::timeout(grace, async {
            for handle in workers.iter_mut() {
                let _ = handle.await;
            }
        })
        .await;
        if drained.is_err() {
            warn!("grace period elapsed, aborting remaining workers");
            for handle in workers.iter() {
                handle.abort();
            }
        }
        workers.clear();
        info!("validation pipeline stopped");
    }

    fn publish_depth(&self) {
        if let Some(m) = &self.deps.metrics {
            let used = self.config.queue_capacity.saturating_sub(self.tx.capacity());
            m.set_queue_depth(used as i64);
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<ValidationJob>>>,
    deps: Arc<PipelineDeps>,
    mut shutdown_rx: watch::Receiver<bool>,
    job_timeout: Duration,
    score_only: Arc<AtomicBool>,
) {
    info!(worker_id, "validation worker started");
    loop {
        let job = {
            let mut guard = rx.lock().await;
            tokio::select! {
                job = guard.recv() => job,
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        None
                    } else {
                        continue;
                    }
                }
            }
        };
        let Some(job) = job else {
            break;
        };
        // Jobs taken after the shutdown signal are dropped without a
        // history row: cancelled work leaves no trace.
        if *shutdown_rx.borrow() {
            debug!(worker_id, venue_id = job.venue.id, "dropping job on shutdown");
            break;
        }

        let venue_id = job.venue.id;
        match tokio::time::timeout(
            job_timeout,
            process_job(&deps, &job, score_only.load(Ordering::SeqCst)),
        )
        .await
        {
            Ok(Ok(outcome)) => {
                if let Some(m) = &deps.metrics {
                    m.job_processed(outcome.as_str());
                }
            }
            Ok(Err(e)) => {
                error!(worker_id, venue_id, error = %e, "validation job failed");
                if let Some(m) = &deps.metrics {
                    m.job_failed();
                }
            }
            Err(_) => {
                warn!(worker_id, venue_id, "validation job timed out");
                let entry = NewHistoryEntry {
                    venue_id,
                    score: 0,
                    outcome: Outcome::ManualReview,
                    notes: format!("validation timed out after {}s", job_timeout.as_secs()),
                    breakdown: BTreeMap::new(),
                    place_snapshot: None,
                    place_found: false,
                    prompt_version: None,
                };
                if let Err(e) = deps.store.save_history(&entry).await {
                    error!(venue_id, error = %e, "failed to record timeout history");
                }
                if let Some(m) = &deps.metrics {
                    m.job_failed();
                }
            }
        }
    }
    info!(worker_id, "validation worker stopped");
}

/// Drive one record through the full flow. Returns the terminal outcome;
/// errors are storage failures (the only failures that fail a job).
async fn process_job(
    deps: &PipelineDeps,
    job: &ValidationJob,
    score_only: bool,
) -> PipelineResult<Outcome> {
    let venue = &job.venue;
    let submitter = &job.submitter;

    if venue.status.is_terminal() {
        warn!(
            venue_id = venue.id,
            status = ?venue.status,
            "record already in terminal state, skipping (no-op)"
        );
        return Ok(Outcome::ManualReview);
    }

    let authority = assess(submitter, &venue.location);
    let special = SpecialFlags::compute(venue, Utc::now());

    // Admin notes and region-language listings go straight to a human; no
    // external quota is spent on them.
    if !venue.automation_eligible() {
        return short_circuit(
            deps,
            venue,
            "admin note present, requires manual review",
        )
        .await;
    }
    if special.region_language() && authority.tier != AuthorityTier::VenueAdmin {
        return short_circuit(deps, venue, "manual review required").await;
    }

    let enrichment = deps.enricher.enrich(venue).await;

    let merged = match combined::build(
        &enrichment.venue,
        enrichment.place.as_ref(),
        submitter,
        &authority,
    ) {
        Ok(merged) => merged,
        Err(e) => {
            // Missing both address and coordinates is a review case, not a
            // rejection.
            return short_circuit(deps, venue, &e.to_string()).await;
        }
    };

    let quality = QualityFlags::compute(
        venue,
        enrichment.place_found,
        enrichment.distance_meters,
        enrichment.conflicts,
        &enrichment.breakdown,
    );
    let critical_data_ok = critical_data_spec(&deps.decision.spec).first_failure(
        &CriticalDataInput {
            venue,
            combined: &merged,
            place_found: enrichment.place_found,
            distance_meters: enrichment.distance_meters,
        },
    )
    .is_none();

    let request = ScoreRequest {
        venue: enrichment.venue.clone(),
        submitter: submitter.clone(),
        authority: authority.clone(),
        combined: merged.clone(),
        enrichment: enrichment.clone(),
    };
    let result = match deps.scorer.score(&request).await {
        Ok(result) => result,
        Err(e) if e.is_external() => {
            // The scoring transport failed even after breaker fallback:
            // record the attempt, never lose the event.
            warn!(venue_id = venue.id, error = %e, "scoring unavailable");
            return short_circuit(deps, venue, &format!("scoring unavailable: {e}")).await;
        }
        Err(e) => return Err(e),
    };

    let decision = decide_and_emit(
        &DecisionInput {
            venue,
            submitter,
            authority: &authority,
            result: &result,
            special: &special,
            quality: &quality,
            critical_data_ok,
        },
        &deps.decision,
        deps.events.as_ref(),
    );

    let mut breakdown = enrichment.breakdown.to_map();
    breakdown.extend(result.breakdown.clone());
    let notes = if result.notes.is_empty() {
        decision.reason.clone()
    } else {
        format!("{}; {}", decision.reason, result.notes)
    };

    let history_id = deps
        .store
        .save_history(&NewHistoryEntry {
            venue_id: venue.id,
            score: decision.final_score,
            outcome: decision.outcome,
            notes,
            breakdown,
            place_snapshot: enrichment.place.clone(),
            place_found: enrichment.place_found,
            prompt_version: result.prompt_version.clone(),
        })
        .await?;

    if !score_only {
        apply_status_change(deps, venue, &merged, &decision, history_id).await?;
    }

    Ok(decision.outcome)
}

/// Persist a manual-review history row and emit the matching event, for
/// paths that bypass scoring entirely.
async fn short_circuit(
    deps: &PipelineDeps,
    venue: &Venue,
    reason: &str,
) -> PipelineResult<Outcome> {
    deps.store
        .save_history(&NewHistoryEntry {
            venue_id: venue.id,
            score: 0,
            outcome: Outcome::ManualReview,
            notes: reason.to_string(),
            breakdown: BTreeMap::new(),
            place_snapshot: None,
            place_found: false,
            prompt_version: None,
        })
        .await?;
    deps.events
        .publish(crate::decision::DomainEvent::VenueRequiresManualReview {
            venue_id: venue.id,
            reason: reason.to_string(),
            final_score: 0,
            flags: Vec::new(),
        });
    Ok(Outcome::ManualReview)
}

async fn apply_status_change(
    deps: &PipelineDeps,
    venue: &Venue,
    merged: &combined::CombinedInfo,
    decision: &crate::decision::Decision,
    history_id: i64,
) -> PipelineResult<()> {
    match decision.outcome {
        Outcome::Approved => {
            let data = ApprovalData::from_combined(merged, None, None, &BTreeMap::new());
            let replacement = build_replacement(venue, &data);
            deps.store
                .approve_with_replacement(&VenueApproval {
                    venue_id: venue.id,
                    history_id: Some(history_id),
                    admin_id: None,
                    reason: decision.reason.clone(),
                    replacement,
                })
                .await
        }
        Outcome::Rejected => {
            deps.store
                .reject(&VenueRejection {
                    venue_id: venue.id,
                    history_id: Some(history_id),
                    admin_id: None,
                    reason: decision.reason.clone(),
                })
                .await
        }
        Outcome::ManualReview => Ok(()),
    }
}
